// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! labmesh-ping - request/reply round-trip probe
//!
//! Starts a set of responders on an in-process broker, then broadcasts
//! `ping` requests to all of them and reports how long it takes until every
//! responder has answered.
//!
//! # Usage
//!
//! ```bash
//! labmesh-ping --count 500 --responders 4 --timeout-ms 200
//! RUST_LOG=labmesh=debug labmesh-ping --count 5
//! ```

use anyhow::{ensure, Context};
use clap::Parser;
use colored::Colorize;
use crossbeam::channel::{self, RecvTimeoutError};
use labmesh::{
    Client, ClientConfig, Destination, ErrorCallback, ErrorPayload, Header, MemoryBroker, Payload,
    ReplyCallback, ReplyCount, RequestCallback, Topic,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Measure labmesh request/reply round trips
#[derive(Parser, Debug)]
#[command(name = "labmesh-ping")]
#[command(version)]
#[command(about = "Measure labmesh request/reply round-trip latency")]
struct Args {
    /// Number of requests to send
    #[arg(short = 'n', long, default_value_t = 100)]
    count: u64,

    /// Per-request timeout in milliseconds
    #[arg(short, long, default_value_t = 250)]
    timeout_ms: u64,

    /// Number of responders answering each broadcast
    #[arg(short, long, default_value_t = 3)]
    responders: usize,

    /// Pause between requests in milliseconds
    #[arg(short, long, default_value_t = 0)]
    interval_ms: u64,

    /// Requester configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset [default: config log_level]
    #[arg(long)]
    log_level: Option<String>,
}

enum Event {
    Reply,
    Failed(Vec<ErrorPayload>),
}

#[derive(Default)]
struct Summary {
    latencies: Vec<Duration>,
    failed: u64,
}

impl Summary {
    fn print(&self, sent: u64) {
        println!();
        println!("{}", "--- labmesh ping statistics ---".bold());
        println!(
            "{} requests, {} complete, {} failed",
            sent,
            self.latencies.len(),
            self.failed
        );
        if self.latencies.is_empty() {
            return;
        }
        let min = self.latencies.iter().min().copied().unwrap_or_default();
        let max = self.latencies.iter().max().copied().unwrap_or_default();
        let total: Duration = self.latencies.iter().sum();
        let avg = total / self.latencies.len() as u32;
        println!(
            "rtt min/avg/max = {:.3}/{:.3}/{:.3} ms",
            min.as_secs_f64() * 1e3,
            avg.as_secs_f64() * 1e3,
            max.as_secs_f64() * 1e3
        );
    }
}

fn main() {
    let args = Args::parse();

    let result = load_config(&args).and_then(|config| {
        let level = args.log_level.as_deref().unwrap_or(&config.log_level);
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
        run(&args, config)
    });

    if let Err(e) = result {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> anyhow::Result<ClientConfig> {
    match &args.config {
        Some(path) => ClientConfig::from_file(path).with_context(|| format!("loading {}", path.display())),
        None => {
            let mut config = ClientConfig::new("probe", "pinger").name("labmesh-ping");
            config.log_level = "warn".to_string();
            Ok(config)
        }
    }
}

fn run(args: &Args, config: ClientConfig) -> anyhow::Result<()> {
    ensure!(args.responders > 0, "at least one responder is required");
    ensure!(args.timeout_ms > 0, "timeout must be positive");

    let broker = MemoryBroker::new();
    let subject = Topic::parse("ping")?;

    let responders = (0..args.responders)
        .map(|index| start_responder(&broker, &config, index, &subject))
        .collect::<anyhow::Result<Vec<_>>>()?;
    tracing::info!("{} responder(s) ready", responders.len());

    let transport = broker.endpoint(&config.client_id)?;
    let requester = Client::builder(config)
        .transport(Arc::new(transport))
        .build()?;
    requester.connect()?;

    let expected = ReplyCount::exactly(args.responders).unwrap_or(ReplyCount::ONE);
    let timeout = Duration::from_millis(args.timeout_ms);
    let mut summary = Summary::default();

    for seq in 0..args.count {
        let (tx, rx) = channel::unbounded();
        let reply_tx = tx.clone();
        let on_reply: ReplyCallback =
            Arc::new(move |_: &Header, _: &[Payload]| -> anyhow::Result<()> {
                let _ = reply_tx.send(Event::Reply);
                Ok(())
            });
        let on_error: ErrorCallback = Arc::new(move |_: &Topic, errors: &[ErrorPayload]| {
            let _ = tx.send(Event::Failed(errors.to_vec()));
        });

        let started = Instant::now();
        let id = requester.send_request(
            &Destination::all(),
            &subject,
            vec![Payload::json(&seq)?],
            expected,
            timeout,
            on_reply,
            Some(on_error),
        )?;

        let mut replies = 0;
        let outcome = loop {
            match rx.recv_timeout(timeout * 2) {
                Ok(Event::Reply) => {
                    replies += 1;
                    if replies == args.responders {
                        break Ok(started.elapsed());
                    }
                }
                Ok(Event::Failed(errors)) => break Err(errors),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                    break Err(vec![ErrorPayload::timeout("no outcome reported")]);
                }
            }
        };

        match outcome {
            Ok(rtt) => {
                println!(
                    "seq={} id={} replies={} time={:.3} ms",
                    seq,
                    id,
                    replies,
                    rtt.as_secs_f64() * 1e3
                );
                summary.latencies.push(rtt);
            }
            Err(errors) => {
                summary.failed += 1;
                for error in &errors {
                    println!("seq={} id={} {}", seq, id, error.to_string().yellow());
                }
            }
        }

        if args.interval_ms > 0 {
            std::thread::sleep(Duration::from_millis(args.interval_ms));
        }
    }

    summary.print(args.count);
    tracing::debug!("requester stats: {:?}", requester.requester_stats());

    requester.shutdown();
    for responder in &responders {
        responder.shutdown();
    }
    Ok(())
}

/// A responder sharing the requester's routing, echoing the request payload.
fn start_responder(
    broker: &Arc<MemoryBroker>,
    base: &ClientConfig,
    index: usize,
    subject: &Topic,
) -> anyhow::Result<Client> {
    let client_id = format!("responder{}", index);
    let config = ClientConfig::new("probe", client_id.as_str())
        .name(format!("labmesh-ping-{}", client_id))
        .routing(base.prefix.iter().cloned(), base.application_id.as_str());
    let transport = broker.endpoint(&client_id)?;
    let client = Client::builder(config)
        .transport(Arc::new(transport))
        .build()?;
    client.connect()?;

    let echo: RequestCallback =
        Arc::new(|_: &Header, payloads: &[Payload]| -> anyhow::Result<Vec<Payload>> {
            Ok(payloads.to_vec())
        });
    client.register_request_handler(subject, echo, None)?;
    Ok(client)
}
