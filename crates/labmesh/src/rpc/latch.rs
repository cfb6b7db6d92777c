// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Countdown latch shared between a waiting requester and reply workers.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct CountdownLatch {
    remaining: Mutex<usize>,
    zero: Condvar,
}

impl CountdownLatch {
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            zero: Condvar::new(),
        }
    }

    /// Decrement the count (saturating at zero). Returns the new count.
    pub fn count_down(&self) -> usize {
        let mut remaining = self.remaining.lock();
        if *remaining > 0 {
            *remaining -= 1;
            if *remaining == 0 {
                self.zero.notify_all();
            }
        }
        *remaining
    }

    #[must_use]
    pub fn count(&self) -> usize {
        *self.remaining.lock()
    }

    /// Wait until the count reaches zero. Returns `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            if self.zero.wait_until(&mut remaining, deadline).timed_out() {
                return *remaining == 0;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_latch_releases_at_zero() {
        let latch = Arc::new(CountdownLatch::new(3));
        let workers: Vec<_> = (0..3)
            .map(|_| {
                let latch = Arc::clone(&latch);
                thread::spawn(move || {
                    latch.count_down();
                })
            })
            .collect();
        assert!(latch.wait_timeout(Duration::from_secs(2)));
        for worker in workers {
            worker.join().expect("worker");
        }
        assert_eq!(latch.count(), 0);
        assert_eq!(latch.count_down(), 0);
    }

    #[test]
    fn test_latch_times_out() {
        let latch = CountdownLatch::new(2);
        assert_eq!(latch.count_down(), 1);
        let started = Instant::now();
        assert!(!latch.wait_timeout(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(latch.count(), 1);
    }
}
