// src/deploy/retry.rs

//! Retry loop for destination filesystem operations
//!
//! Destination folders are often served or scanned while being updated, so
//! a copy can hit a locked file. Operations are retried until they succeed,
//! with a fixed delay between attempts; only an operator can stop the loop.

use std::io;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Run `op` until it succeeds, sleeping `delay` after each failure
pub fn retry_forever<T>(what: &str, delay: Duration, mut op: impl FnMut() -> io::Result<T>) -> T {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => return value,
            Err(e) => {
                warn!(
                    "{} failed (attempt {}): {}, retrying in {:?}...",
                    what, attempt, e, delay
                );
                thread::sleep(delay);
            }
        }
    }
}
