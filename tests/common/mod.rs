//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use std::time::{Duration, Instant};
use varlog_rs::pipeline::{ProcessingBridge, SinkMessage};

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Collect messages until `done` returns true or the timeout expires
pub fn collect_until<F>(bridge: &ProcessingBridge, mut done: F) -> Vec<SinkMessage>
where
    F: FnMut(&[SinkMessage]) -> bool,
{
    let deadline = Instant::now() + test_timeout();
    let mut messages = Vec::new();
    while !done(&messages) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match bridge.recv_timeout(remaining) {
            Ok(Some(msg)) => messages.push(msg),
            Ok(None) | Err(_) => break,
        }
    }
    messages
}

/// Every point of every `Data` message for output `name`, in order
pub fn points_of(messages: &[SinkMessage], name: &str) -> Vec<(f64, f64)> {
    messages
        .iter()
        .filter_map(|m| match m {
            SinkMessage::Data(buffers) => Some(buffers),
            _ => None,
        })
        .flatten()
        .filter(|b| b.name == name)
        .flat_map(|b| b.points.iter().filter_map(|p| p.y.map(|y| (p.x, y))))
        .collect()
}
