//! Shared test utilities for the surge workspace.
//!
//! This crate provides common testing infrastructure including:
//! - A local HTTP target server with fixed, delayed and failing routes
//! - Approximate float assertions for statistics
//! - In-memory capture of `tracing` output
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then start a target in an async test:
//!
//! ```ignore
//! use test_utils::TargetServer;
//!
//! #[tokio::test]
//! async fn test_against_target() {
//!     let server = TargetServer::start().await.unwrap();
//!     let url = format!("{}/ok", server.base_url());
//!     // Point the load test at `url`...
//! }
//! ```

pub mod logs;
pub mod target;

pub use logs::LogCapture;
pub use target::{unused_base_url, RecordedRequest, TargetServer, TOKEN};

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(snapshot.latency_ms.mean, 25.0, 0.01);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(0.0, 0.0, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }
}
