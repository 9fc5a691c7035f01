//! HTTP middleware.
//!
//! Execution order (outermost → innermost):
//! 1. CORS — answers preflight before anything else runs
//! 2. Access logger — method, path, status, latency

pub mod audit;
pub mod cors;
