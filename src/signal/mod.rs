//! Signal domain: request/result types, the upstream-text parser and the
//! normalization policy that turns untrusted model output into a
//! `NormalizedSignal`.

pub mod image;
pub mod normalizer;
pub mod parser;
pub mod prompt;
pub mod types;

pub use normalizer::{normalize, truncate_chars, DegradeReason, Normalization};
pub use types::*;
