//! Shared building blocks for the crossbar gateway crates.

pub mod error;

pub use error::HttpError;
