//! Core types and traits for SQLModel Rust.
//!
//! This crate provides the foundational abstractions shared by the
//! workspace crates:
//!
//! - `Error` and the error kinds raised while planning a flush
//! - `Result` alias used across the workspace

pub mod error;

pub use error::{ConfigError, Error, FlushError, FlushErrorKind, Result};
