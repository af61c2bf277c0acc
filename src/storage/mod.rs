//! Storage Layer
//!
//! JSON options persistence.

pub mod config;

pub use config::*;
