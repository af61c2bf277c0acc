//! Data Models
//!
//! Options data structures.

pub mod settings;

pub use settings::{AppOptions, OptionsUpdate};
