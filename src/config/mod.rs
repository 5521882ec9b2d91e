//! # Configuration
//!
//! Controller configuration loaded from environment variables, overridable by CLI flags.

pub mod controller;

pub use controller::{ControllerConfig, LogFormat};
