//! # raudio Common Library
//!
//! Support code shared by the raudio crates:
//! - Configuration file resolution and loading
//! - Tracing subscriber setup
//! - Frame/time conversion helpers

pub mod config;
pub mod error;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
