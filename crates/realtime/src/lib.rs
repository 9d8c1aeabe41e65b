//! # Realtime Core
//!
//! Error type and provider traits shared by the bus tracker crates.

mod error;
mod provider;

pub use crate::error::*;
pub use crate::provider::*;
