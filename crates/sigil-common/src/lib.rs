//! # Sigil Common
//!
//! Shared types, errors, and constants used across Sigil components.
//!
//! ## Modules
//! - `types` - Core data structures (Cell, Pattern, DisplayMode, Outcome, etc.)
//! - `error` - Common error type
//! - `constants` - Shared defaults

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Result, SigilError};
pub use types::*;
