//! Common error types for Sigil components.

use thiserror::Error;

/// Result alias used across Sigil crates
pub type Result<T, E = SigilError> = std::result::Result<T, E>;

/// Errors surfaced by the pattern engine and its hosts.
///
/// Wrong patterns are not errors: they travel as [`crate::Outcome`] values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigilError {
    /// Row/column outside the grid
    #[error("Invalid cell ({row}, {column}) for a {size}x{size} grid")]
    InvalidCell { row: u16, column: u16, size: u8 },

    /// Cell id outside the grid
    #[error("Invalid cell id {id} for a {size}x{size} grid")]
    InvalidCellId { id: u16, size: u8 },

    /// A pattern visited the same cell twice
    #[error("Cell ({row}, {column}) appears twice in a pattern")]
    DuplicateCell { row: u8, column: u8 },

    /// The secondary transform failed
    #[error("Transform error: {0}")]
    Transform(String),

    /// Requested captcha length cannot fit on the grid
    #[error("Cannot generate a captcha of {requested} cells on a grid of {capacity}")]
    CaptchaExhausted { requested: usize, capacity: usize },

    /// Invalid engine or host configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Secret store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Input arrived after the challenge reached a terminal outcome
    #[error("Challenge is closed")]
    ChallengeClosed,
}

impl SigilError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidCell { .. } | Self::InvalidCellId { .. } | Self::DuplicateCell { .. } => {
                400
            }
            Self::Transform(_) => 500,
            Self::CaptchaExhausted { .. } => 500,
            Self::Config(_) => 500,
            Self::Store(_) => 503,
            Self::ChallengeClosed => 409,
        }
    }

    /// Programming-contract violations (bad addressing), never user input
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidCell { .. } | Self::InvalidCellId { .. } | Self::DuplicateCell { .. }
        )
    }

    /// Errors caused by how the engine was wired, reported apart from mismatches
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Transform(_) | Self::CaptchaExhausted { .. } | Self::Config(_)
        )
    }
}
