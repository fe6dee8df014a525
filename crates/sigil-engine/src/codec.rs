//! Pattern encoding: canonical bytes, SHA-1 digest, optional secondary transform.
//!
//! The digest is a stable wire format. A pattern serializes to one byte per
//! cell (its row-major id) in stroke order, and the secret is the lowercase
//! hex SHA-1 of those bytes. Callers may pipe the hex digest through a
//! [`PatternTransform`] of their own before it is stored or compared.

use std::fmt;
use std::sync::Arc;

use sha1::{Digest, Sha1};
use sha2::Sha256;
use sigil_common::{Cell, EncodedSecret, Pattern, Result, SigilError};
use thiserror::Error;

use crate::grid::Grid;

/// Failure reported by a transform plugin
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransformError(pub String);

impl From<TransformError> for SigilError {
    fn from(err: TransformError) -> Self {
        SigilError::Transform(err.0)
    }
}

/// Secondary encoding applied to the hex digest, supplied by the host
pub trait PatternTransform: Send + Sync {
    fn apply(&self, raw: &[u8]) -> std::result::Result<Vec<u8>, TransformError>;
}

impl<F> PatternTransform for F
where
    F: Fn(&[u8]) -> std::result::Result<Vec<u8>, TransformError> + Send + Sync,
{
    fn apply(&self, raw: &[u8]) -> std::result::Result<Vec<u8>, TransformError> {
        self(raw)
    }
}

/// SHA-256 over `pepper || digest`, rendered as lowercase hex
pub struct PepperedSha256 {
    pepper: Vec<u8>,
}

impl PepperedSha256 {
    pub fn new(pepper: impl Into<Vec<u8>>) -> std::result::Result<Self, TransformError> {
        let pepper = pepper.into();
        if pepper.is_empty() {
            return Err(TransformError("Pepper must not be empty".to_string()));
        }
        Ok(Self { pepper })
    }
}

impl PatternTransform for PepperedSha256 {
    fn apply(&self, raw: &[u8]) -> std::result::Result<Vec<u8>, TransformError> {
        let mut hasher = Sha256::new();
        hasher.update(&self.pepper);
        hasher.update(raw);
        Ok(hex::encode(hasher.finalize()).into_bytes())
    }
}

impl fmt::Debug for PepperedSha256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PepperedSha256").finish_non_exhaustive()
    }
}

/// One byte per cell, value = cell id, in stroke order
pub fn serialize(pattern: &Pattern) -> Result<Vec<u8>> {
    pattern
        .iter()
        .map(|cell| {
            u8::try_from(cell.id()).map_err(|_| SigilError::InvalidCellId {
                id: cell.id(),
                size: cell.grid_size(),
            })
        })
        .collect()
}

/// Inverse of [`serialize`] for patterns drawn on `grid`
pub fn deserialize(grid: &Grid, bytes: &[u8]) -> Result<Pattern> {
    let cells = bytes
        .iter()
        .map(|&b| grid.cell_of(u16::from(b)))
        .collect::<Result<Vec<Cell>>>()?;
    Pattern::from_cells(cells)
}

/// Lowercase hex SHA-1 (40 characters) of the serialized pattern
pub fn digest(pattern: &Pattern) -> Result<String> {
    let bytes = serialize(pattern)?;
    Ok(hex::encode(Sha1::digest(&bytes)))
}

/// The digest, or the digest piped through `transform`
pub fn encode(pattern: &Pattern, transform: Option<&dyn PatternTransform>) -> Result<EncodedSecret> {
    let hex_digest = digest(pattern)?;
    match transform {
        None => Ok(EncodedSecret::new(hex_digest.into_bytes())),
        Some(transform) => {
            let out = transform.apply(hex_digest.as_bytes()).map_err(|e| {
                tracing::warn!(error = %e, "Pattern transform failed");
                SigilError::from(e)
            })?;
            Ok(EncodedSecret::new(out))
        }
    }
}

/// Encoder bound to the host's transform
#[derive(Clone, Default)]
pub struct Codec {
    transform: Option<Arc<dyn PatternTransform>>,
}

impl Codec {
    pub fn new(transform: Option<Arc<dyn PatternTransform>>) -> Self {
        Self { transform }
    }

    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    pub fn encode(&self, pattern: &Pattern) -> Result<EncodedSecret> {
        encode(pattern, self.transform.as_deref())
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("transform", &self.transform.is_some())
            .finish()
    }
}
