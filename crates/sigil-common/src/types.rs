//! Core types shared across Sigil components.

use std::fmt;
use std::hash::{Hash, Hasher};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::SigilError;

/// One addressable point of an N×N grid.
///
/// Two cells are equal when their row and column match. The grid size is
/// carried along so `id()` does not need a grid in scope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "CellRepr")]
pub struct Cell {
    row: u8,
    column: u8,
    size: u8,
}

#[derive(Deserialize)]
struct CellRepr {
    row: u8,
    column: u8,
    size: u8,
}

impl TryFrom<CellRepr> for Cell {
    type Error = SigilError;

    fn try_from(repr: CellRepr) -> Result<Self, Self::Error> {
        Cell::new(repr.row, repr.column, repr.size)
    }
}

impl Cell {
    /// Create a cell, checking it lies on a `size`×`size` grid
    pub fn new(row: u8, column: u8, size: u8) -> Result<Self, SigilError> {
        if row >= size || column >= size {
            return Err(SigilError::InvalidCell {
                row: row.into(),
                column: column.into(),
                size,
            });
        }
        Ok(Self { row, column, size })
    }

    /// Create a cell from its row-major id
    pub fn from_id(id: u16, size: u8) -> Result<Self, SigilError> {
        let width = u16::from(size);
        if width == 0 || id >= width * width {
            return Err(SigilError::InvalidCellId { id, size });
        }
        Ok(Self {
            row: (id / width) as u8,
            column: (id % width) as u8,
            size,
        })
    }

    pub fn row(&self) -> u8 {
        self.row
    }

    pub fn column(&self) -> u8 {
        self.column
    }

    /// Width of the grid this cell belongs to
    pub fn grid_size(&self) -> u8 {
        self.size
    }

    /// Row-major id: `row * N + column`
    pub fn id(&self) -> u16 {
        u16::from(self.row) * u16::from(self.size) + u16::from(self.column)
    }

    /// Chebyshev (king-move) distance to another cell
    pub fn chebyshev(&self, other: &Cell) -> u8 {
        self.row
            .abs_diff(other.row)
            .max(self.column.abs_diff(other.column))
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.row == other.row && self.column == other.column
    }
}

impl Eq for Cell {}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.row.hash(state);
        self.column.hash(state);
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.column)
    }
}

/// Ordered, duplicate-free sequence of cells in stroke order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Cell>", into = "Vec<Cell>")]
pub struct Pattern {
    cells: Vec<Cell>,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pattern, rejecting repeated cells
    pub fn from_cells(cells: Vec<Cell>) -> Result<Self, SigilError> {
        let mut pattern = Self {
            cells: Vec::with_capacity(cells.len()),
        };
        for cell in cells {
            if !pattern.push(cell) {
                return Err(SigilError::DuplicateCell {
                    row: cell.row,
                    column: cell.column,
                });
            }
        }
        Ok(pattern)
    }

    /// Build a pattern from row-major ids
    pub fn from_ids(ids: &[u16], size: u8) -> Result<Self, SigilError> {
        let cells = ids
            .iter()
            .map(|&id| Cell::from_id(id, size))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_cells(cells)
    }

    /// Append a cell; returns false (and changes nothing) if already present
    pub fn push(&mut self, cell: Cell) -> bool {
        if self.contains(&cell) {
            return false;
        }
        self.cells.push(cell);
        true
    }

    pub fn contains(&self, cell: &Cell) -> bool {
        self.cells.contains(cell)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn last(&self) -> Option<&Cell> {
        self.cells.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cell> {
        self.cells.iter()
    }

    /// Row-major ids in stroke order
    pub fn ids(&self) -> Vec<u16> {
        self.cells.iter().map(Cell::id).collect()
    }
}

impl TryFrom<Vec<Cell>> for Pattern {
    type Error = SigilError;

    fn try_from(cells: Vec<Cell>) -> Result<Self, Self::Error> {
        Self::from_cells(cells)
    }
}

impl From<Pattern> for Vec<Cell> {
    fn from(pattern: Pattern) -> Self {
        pattern.cells
    }
}

impl<'a> IntoIterator for &'a Pattern {
    type Item = &'a Cell;
    type IntoIter = std::slice::Iter<'a, Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.cells.iter().map(|c| c.id().to_string()).collect();
        write!(f, "[{}]", ids.join(","))
    }
}

/// Rendering hint attached to a displayed pattern
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Neutral/active drawing, or an accepted pattern
    #[default]
    Correct,
    /// Rejected pattern
    Wrong,
    /// Pattern played back for the user to copy
    Animate,
}

/// Immutable snapshot of what the renderer should draw
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub pattern: Pattern,
    pub display_mode: DisplayMode,
    /// Hide the drawn path while the user is drawing
    pub stealth: bool,
}

/// Opaque encoded secret: a hex digest, or the transform's output.
///
/// On the wire it is the UTF-8 text itself, or `base64:` followed by
/// URL-safe base64 when the bytes are not valid UTF-8.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EncodedSecret(Vec<u8>);

const BINARY_WIRE_PREFIX: &str = "base64:";

impl EncodedSecret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Text form for JSON and logs
    pub fn to_wire(&self) -> String {
        match std::str::from_utf8(&self.0) {
            Ok(text) if !text.starts_with(BINARY_WIRE_PREFIX) => text.to_string(),
            _ => format!("{}{}", BINARY_WIRE_PREFIX, URL_SAFE_NO_PAD.encode(&self.0)),
        }
    }

    /// Parse the text form produced by [`EncodedSecret::to_wire`]
    pub fn from_wire(text: &str) -> Result<Self, SigilError> {
        match text.strip_prefix(BINARY_WIRE_PREFIX) {
            Some(encoded) => URL_SAFE_NO_PAD
                .decode(encoded)
                .map(Self)
                .map_err(|e| SigilError::Config(format!("Invalid secret encoding: {}", e))),
            None => Ok(Self(text.as_bytes().to_vec())),
        }
    }
}

// Secrets never show up in Debug output
impl fmt::Debug for EncodedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedSecret({} bytes)", self.0.len())
    }
}

impl From<EncodedSecret> for String {
    fn from(secret: EncodedSecret) -> Self {
        secret.to_wire()
    }
}

impl TryFrom<String> for EncodedSecret {
    type Error = SigilError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::from_wire(&text)
    }
}

/// Result of feeding one detected pattern to a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Fewer cells than the configured minimum; pattern discarded
    InsufficientLength { required: usize, actual: usize },
    /// First pass of creation accepted; draw it again to confirm
    CandidateRecorded,
    /// Wrong pattern; more attempts allowed
    Mismatch { attempts: u32 },
    /// Wrong pattern and no attempts left; the challenge is over
    RetriesExhausted { attempts: u32 },
    /// Accepted. Creation carries the new secret
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        secret: Option<EncodedSecret>,
        attempts: u32,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// No further input is accepted after this outcome
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::RetriesExhausted { .. })
    }
}
