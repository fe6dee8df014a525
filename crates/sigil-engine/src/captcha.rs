//! Captcha pattern generation.
//!
//! A captcha pattern is random but easy to redraw after one viewing: every
//! step moves to the nearest unused cell (by Chebyshev distance), picking
//! uniformly among the cells on that nearest ring.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sigil_common::{Cell, Pattern, Result, SigilError};

use crate::grid::Grid;

/// One generated challenge, kept for the lifetime of a verification.
///
/// Hosts hand this back unchanged across reloads so the expected answer
/// never changes under the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaChallenge {
    pub pattern: Pattern,
    pub wired_dots: usize,
}

impl CaptchaChallenge {
    /// Raw cell-sequence equality, no digest involved
    pub fn matches(&self, attempt: &Pattern) -> bool {
        self.pattern == *attempt
    }
}

/// Captcha generator service
#[derive(Debug, Clone, Copy)]
pub struct CaptchaGenerator {
    grid: Grid,
}

impl CaptchaGenerator {
    pub fn new(grid: Grid) -> Self {
        Self { grid }
    }

    /// Generate a new challenge from fresh entropy
    pub fn challenge(&self, wired_dots: usize) -> Result<CaptchaChallenge> {
        let pattern = self.generate(wired_dots)?;
        tracing::debug!(
            wired_dots = wired_dots,
            pattern = %pattern,
            "Generated captcha challenge"
        );
        Ok(CaptchaChallenge {
            pattern,
            wired_dots,
        })
    }

    /// Generate a pattern of `length` cells using the thread-local CSPRNG
    pub fn generate(&self, length: usize) -> Result<Pattern> {
        let mut rng = rand::rng();
        self.generate_with(&mut rng, length)
    }

    /// Generate a pattern of `length` cells from the given random source
    pub fn generate_with<R: Rng>(&self, rng: &mut R, length: usize) -> Result<Pattern> {
        let capacity = self.grid.capacity();
        if length == 0 || length > capacity {
            return Err(SigilError::CaptchaExhausted {
                requested: length,
                capacity,
            });
        }

        let mut pattern = Pattern::new();
        let start = self.grid.cell_of(rng.random_range(0..capacity) as u16)?;
        pattern.push(start);

        while pattern.len() < length {
            let Some(&current) = pattern.last() else {
                break;
            };
            let next = (1..=max_distance(&self.grid, &current)).find_map(|distance| {
                let candidates: Vec<Cell> = ring(&self.grid, &current, distance)
                    .into_iter()
                    .filter(|cell| !pattern.contains(cell))
                    .collect();
                if candidates.is_empty() {
                    None
                } else {
                    Some(candidates[rng.random_range(0..candidates.len())])
                }
            });

            match next {
                Some(cell) => {
                    pattern.push(cell);
                }
                None => {
                    return Err(SigilError::CaptchaExhausted {
                        requested: length,
                        capacity,
                    });
                }
            }
        }

        Ok(pattern)
    }
}

/// Farthest Chebyshev distance from `cell` to any edge of the grid
pub fn max_distance(grid: &Grid, cell: &Cell) -> u8 {
    let last = grid.size() - 1;
    cell.row()
        .max(last - cell.row())
        .max(cell.column())
        .max(last - cell.column())
}

/// In-grid cells at Chebyshev distance exactly `distance` from `center`.
///
/// Walks the square around `center` edge by edge: top (left to right),
/// right, bottom, left. Corners appear once.
pub fn ring(grid: &Grid, center: &Cell, distance: u8) -> Vec<Cell> {
    if distance == 0 {
        return vec![*center];
    }

    let size = i32::from(grid.size());
    let d = i32::from(distance);
    let (row, col) = (i32::from(center.row()), i32::from(center.column()));
    let (top, bottom, left, right) = (row - d, row + d, col - d, col + d);

    let mut coords: Vec<(i32, i32)> = Vec::new();
    for c in left..=right {
        coords.push((top, c));
    }
    for r in top + 1..=bottom {
        coords.push((r, right));
    }
    for c in (left..right).rev() {
        coords.push((bottom, c));
    }
    for r in (top + 1..bottom).rev() {
        coords.push((r, left));
    }

    let mut cells: Vec<Cell> = Vec::new();
    for (r, c) in coords {
        if r < 0 || c < 0 || r >= size || c >= size {
            continue;
        }
        if let Ok(cell) = grid.cell_at(r as u8, c as u8) {
            if !cells.contains(&cell) {
                cells.push(cell);
            }
        }
    }
    cells
}
