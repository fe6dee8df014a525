//! Gesture recognizer and display state machine.
//!
//! Turns a stream of pointer positions into cell-enter events and a finished
//! pattern. Each input returns the events it produced; nothing is delivered
//! through callbacks.
//!
//! ```text
//!            Down                    Up (cells drawn)
//!   Idle ───────────▶ InProgress ─────────────────▶ Detected
//!    ▲                   │  ▲ Move: CellAdded           │
//!    │   Up (no cells)   │  └──────────┘                │
//!    └───────────────────┘                              │
//!    ▲        Clear / Cancel (any state)                │
//!    └──────────────────────────────────────────────────┘
//! ```
//!
//! The recognizer never decides whether a pattern is right or wrong. It forces
//! `Correct` when a gesture starts; the workflow sets everything else.

use serde::{Deserialize, Serialize};
use sigil_common::{Cell, DisplayMode, Frame, Pattern};

use crate::grid::{Grid, GridGeometry};

/// Raw pointer input, in surface coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointerEvent {
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up,
    /// The input surface went away mid-gesture
    Cancel,
}

/// Lifecycle signal produced by the recognizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "snake_case")]
pub enum RecognizerEvent {
    Started,
    /// The in-progress pattern after a new cell was entered
    CellAdded(Pattern),
    /// The finished pattern, detached from the live buffer
    Detected(Pattern),
    Cleared,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    InProgress,
    Detected,
}

/// Pointer-to-pattern state machine for one grid
#[derive(Debug, Clone)]
pub struct Recognizer {
    grid: Grid,
    geometry: GridGeometry,
    phase: Phase,
    pattern: Pattern,
    display_mode: DisplayMode,
    stealth: bool,
    last_point: Option<(f32, f32)>,
}

impl Recognizer {
    pub fn new(grid: Grid, geometry: GridGeometry) -> Self {
        Self {
            grid,
            geometry,
            phase: Phase::Idle,
            pattern: Pattern::new(),
            display_mode: DisplayMode::Correct,
            stealth: false,
            last_point: None,
        }
    }

    /// Hide the drawn path from the renderer
    pub fn with_stealth(mut self, stealth: bool) -> Self {
        self.stealth = stealth;
        self
    }

    pub fn set_stealth(&mut self, stealth: bool) {
        self.stealth = stealth;
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        self.display_mode = mode;
    }

    /// Snapshot for the renderer
    pub fn frame(&self) -> Frame {
        Frame {
            pattern: self.pattern.clone(),
            display_mode: self.display_mode,
            stealth: self.stealth,
        }
    }

    /// Display a pattern that was not drawn by the user (e.g. a captcha)
    pub fn show(&mut self, mode: DisplayMode, pattern: Pattern) {
        self.phase = Phase::Idle;
        self.last_point = None;
        self.pattern = pattern;
        self.display_mode = mode;
    }

    pub fn handle(&mut self, event: PointerEvent) -> Vec<RecognizerEvent> {
        match event {
            PointerEvent::Down { x, y } => self.pointer_down(x, y),
            PointerEvent::Move { x, y } => self.pointer_move(x, y),
            PointerEvent::Up => self.pointer_up(),
            PointerEvent::Cancel => self.cancel(),
        }
    }

    pub fn pointer_down(&mut self, x: f32, y: f32) -> Vec<RecognizerEvent> {
        if self.phase == Phase::InProgress {
            // A second contact mid-gesture is just more movement
            return self.pointer_move(x, y);
        }

        self.pattern.clear();
        self.display_mode = DisplayMode::Correct;
        self.phase = Phase::InProgress;
        self.last_point = Some((x, y));

        let mut events = vec![RecognizerEvent::Started];
        if let Some(cell) = self.geometry.hit_test(&self.grid, x, y) {
            self.enter(cell, &mut events);
        }
        tracing::trace!(x, y, "Gesture started");
        events
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) -> Vec<RecognizerEvent> {
        if self.phase != Phase::InProgress {
            return Vec::new();
        }

        let mut events = Vec::new();
        let from = self.last_point.unwrap_or((x, y));
        for cell in self.crossed_cells(from, (x, y)) {
            self.enter(cell, &mut events);
        }
        self.last_point = Some((x, y));
        events
    }

    pub fn pointer_up(&mut self) -> Vec<RecognizerEvent> {
        if self.phase != Phase::InProgress {
            return Vec::new();
        }
        self.last_point = None;

        if self.pattern.is_empty() {
            self.phase = Phase::Idle;
            return vec![RecognizerEvent::Cleared];
        }

        self.phase = Phase::Detected;
        tracing::debug!(pattern = %self.pattern, "Pattern detected");
        vec![RecognizerEvent::Detected(self.pattern.clone())]
    }

    /// Abnormal end of the pointer stream. Only an in-progress gesture is
    /// dropped; a finished or displayed pattern stays.
    pub fn cancel(&mut self) -> Vec<RecognizerEvent> {
        if self.phase != Phase::InProgress {
            return Vec::new();
        }
        tracing::debug!(cells = self.pattern.len(), "Gesture cancelled");
        self.clear()
    }

    /// Reset to idle with nothing displayed
    pub fn clear(&mut self) -> Vec<RecognizerEvent> {
        let had_state = self.phase != Phase::Idle || !self.pattern.is_empty();
        self.phase = Phase::Idle;
        self.last_point = None;
        self.pattern.clear();
        self.display_mode = DisplayMode::Correct;

        if had_state {
            vec![RecognizerEvent::Cleared]
        } else {
            Vec::new()
        }
    }

    fn enter(&mut self, cell: Cell, events: &mut Vec<RecognizerEvent>) {
        if self.pattern.push(cell) {
            tracing::trace!(cell = %cell, "Cell added");
            events.push(RecognizerEvent::CellAdded(self.pattern.clone()));
        }
    }

    /// Cells hit along the segment `from -> to`, in crossing order.
    ///
    /// Sampled at a quarter of a cell so a fast swipe does not jump over a
    /// cell it passed through.
    fn crossed_cells(&self, from: (f32, f32), to: (f32, f32)) -> Vec<Cell> {
        let (dx, dy) = (to.0 - from.0, to.1 - from.1);
        let length = (dx * dx + dy * dy).sqrt();
        let step = (self.geometry.cell_size / 4.0).max(f32::EPSILON);
        let samples = if length.is_finite() {
            ((length / step).ceil() as usize).clamp(1, 4096)
        } else {
            1
        };

        let mut cells: Vec<Cell> = Vec::new();
        for i in 1..=samples {
            let t = i as f32 / samples as f32;
            let point = (from.0 + dx * t, from.1 + dy * t);
            if let Some(cell) = self.geometry.hit_test(&self.grid, point.0, point.1) {
                if cells.last() != Some(&cell) {
                    cells.push(cell);
                }
            }
        }
        cells
    }
}
