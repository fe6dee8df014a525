//! # Sigil Engine
//!
//! Pattern-lock core: turns pointer gestures on an N×N grid into patterns,
//! and runs them through creation, comparison or captcha workflows.
//!
//! ## Architecture
//! ```text
//! PointerEvent → Recognizer → Workflow → Codec / captcha match
//!                    ↓            ↓
//!                  Frame       Outcome (+ deferred reset)
//! ```
//!
//! ## Modules
//! - `grid` - Cell addressing and hit-testing geometry
//! - `codec` - Pattern serialization, SHA-1 digest, pluggable transform
//! - `captcha` - Ring-search captcha generator
//! - `recognizer` - Gesture/display state machine
//! - `workflow` - Create, compare and captcha-verify procedures
//! - `session` - A recognizer wired to a workflow, with reset tickets and snapshots
//! - `store` - Secret storage seam
//! - `config` - Engine tunables

pub mod captcha;
pub mod codec;
pub mod config;
pub mod grid;
pub mod recognizer;
pub mod session;
pub mod store;
pub mod workflow;

pub use captcha::{CaptchaChallenge, CaptchaGenerator};
pub use codec::{Codec, PatternTransform, PepperedSha256, TransformError};
pub use config::EngineConfig;
pub use grid::{Grid, GridGeometry};
pub use recognizer::{Phase, PointerEvent, Recognizer, RecognizerEvent};
pub use session::{ResetTicket, Session, SessionContext, SessionSnapshot, SessionUpdate};
pub use store::{MemoryStore, SecretStore};
pub use workflow::{Mode, ResetAction, SecretSource, Step, Workflow};
