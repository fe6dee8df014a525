//! One challenge: a recognizer wired to a workflow.
//!
//! The session feeds pointer input to the recognizer, hands detected patterns
//! to the workflow and applies the display mode it answers with. A wrong
//! attempt yields a [`ResetTicket`]; the host waits `ticket.delay` and calls
//! [`Session::fire_reset`]. Any later pointer-down makes the ticket stale.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sigil_common::{DisplayMode, Frame, Outcome, Pattern, Result, SigilError};

use crate::captcha::{CaptchaChallenge, CaptchaGenerator};
use crate::codec::Codec;
use crate::config::EngineConfig;
use crate::grid::{Grid, GridGeometry};
use crate::recognizer::{Phase, PointerEvent, Recognizer, RecognizerEvent};
use crate::store::SecretStore;
use crate::workflow::{
    CaptchaFlow, CompareFlow, CreateFlow, Mode, ResetAction, RetryCounter, SecretSource, Workflow,
};

/// Everything a host injects into a session
pub struct SessionContext {
    pub config: EngineConfig,
    pub geometry: GridGeometry,
    pub codec: Codec,
    pub store: Option<Box<dyn SecretStore>>,
}

impl SessionContext {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            geometry: GridGeometry::default(),
            codec: Codec::default(),
            store: None,
        }
    }

    pub fn with_geometry(mut self, geometry: GridGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_store(mut self, store: Box<dyn SecretStore>) -> Self {
        self.store = Some(store);
        self
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("config", &self.config)
            .field("geometry", &self.geometry)
            .field("codec", &self.codec)
            .field("store", &self.store.is_some())
            .finish()
    }
}

/// A deferred reset, valid until the next pointer-down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetTicket {
    pub generation: u64,
    pub delay: Duration,
}

/// Result of one pointer event
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    pub events: Vec<RecognizerEvent>,
    pub outcome: Option<Outcome>,
    pub frame: Frame,
    pub reset: Option<ResetTicket>,
}

/// Serializable session state for carrying a challenge across host reloads.
///
/// The compare secret is never included; restoring a compare session takes
/// the secret source again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub mode: Mode,
    pub frame: Frame,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Pattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captcha: Option<CaptchaChallenge>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub closed: bool,
    /// Reset that had not fired when the snapshot was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_reset: Option<ResetAction>,
}

#[derive(Debug)]
pub struct Session {
    recognizer: Recognizer,
    workflow: Workflow,
    reset_delay: Duration,
    generation: u64,
    pending: Option<(u64, ResetAction)>,
}

impl Session {
    /// Two-pass creation of a new secret
    pub fn create(ctx: SessionContext) -> Result<Self> {
        ctx.config.validate()?;
        let flow = create_flow(ctx.codec, &ctx.config, ctx.store);
        Self::build(&ctx.config, ctx.geometry, Workflow::Create(flow))
    }

    /// Verify against a secret resolved from `source`
    pub fn compare(ctx: SessionContext, source: SecretSource) -> Result<Self> {
        ctx.config.validate()?;
        let flow = CompareFlow::new(
            ctx.codec,
            source,
            ctx.store.as_deref(),
            ctx.config.max_retries,
        )?;
        Self::build(&ctx.config, ctx.geometry, Workflow::Compare(flow))
    }

    /// Captcha with a freshly generated challenge
    pub fn captcha(ctx: SessionContext) -> Result<Self> {
        ctx.config.validate()?;
        let challenge =
            CaptchaGenerator::new(ctx.config.grid()?).challenge(ctx.config.captcha_wired_dots)?;
        Self::captcha_with(ctx, challenge)
    }

    /// Captcha with a challenge the host already holds
    pub fn captcha_with(ctx: SessionContext, challenge: CaptchaChallenge) -> Result<Self> {
        ctx.config.validate()?;
        check_grid(&ctx.config.grid()?, &challenge.pattern)?;
        let flow = CaptchaFlow::new(challenge, ctx.config.max_retries);
        Self::build(&ctx.config, ctx.geometry, Workflow::Captcha(flow))
    }

    /// Rebuild a session from a snapshot. Compare sessions need `source`.
    pub fn restore(
        ctx: SessionContext,
        snapshot: SessionSnapshot,
        source: Option<SecretSource>,
    ) -> Result<Self> {
        ctx.config.validate()?;
        let grid = ctx.config.grid()?;
        check_grid(&grid, &snapshot.frame.pattern)?;
        let retries =
            RetryCounter::resume(ctx.config.max_retries, snapshot.attempts, snapshot.closed);

        let workflow = match snapshot.mode {
            Mode::Create => {
                if let Some(candidate) = &snapshot.candidate {
                    check_grid(&grid, candidate)?;
                }
                let flow = create_flow(ctx.codec, &ctx.config, ctx.store).resume(
                    snapshot.candidate,
                    snapshot.attempts,
                    snapshot.closed,
                );
                Workflow::Create(flow)
            }
            Mode::Compare => {
                let source = source.ok_or_else(|| {
                    SigilError::Config("Restoring a compare session needs a secret source".to_string())
                })?;
                let flow = CompareFlow::new(
                    ctx.codec,
                    source,
                    ctx.store.as_deref(),
                    ctx.config.max_retries,
                )?;
                Workflow::Compare(flow.with_retries(retries))
            }
            Mode::Captcha => {
                let challenge = snapshot.captcha.ok_or_else(|| {
                    SigilError::Config("Captcha snapshot carries no challenge".to_string())
                })?;
                check_grid(&grid, &challenge.pattern)?;
                let flow = CaptchaFlow::new(challenge, ctx.config.max_retries);
                Workflow::Captcha(flow.with_retries(retries))
            }
        };

        let mut session = Self::build(&ctx.config, ctx.geometry, workflow)?;
        session
            .recognizer
            .show(snapshot.frame.display_mode, snapshot.frame.pattern);
        if !session.workflow.is_closed() {
            session.pending = snapshot.pending_reset.map(|action| (session.generation, action));
        }
        tracing::debug!(mode = ?snapshot.mode, attempts = snapshot.attempts, "Session restored");
        Ok(session)
    }

    fn build(config: &EngineConfig, geometry: GridGeometry, workflow: Workflow) -> Result<Self> {
        // Captcha challenges must stay visible
        let stealth = config.stealth_mode && workflow.mode() != Mode::Captcha;
        let mut recognizer = Recognizer::new(config.grid()?, geometry).with_stealth(stealth);
        if let Some((mode, pattern)) = workflow.initial_display() {
            recognizer.show(mode, pattern);
        }

        Ok(Self {
            recognizer,
            workflow,
            reset_delay: config.reset_delay(),
            generation: 0,
            pending: None,
        })
    }

    pub fn mode(&self) -> Mode {
        self.workflow.mode()
    }

    pub fn grid(&self) -> &Grid {
        self.recognizer.grid()
    }

    pub fn frame(&self) -> Frame {
        self.recognizer.frame()
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn is_closed(&self) -> bool {
        self.workflow.is_closed()
    }

    /// Ticket for the reset still waiting to fire, if any
    pub fn pending_reset(&self) -> Option<ResetTicket> {
        self.pending.as_ref().map(|(generation, _)| ResetTicket {
            generation: *generation,
            delay: self.reset_delay,
        })
    }

    pub fn handle(&mut self, event: PointerEvent) -> Result<SessionUpdate> {
        if self.workflow.is_closed() {
            return Err(SigilError::ChallengeClosed);
        }

        if matches!(event, PointerEvent::Down { .. }) && self.recognizer.phase() != Phase::InProgress {
            self.generation += 1;
            if self.pending.take().is_some() {
                tracing::debug!(generation = self.generation, "Pending reset superseded");
            }
        }

        let events = self.recognizer.handle(event);
        let mut outcome = None;
        let mut reset = None;

        for event in &events {
            match event {
                RecognizerEvent::Detected(pattern) => {
                    let step = self.workflow.on_detected(pattern)?;
                    self.recognizer.set_display_mode(step.display_mode);
                    reset = step.reset.map(|action| self.schedule(action));
                    outcome = Some(step.outcome);
                }
                RecognizerEvent::Cleared => {
                    if let Some(action) = self.workflow.on_cleared() {
                        self.apply(action);
                    }
                }
                RecognizerEvent::Started | RecognizerEvent::CellAdded(_) => {}
            }
        }

        Ok(SessionUpdate {
            events,
            outcome,
            frame: self.recognizer.frame(),
            reset,
        })
    }

    /// Apply a deferred reset. Stale or already fired tickets do nothing.
    pub fn fire_reset(&mut self, ticket: ResetTicket) -> Option<Frame> {
        match self.pending.take() {
            Some((generation, action)) if generation == ticket.generation => {
                self.apply(action);
                Some(self.recognizer.frame())
            }
            other => {
                self.pending = other;
                None
            }
        }
    }

    /// Start the challenge over from its initial display. Create sessions
    /// also drop their candidate.
    pub fn restart(&mut self) -> Frame {
        self.generation += 1;
        self.pending = None;
        self.workflow.restart();
        self.recognizer.clear();
        if let Some((mode, pattern)) = self.workflow.initial_display() {
            self.recognizer.show(mode, pattern);
        }
        self.recognizer.frame()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let (candidate, captcha) = match &self.workflow {
            Workflow::Create(flow) => (flow.candidate().cloned(), None),
            Workflow::Compare(_) => (None, None),
            Workflow::Captcha(flow) => (None, Some(flow.challenge().clone())),
        };

        SessionSnapshot {
            mode: self.workflow.mode(),
            frame: self.recognizer.frame(),
            candidate,
            captcha,
            attempts: self.workflow.attempts(),
            closed: self.workflow.is_closed(),
            pending_reset: self.pending.as_ref().map(|(_, action)| action.clone()),
        }
    }

    fn schedule(&mut self, action: ResetAction) -> ResetTicket {
        self.pending = Some((self.generation, action));
        ResetTicket {
            generation: self.generation,
            delay: self.reset_delay,
        }
    }

    fn apply(&mut self, action: ResetAction) {
        match action {
            ResetAction::Clear => {
                self.recognizer.clear();
            }
            ResetAction::Replay(pattern) => self.recognizer.show(DisplayMode::Animate, pattern),
        }
    }
}

fn create_flow(
    codec: Codec,
    config: &EngineConfig,
    store: Option<Box<dyn SecretStore>>,
) -> CreateFlow {
    let flow = CreateFlow::new(codec, config.min_wired_dots);
    match store {
        Some(store) if config.auto_save => flow.with_auto_save(store),
        _ => flow,
    }
}

fn check_grid(grid: &Grid, pattern: &Pattern) -> Result<()> {
    match pattern.iter().find(|cell| cell.grid_size() != grid.size()) {
        Some(cell) => Err(SigilError::InvalidCell {
            row: u16::from(cell.row()),
            column: u16::from(cell.column()),
            size: grid.size(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::store::MemoryStore;

    fn at(id: u16) -> (f32, f32) {
        let cell = Grid::new(3).unwrap().cell_of(id).unwrap();
        GridGeometry::unit().cell_center(&cell)
    }

    /// Draw `ids` as one gesture; returns the update for the release
    fn draw(session: &mut Session, ids: &[u16]) -> SessionUpdate {
        let (x, y) = at(ids[0]);
        session.handle(PointerEvent::Down { x, y }).unwrap();
        for &id in &ids[1..] {
            let (x, y) = at(id);
            session.handle(PointerEvent::Move { x, y }).unwrap();
        }
        session.handle(PointerEvent::Up).unwrap()
    }

    fn pattern(ids: &[u16]) -> Pattern {
        Pattern::from_ids(ids, 3).unwrap()
    }

    fn compare_session(max_retries: u32) -> Session {
        let config = EngineConfig {
            max_retries,
            ..Default::default()
        };
        Session::compare(
            SessionContext::new(config),
            SecretSource::Pattern(pattern(&[0, 1, 2, 5, 8])),
        )
        .unwrap()
    }

    fn captcha_session() -> Session {
        let challenge = CaptchaChallenge {
            pattern: pattern(&[0, 1, 4, 3]),
            wired_dots: 4,
        };
        let config = EngineConfig {
            stealth_mode: true,
            ..Default::default()
        };
        Session::captcha_with(SessionContext::new(config), challenge).unwrap()
    }

    #[test]
    fn test_create_end_to_end_saves_secret() {
        let store = MemoryStore::new();
        let ctx = SessionContext::new(EngineConfig::default()).with_store(Box::new(store.clone()));
        let mut session = Session::create(ctx).unwrap();

        let first = draw(&mut session, &[0, 1, 2, 5, 8]);
        assert_eq!(first.outcome, Some(Outcome::CandidateRecorded));

        let second = draw(&mut session, &[0, 1, 2, 5, 8]);
        let secret = codec::encode(&pattern(&[0, 1, 2, 5, 8]), None).unwrap();
        assert_eq!(secret.as_bytes(), b"ffec1e70d113b0b96c7e6cb2b33460e24407a96e");
        assert_eq!(
            second.outcome,
            Some(Outcome::Success {
                secret: Some(secret.clone()),
                attempts: 1
            })
        );
        assert_eq!(store.load().unwrap(), Some(secret));
        assert!(session.is_closed());
    }

    #[test]
    fn test_wrong_attempt_resets_after_ticket_fires() {
        let mut session = compare_session(5);
        let update = draw(&mut session, &[6, 7, 8, 5]);
        assert_eq!(update.outcome, Some(Outcome::Mismatch { attempts: 1 }));
        assert_eq!(update.frame.display_mode, DisplayMode::Wrong);

        let ticket = update.reset.unwrap();
        assert_eq!(ticket.delay, Duration::from_secs(1));
        let frame = session.fire_reset(ticket).unwrap();
        assert_eq!(frame, Frame::default());

        assert!(session.fire_reset(ticket).is_none());
    }

    #[test]
    fn test_new_gesture_cancels_pending_reset() {
        let mut session = compare_session(5);
        let ticket = draw(&mut session, &[6, 7, 8, 5]).reset.unwrap();

        let (x, y) = at(4);
        session.handle(PointerEvent::Down { x, y }).unwrap();
        assert!(session.pending_reset().is_none());
        assert!(session.fire_reset(ticket).is_none());
        assert_eq!(session.frame().pattern, pattern(&[4]));
    }

    #[test]
    fn test_exhausted_session_rejects_input() {
        let mut session = compare_session(3);
        draw(&mut session, &[6, 7, 8, 5]);
        draw(&mut session, &[6, 7, 8, 5]);
        let last = draw(&mut session, &[6, 7, 8, 5]);
        assert_eq!(last.outcome, Some(Outcome::RetriesExhausted { attempts: 3 }));
        assert!(last.reset.is_none());

        let (x, y) = at(0);
        assert_eq!(
            session.handle(PointerEvent::Down { x, y }),
            Err(SigilError::ChallengeClosed)
        );
    }

    #[test]
    fn test_captcha_shows_challenge_without_stealth() {
        let session = captcha_session();
        let frame = session.frame();
        assert_eq!(frame.display_mode, DisplayMode::Animate);
        assert_eq!(frame.pattern, pattern(&[0, 1, 4, 3]));
        assert!(!frame.stealth);
    }

    #[test]
    fn test_captcha_mismatch_replays_challenge() {
        let mut session = captcha_session();
        let update = draw(&mut session, &[0, 1, 2]);
        assert_eq!(update.frame.display_mode, DisplayMode::Wrong);

        let frame = session.fire_reset(update.reset.unwrap()).unwrap();
        assert_eq!(frame.display_mode, DisplayMode::Animate);
        assert_eq!(frame.pattern, pattern(&[0, 1, 4, 3]));

        let solved = draw(&mut session, &[0, 1, 4, 3]);
        assert_eq!(
            solved.outcome,
            Some(Outcome::Success {
                secret: None,
                attempts: 2
            })
        );
    }

    #[test]
    fn test_captcha_empty_release_replays_immediately() {
        let mut session = captcha_session();
        session.handle(PointerEvent::Down { x: 1.0, y: 1.0 }).unwrap();
        let update = session.handle(PointerEvent::Up).unwrap();
        assert_eq!(update.events, vec![RecognizerEvent::Cleared]);
        assert_eq!(update.frame.display_mode, DisplayMode::Animate);
        assert_eq!(update.frame.pattern, pattern(&[0, 1, 4, 3]));
    }

    #[test]
    fn test_cancel_mid_gesture_is_idempotent() {
        let mut session = compare_session(5);
        let (x, y) = at(0);
        session.handle(PointerEvent::Down { x, y }).unwrap();
        let first = session.handle(PointerEvent::Cancel).unwrap();
        assert_eq!(first.events, vec![RecognizerEvent::Cleared]);
        let second = session.handle(PointerEvent::Cancel).unwrap();
        assert!(second.events.is_empty());
        assert_eq!(second.frame, Frame::default());
    }

    #[test]
    fn test_captcha_snapshot_reproduces_challenge() {
        let mut session = Session::captcha(SessionContext::new(EngineConfig::default())).unwrap();
        let expected = session.frame().pattern;
        assert_eq!(expected.len(), 4);
        draw(&mut session, &[8, 7, 6]);

        let json = serde_json::to_string(&session.snapshot()).unwrap();
        let snapshot: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot.attempts, 1);
        assert_eq!(snapshot.pending_reset, Some(ResetAction::Replay(expected.clone())));

        let mut restored =
            Session::restore(SessionContext::new(EngineConfig::default()), snapshot, None).unwrap();
        assert_eq!(restored.frame().display_mode, DisplayMode::Wrong);

        let ticket = restored.pending_reset().unwrap();
        let frame = restored.fire_reset(ticket).unwrap();
        assert_eq!(frame.pattern, expected);
        assert_eq!(restored.workflow().attempts(), 1);
    }

    #[test]
    fn test_restore_create_keeps_candidate() {
        let mut session = Session::create(SessionContext::new(EngineConfig::default())).unwrap();
        draw(&mut session, &[0, 1, 2, 5]);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.candidate, Some(pattern(&[0, 1, 2, 5])));

        let mut restored =
            Session::restore(SessionContext::new(EngineConfig::default()), snapshot, None).unwrap();
        let update = draw(&mut restored, &[0, 1, 2, 5]);
        assert!(update.outcome.unwrap().is_success());
    }

    #[test]
    fn test_restore_compare_requires_source() {
        let mut session = compare_session(5);
        draw(&mut session, &[6, 7, 8, 5]);
        let snapshot = session.snapshot();

        let err = Session::restore(
            SessionContext::new(EngineConfig::default()),
            snapshot.clone(),
            None,
        )
        .unwrap_err();
        assert!(err.is_configuration());

        let mut restored = Session::restore(
            SessionContext::new(EngineConfig::default()),
            snapshot,
            Some(SecretSource::Pattern(pattern(&[0, 1, 2, 5, 8]))),
        )
        .unwrap();
        let (x, y) = at(0);
        restored.handle(PointerEvent::Down { x, y }).unwrap();
        for id in [1, 2, 5, 8] {
            let (x, y) = at(id);
            restored.handle(PointerEvent::Move { x, y }).unwrap();
        }
        let update = restored.handle(PointerEvent::Up).unwrap();
        assert_eq!(
            update.outcome,
            Some(Outcome::Success {
                secret: None,
                attempts: 2
            })
        );
    }

    #[test]
    fn test_restart_drops_create_candidate() {
        let mut session = Session::create(SessionContext::new(EngineConfig::default())).unwrap();
        draw(&mut session, &[0, 1, 2, 5]);
        let frame = session.restart();
        assert_eq!(frame, Frame::default());

        let update = draw(&mut session, &[8, 7, 6, 3]);
        assert_eq!(update.outcome, Some(Outcome::CandidateRecorded));
    }

    #[test]
    fn test_foreign_grid_challenge_is_rejected() {
        let challenge = CaptchaChallenge {
            pattern: Pattern::from_ids(&[0, 1, 5, 10], 4).unwrap(),
            wired_dots: 4,
        };
        let err = Session::captcha_with(SessionContext::new(EngineConfig::default()), challenge)
            .unwrap_err();
        assert!(err.is_contract_violation());
    }
}
