//! Two-pass creation of a new secret pattern.

use std::fmt;

use sigil_common::{DisplayMode, Outcome, Pattern, Result, SigilError};

use super::Step;
use crate::codec::Codec;
use crate::store::SecretStore;

/// Draw once to record a candidate, draw again to confirm it
pub struct CreateFlow {
    codec: Codec,
    min_wired_dots: usize,
    candidate: Option<Pattern>,
    mismatches: u32,
    store: Option<Box<dyn SecretStore>>,
    auto_save: bool,
    closed: bool,
}

impl CreateFlow {
    pub fn new(codec: Codec, min_wired_dots: usize) -> Self {
        Self {
            codec,
            min_wired_dots,
            candidate: None,
            mismatches: 0,
            store: None,
            auto_save: false,
            closed: false,
        }
    }

    /// Save the created secret through `store` on success
    pub fn with_auto_save(mut self, store: Box<dyn SecretStore>) -> Self {
        self.store = Some(store);
        self.auto_save = true;
        self
    }

    /// Resume state recorded before a host reload
    pub fn resume(mut self, candidate: Option<Pattern>, mismatches: u32, closed: bool) -> Self {
        self.candidate = candidate;
        self.mismatches = mismatches;
        self.closed = closed;
        self
    }

    pub fn candidate(&self) -> Option<&Pattern> {
        self.candidate.as_ref()
    }

    pub fn mismatches(&self) -> u32 {
        self.mismatches
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Discard the candidate and wait for a first pass again
    pub fn restart(&mut self) {
        if self.closed {
            return;
        }
        tracing::debug!(had_candidate = self.candidate.is_some(), "Create flow restarted");
        self.candidate = None;
        self.mismatches = 0;
    }

    pub fn on_detected(&mut self, pattern: &Pattern) -> Result<Step> {
        if self.closed {
            return Err(SigilError::ChallengeClosed);
        }

        if pattern.len() < self.min_wired_dots {
            return Ok(Step::new(
                Outcome::InsufficientLength {
                    required: self.min_wired_dots,
                    actual: pattern.len(),
                },
                DisplayMode::Wrong,
            ));
        }

        let Some(candidate) = self.candidate.as_ref() else {
            self.candidate = Some(pattern.clone());
            tracing::debug!(cells = pattern.len(), "Candidate pattern recorded");
            return Ok(Step::new(Outcome::CandidateRecorded, DisplayMode::Correct));
        };

        if candidate != pattern {
            self.mismatches += 1;
            tracing::debug!(mismatches = self.mismatches, "Confirmation pattern differs");
            return Ok(Step::new(
                Outcome::Mismatch {
                    attempts: self.mismatches,
                },
                DisplayMode::Wrong,
            ));
        }

        let secret = match self.codec.encode(candidate) {
            Ok(secret) => secret,
            Err(err) => {
                self.closed = true;
                return Err(err);
            }
        };
        // A failed save keeps the candidate so the confirmation can be redrawn
        if self.auto_save {
            if let Some(store) = self.store.as_mut() {
                store.save(&secret)?;
            }
        }
        self.closed = true;

        tracing::info!(
            cells = candidate.len(),
            auto_saved = self.auto_save,
            "New pattern created"
        );
        Ok(Step::new(
            Outcome::Success {
                secret: Some(secret),
                attempts: self.mismatches + 1,
            },
            DisplayMode::Correct,
        ))
    }
}

impl fmt::Debug for CreateFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateFlow")
            .field("min_wired_dots", &self.min_wired_dots)
            .field("has_candidate", &self.candidate.is_some())
            .field("mismatches", &self.mismatches)
            .field("auto_save", &self.auto_save)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{self, TransformError};
    use crate::store::MemoryStore;
    use sigil_common::EncodedSecret;
    use std::sync::Arc;

    /// Fails the first `failures` saves, then writes through to `inner`
    struct FlakyStore {
        failures: u32,
        inner: MemoryStore,
    }

    impl SecretStore for FlakyStore {
        fn load(&self) -> Result<Option<EncodedSecret>> {
            self.inner.load()
        }

        fn save(&mut self, secret: &EncodedSecret) -> Result<()> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(SigilError::Store("backend down".to_string()));
            }
            self.inner.save(secret)
        }
    }

    fn pattern(ids: &[u16]) -> Pattern {
        Pattern::from_ids(ids, 3).unwrap()
    }

    #[test]
    fn test_diverging_confirmation_keeps_candidate() {
        let mut flow = CreateFlow::new(Codec::default(), 4);
        let abcd = pattern(&[0, 1, 2, 5]);
        let abce = pattern(&[0, 1, 2, 4]);

        let first = flow.on_detected(&abcd).unwrap();
        assert_eq!(first.outcome, Outcome::CandidateRecorded);

        let second = flow.on_detected(&abce).unwrap();
        assert_eq!(second.outcome, Outcome::Mismatch { attempts: 1 });
        assert_eq!(second.display_mode, DisplayMode::Wrong);
        assert_eq!(flow.candidate(), Some(&abcd));

        let third = flow.on_detected(&abcd).unwrap();
        assert_eq!(
            third.outcome,
            Outcome::Success {
                secret: Some(codec::encode(&abcd, None).unwrap()),
                attempts: 2,
            }
        );
        assert!(flow.is_closed());
    }

    #[test]
    fn test_short_pattern_is_discarded() {
        let mut flow = CreateFlow::new(Codec::default(), 4);
        let step = flow.on_detected(&pattern(&[0, 1, 2])).unwrap();
        assert_eq!(
            step.outcome,
            Outcome::InsufficientLength {
                required: 4,
                actual: 3
            }
        );
        assert_eq!(step.display_mode, DisplayMode::Wrong);
        assert!(step.reset.is_none());
        assert!(flow.candidate().is_none());
    }

    #[test]
    fn test_short_confirmation_keeps_candidate() {
        let mut flow = CreateFlow::new(Codec::default(), 4);
        flow.on_detected(&pattern(&[0, 1, 2, 5])).unwrap();
        let step = flow.on_detected(&pattern(&[0, 1])).unwrap();
        assert!(matches!(step.outcome, Outcome::InsufficientLength { .. }));
        assert!(flow.candidate().is_some());
    }

    #[test]
    fn test_restart_discards_candidate() {
        let mut flow = CreateFlow::new(Codec::default(), 4);
        flow.on_detected(&pattern(&[0, 1, 2, 5])).unwrap();
        flow.restart();
        assert!(flow.candidate().is_none());

        let step = flow.on_detected(&pattern(&[8, 7, 6, 3])).unwrap();
        assert_eq!(step.outcome, Outcome::CandidateRecorded);
    }

    #[test]
    fn test_auto_save_writes_store() {
        let store = MemoryStore::new();
        let mut flow = CreateFlow::new(Codec::default(), 4).with_auto_save(Box::new(store.clone()));
        let p = pattern(&[0, 1, 2, 5, 8]);
        flow.on_detected(&p).unwrap();
        flow.on_detected(&p).unwrap();
        assert_eq!(store.load().unwrap(), Some(codec::encode(&p, None).unwrap()));
    }

    #[test]
    fn test_transform_failure_aborts_creation() {
        let broken = |_: &[u8]| -> std::result::Result<Vec<u8>, TransformError> {
            Err(TransformError("no key".to_string()))
        };
        let store = MemoryStore::new();
        let mut flow = CreateFlow::new(Codec::new(Some(Arc::new(broken))), 4)
            .with_auto_save(Box::new(store.clone()));
        let p = pattern(&[0, 1, 2, 5]);
        flow.on_detected(&p).unwrap();

        assert!(matches!(flow.on_detected(&p), Err(SigilError::Transform(_))));
        assert_eq!(store.load().unwrap(), None);
        assert!(matches!(flow.on_detected(&p), Err(SigilError::ChallengeClosed)));
    }

    #[test]
    fn test_failed_save_leaves_confirmation_open() {
        let saved = MemoryStore::new();
        let store = FlakyStore {
            failures: 1,
            inner: saved.clone(),
        };
        let mut flow = CreateFlow::new(Codec::default(), 4).with_auto_save(Box::new(store));
        let p = pattern(&[0, 1, 2, 5, 8]);
        flow.on_detected(&p).unwrap();

        assert!(matches!(flow.on_detected(&p), Err(SigilError::Store(_))));
        assert!(!flow.is_closed());
        assert_eq!(flow.candidate(), Some(&p));

        let step = flow.on_detected(&p).unwrap();
        let expected = codec::encode(&p, None).unwrap();
        assert_eq!(
            step.outcome,
            Outcome::Success {
                secret: Some(expected.clone()),
                attempts: 1,
            }
        );
        assert!(flow.is_closed());
        assert_eq!(saved.load().unwrap(), Some(expected));
    }
}
