//! Verification flows: compare against a secret, or redraw a captcha.

use std::fmt;

use sigil_common::{DisplayMode, EncodedSecret, Outcome, Pattern, Result, SigilError};

use super::{ResetAction, SecretSource, Step};
use crate::captcha::CaptchaChallenge;
use crate::codec::Codec;
use crate::store::SecretStore;

/// Wrong-attempt accounting shared by compare and captcha flows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounter {
    max: u32,
    count: u32,
    closed: bool,
}

impl RetryCounter {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            count: 0,
            closed: false,
        }
    }

    /// Resume a counter after a host reload
    pub fn resume(max: u32, count: u32, closed: bool) -> Self {
        Self { max, count, closed }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(SigilError::ChallengeClosed)
        } else {
            Ok(())
        }
    }

    /// A correct attempt; the reported count includes it
    fn success(&mut self) -> Outcome {
        self.closed = true;
        Outcome::Success {
            secret: None,
            attempts: self.count + 1,
        }
    }

    /// A wrong attempt; exhausts the counter once `max` is reached
    fn failure(&mut self) -> Outcome {
        self.count += 1;
        if self.count >= self.max {
            self.closed = true;
            tracing::warn!(attempts = self.count, "Retries exhausted");
            Outcome::RetriesExhausted {
                attempts: self.count,
            }
        } else {
            Outcome::Mismatch {
                attempts: self.count,
            }
        }
    }
}

/// Encode each attempt and compare it with the expected secret
pub struct CompareFlow {
    codec: Codec,
    expected: EncodedSecret,
    retries: RetryCounter,
}

impl CompareFlow {
    /// Resolve the expected secret once, up front
    pub fn new(
        codec: Codec,
        source: SecretSource,
        store: Option<&dyn SecretStore>,
        max_retries: u32,
    ) -> Result<Self> {
        let expected = match source {
            SecretSource::Secret(secret) => secret,
            SecretSource::Pattern(pattern) => codec.encode(&pattern)?,
            SecretSource::Store => store
                .ok_or_else(|| SigilError::Config("No secret store configured".to_string()))?
                .load()?
                .ok_or_else(|| SigilError::Config("No stored secret to compare against".to_string()))?,
        };

        Ok(Self {
            codec,
            expected,
            retries: RetryCounter::new(max_retries),
        })
    }

    pub fn with_retries(mut self, retries: RetryCounter) -> Self {
        self.retries = retries;
        self
    }

    pub fn retries(&self) -> &RetryCounter {
        &self.retries
    }

    pub fn on_detected(&mut self, pattern: &Pattern) -> Result<Step> {
        self.retries.ensure_open()?;

        let attempt = match self.codec.encode(pattern) {
            Ok(secret) => secret,
            Err(e) => {
                self.retries.closed = true;
                return Err(e);
            }
        };

        if attempt == self.expected {
            let outcome = self.retries.success();
            tracing::info!(outcome = ?outcome, "Pattern verified");
            return Ok(Step::new(outcome, DisplayMode::Correct));
        }

        let outcome = self.retries.failure();
        tracing::debug!(outcome = ?outcome, "Pattern rejected");
        let step = Step::new(outcome, DisplayMode::Wrong);
        Ok(if self.retries.is_closed() {
            step
        } else {
            step.with_reset(ResetAction::Clear)
        })
    }
}

impl fmt::Debug for CompareFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompareFlow")
            .field("codec", &self.codec)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

/// Redraw a generated pattern, compared cell by cell
#[derive(Debug)]
pub struct CaptchaFlow {
    challenge: CaptchaChallenge,
    retries: RetryCounter,
}

impl CaptchaFlow {
    pub fn new(challenge: CaptchaChallenge, max_retries: u32) -> Self {
        Self {
            challenge,
            retries: RetryCounter::new(max_retries),
        }
    }

    pub fn with_retries(mut self, retries: RetryCounter) -> Self {
        self.retries = retries;
        self
    }

    pub fn challenge(&self) -> &CaptchaChallenge {
        &self.challenge
    }

    pub fn retries(&self) -> &RetryCounter {
        &self.retries
    }

    pub(crate) fn replay(&self) -> ResetAction {
        ResetAction::Replay(self.challenge.pattern.clone())
    }

    pub fn on_detected(&mut self, pattern: &Pattern) -> Result<Step> {
        self.retries.ensure_open()?;

        if self.challenge.matches(pattern) {
            let outcome = self.retries.success();
            tracing::info!(outcome = ?outcome, "Captcha solved");
            return Ok(Step::new(outcome, DisplayMode::Correct));
        }

        let outcome = self.retries.failure();
        tracing::debug!(outcome = ?outcome, "Captcha attempt rejected");
        let step = Step::new(outcome, DisplayMode::Wrong);
        Ok(if self.retries.is_closed() {
            step
        } else {
            step.with_reset(self.replay())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{self, TransformError};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn pattern(ids: &[u16]) -> Pattern {
        Pattern::from_ids(ids, 3).unwrap()
    }

    fn compare_flow(max: u32) -> CompareFlow {
        CompareFlow::new(
            Codec::default(),
            SecretSource::Pattern(pattern(&[0, 1, 2, 5, 8])),
            None,
            max,
        )
        .unwrap()
    }

    #[test]
    fn test_three_wrong_attempts_exhaust_three_retries() {
        let mut flow = compare_flow(3);
        let wrong = pattern(&[6, 7, 8, 5]);

        let first = flow.on_detected(&wrong).unwrap();
        assert_eq!(first.outcome, Outcome::Mismatch { attempts: 1 });
        assert_eq!(first.reset, Some(ResetAction::Clear));

        flow.on_detected(&wrong).unwrap();
        let third = flow.on_detected(&wrong).unwrap();
        assert_eq!(third.outcome, Outcome::RetriesExhausted { attempts: 3 });
        assert!(third.reset.is_none());

        assert!(matches!(
            flow.on_detected(&pattern(&[0, 1, 2, 5, 8])),
            Err(SigilError::ChallengeClosed)
        ));
    }

    #[test]
    fn test_success_on_second_try_reports_two_attempts() {
        let mut flow = compare_flow(3);
        flow.on_detected(&pattern(&[6, 7, 8, 5])).unwrap();
        let step = flow.on_detected(&pattern(&[0, 1, 2, 5, 8])).unwrap();
        assert_eq!(
            step.outcome,
            Outcome::Success {
                secret: None,
                attempts: 2
            }
        );
        assert_eq!(step.display_mode, DisplayMode::Correct);
    }

    #[test]
    fn test_compare_against_stored_secret() {
        let stored = codec::encode(&pattern(&[4, 0, 8]), None).unwrap();
        let store = MemoryStore::with_secret(stored);
        let mut flow =
            CompareFlow::new(Codec::default(), SecretSource::Store, Some(&store), 5).unwrap();
        assert!(flow.on_detected(&pattern(&[4, 0, 8])).unwrap().outcome.is_success());
    }

    #[test]
    fn test_missing_secret_is_a_configuration_error() {
        let empty = MemoryStore::new();
        let err = CompareFlow::new(Codec::default(), SecretSource::Store, Some(&empty), 5)
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(CompareFlow::new(Codec::default(), SecretSource::Store, None, 5).is_err());
    }

    #[test]
    fn test_transform_failure_is_distinct_from_mismatch() {
        let broken = |_: &[u8]| -> std::result::Result<Vec<u8>, TransformError> {
            Err(TransformError("hsm offline".to_string()))
        };
        let mut flow = CompareFlow::new(
            Codec::new(Some(Arc::new(broken))),
            SecretSource::Secret(EncodedSecret::new(b"x".to_vec())),
            None,
            5,
        )
        .unwrap();
        let err = flow.on_detected(&pattern(&[0, 1, 2, 3])).unwrap_err();
        assert_eq!(err, SigilError::Transform("hsm offline".to_string()));
        assert_eq!(flow.retries().count(), 0);
        assert!(flow.retries().is_closed());
    }

    #[test]
    fn test_captcha_mismatch_replays_expected_pattern() {
        let challenge = CaptchaChallenge {
            pattern: pattern(&[0, 1, 4, 3]),
            wired_dots: 4,
        };
        let mut flow = CaptchaFlow::new(challenge.clone(), 2);

        let step = flow.on_detected(&pattern(&[0, 1, 4, 5])).unwrap();
        assert_eq!(step.outcome, Outcome::Mismatch { attempts: 1 });
        assert_eq!(step.reset, Some(ResetAction::Replay(challenge.pattern.clone())));

        let last = flow.on_detected(&pattern(&[3, 4, 1, 0])).unwrap();
        assert_eq!(last.outcome, Outcome::RetriesExhausted { attempts: 2 });
    }

    #[test]
    fn test_captcha_compares_raw_sequence() {
        let challenge = CaptchaChallenge {
            pattern: pattern(&[2, 1]),
            wired_dots: 2,
        };
        let mut flow = CaptchaFlow::new(challenge, 5);
        let step = flow.on_detected(&pattern(&[2, 1])).unwrap();
        assert_eq!(
            step.outcome,
            Outcome::Success {
                secret: None,
                attempts: 1
            }
        );
    }
}
