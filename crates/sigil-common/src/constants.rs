//! Shared constants for Sigil components.

/// Default grid width/height (3x3 = 9 cells)
pub const DEFAULT_GRID_SIZE: u8 = 3;

/// Minimum number of cells a new secret pattern must connect
pub const DEFAULT_MIN_WIRED_DOTS: usize = 4;

/// Wrong attempts allowed before a challenge is closed
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Length of a generated captcha pattern
pub const DEFAULT_CAPTCHA_WIRED_DOTS: usize = 4;

/// Delay before a wrong pattern is cleared or re-shown (1 second)
pub const DEFAULT_RESET_DELAY_MS: u64 = 1000;

/// Fraction of a cell's size, around its centre, that registers a hit
pub const DEFAULT_HIT_RATIO: f32 = 0.6;

/// Length of a rendered SHA-1 digest
pub const DIGEST_HEX_LEN: usize = 40;

/// SHA-1 of the empty byte sequence, i.e. the digest of an empty pattern
pub const EMPTY_PATTERN_DIGEST: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default sigild HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8890";

/// Idle sessions are dropped after this long (5 minutes)
pub const SESSION_TTL_SECS: u64 = 300;

/// Redis key prefixes
pub mod redis_keys {
    /// Encoded secret: sigil:secret:{name}
    pub const SECRET_PREFIX: &str = "sigil:secret:";
}
