//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sigil_common::constants::{
    DEFAULT_CAPTCHA_WIRED_DOTS, DEFAULT_GRID_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_MIN_WIRED_DOTS,
    DEFAULT_RESET_DELAY_MS,
};
use sigil_common::{Result, SigilError};

use crate::grid::Grid;

/// Tunables for pattern sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Grid width/height
    #[serde(default = "default_grid_size")]
    pub grid_size: u8,

    /// Minimum cells for a new secret pattern
    #[serde(default = "default_min_wired_dots")]
    pub min_wired_dots: usize,

    /// Wrong attempts before compare/captcha gives up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Length of generated captcha patterns
    #[serde(default = "default_captcha_wired_dots")]
    pub captcha_wired_dots: usize,

    /// Delay before a wrong pattern is cleared or replayed
    #[serde(default = "default_reset_delay_ms")]
    pub reset_delay_ms: u64,

    /// Save a newly created secret to the store on success
    #[serde(default = "default_auto_save")]
    pub auto_save: bool,

    /// Hide the drawn path (never applied to captcha challenges)
    #[serde(default)]
    pub stealth_mode: bool,
}

// Default value functions
fn default_grid_size() -> u8 { DEFAULT_GRID_SIZE }
fn default_min_wired_dots() -> usize { DEFAULT_MIN_WIRED_DOTS }
fn default_max_retries() -> u32 { DEFAULT_MAX_RETRIES }
fn default_captcha_wired_dots() -> usize { DEFAULT_CAPTCHA_WIRED_DOTS }
fn default_reset_delay_ms() -> u64 { DEFAULT_RESET_DELAY_MS }
fn default_auto_save() -> bool { true }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            min_wired_dots: default_min_wired_dots(),
            max_retries: default_max_retries(),
            captcha_wired_dots: default_captcha_wired_dots(),
            reset_delay_ms: default_reset_delay_ms(),
            auto_save: default_auto_save(),
            stealth_mode: false,
        }
    }
}

impl EngineConfig {
    /// Check ranges against the grid capacity
    pub fn validate(&self) -> Result<()> {
        let grid = self.grid()?;
        let capacity = grid.capacity();

        if !(1..=capacity).contains(&self.min_wired_dots) {
            return Err(SigilError::Config(format!(
                "min_wired_dots must be in 1..={}, got {}",
                capacity, self.min_wired_dots
            )));
        }
        if !(1..=capacity).contains(&self.captcha_wired_dots) {
            return Err(SigilError::Config(format!(
                "captcha_wired_dots must be in 1..={}, got {}",
                capacity, self.captcha_wired_dots
            )));
        }
        if self.max_retries == 0 {
            return Err(SigilError::Config("max_retries must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn grid(&self) -> Result<Grid> {
        Grid::new(self.grid_size)
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }
}
