//! ABR Policy - quality selection layered over the client's own estimator
//!
//! The streaming client measures bandwidth and switches levels by itself.
//! This policy decides only what the application adds on top:
//! - the starting mode (automatic, or a deferred pin to `start_level`)
//! - manual overrides from the quality menu
//! - the forced refresh nudge (lowest level, then back to automatic)
//! - which recovery to attempt for a fatal client error
//!
//! The policy never talks to the client; it returns [`LevelCommand`]s and
//! [`Recovery`] actions for the player to apply.

use crate::{
    types::{ErrorCategory, QualityLevel, AUTO_LABEL, AUTO_LEVEL},
    Error, Result,
};
use tracing::debug;

/// Who chooses the level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityMode {
    /// The client's estimator picks
    Auto,
    /// Pinned to the level with this library index
    Manual(usize),
}

/// Level change the player applies to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelCommand {
    /// Hand selection back to the client (`level = -1`)
    Auto,
    /// Switch immediately to this level (next and current)
    Pin(usize),
}

impl LevelCommand {
    /// Level index in the client's convention
    pub fn client_level(&self) -> i32 {
        match self {
            LevelCommand::Auto => AUTO_LEVEL,
            LevelCommand::Pin(index) => i32::try_from(*index).unwrap_or(AUTO_LEVEL),
        }
    }
}

/// Response to a fatal client error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Restart segment loading
    ResumeLoad,
    /// Ask the client to recover its media pipeline
    RecoverMedia,
    /// Destroy the client; the mount is finished
    Destroy,
}

/// Quality decisions for one mount
#[derive(Debug, Clone)]
pub struct AbrPolicy {
    abr: bool,
    start_level: Option<usize>,
    pin_pending: bool,
    mode: QualityMode,
    levels: Vec<QualityLevel>,
    /// Bumped by every decision that invalidates a pending refresh revert
    refresh_generation: u64,
}

impl AbrPolicy {
    pub fn new(abr: bool, start_level: Option<usize>) -> Self {
        Self {
            abr,
            start_level,
            pin_pending: !abr && start_level.is_some(),
            mode: QualityMode::Auto,
            levels: Vec::new(),
            refresh_generation: 0,
        }
    }

    /// Start level handed to the client at creation
    pub fn initial_level(&self) -> i32 {
        match (self.abr, self.start_level) {
            (false, Some(level)) => i32::try_from(level).unwrap_or(AUTO_LEVEL),
            _ => AUTO_LEVEL,
        }
    }

    /// A manifest was parsed. Replaces the level set and applies a pin
    /// that was waiting for levels.
    pub fn on_levels(&mut self, levels: Vec<QualityLevel>) -> Option<LevelCommand> {
        self.levels = levels;

        let mut pin_dropped = false;
        if let QualityMode::Manual(index) = self.mode {
            if !self.has_level(index) {
                debug!(index, "Pinned level gone with new manifest, back to auto");
                self.mode = QualityMode::Auto;
                pin_dropped = true;
            }
        }

        if self.abr {
            self.mode = QualityMode::Auto;
            return Some(LevelCommand::Auto);
        }

        if !self.pin_pending {
            return pin_dropped.then_some(LevelCommand::Auto);
        }
        self.pin_pending = false;

        match self.start_level {
            Some(index) if self.has_level(index) => {
                self.mode = QualityMode::Manual(index);
                Some(LevelCommand::Pin(index))
            }
            Some(index) => {
                debug!(
                    index,
                    available = self.levels.len(),
                    "Start level out of range, staying automatic"
                );
                pin_dropped.then_some(LevelCommand::Auto)
            }
            None => pin_dropped.then_some(LevelCommand::Auto),
        }
    }

    /// Manual override from the quality menu; `-1` returns to automatic
    pub fn select(&mut self, index: i32) -> Result<LevelCommand> {
        self.pin_pending = false;
        self.refresh_generation += 1;

        if index == AUTO_LEVEL {
            self.mode = QualityMode::Auto;
            return Ok(LevelCommand::Auto);
        }

        let level = usize::try_from(index)
            .ok()
            .filter(|i| self.has_level(*i))
            .ok_or(Error::UnknownLevel {
                index,
                available: self.levels.len(),
            })?;
        self.mode = QualityMode::Manual(level);
        Ok(LevelCommand::Pin(level))
    }

    /// Begin a forced refresh. Returns the lowest level to command and the
    /// token that [`AbrPolicy::finish_refresh`] checks. Only meaningful in
    /// automatic mode; while pinned nothing happens.
    pub fn begin_refresh(&mut self) -> Option<(usize, u64)> {
        if self.mode != QualityMode::Auto {
            debug!(mode = ?self.mode, "Refresh ignored while pinned");
            return None;
        }
        let lowest = self
            .levels
            .iter()
            .min_by_key(|l| (l.height, l.bitrate_bps, l.index))?
            .index;
        self.refresh_generation += 1;
        Some((lowest, self.refresh_generation))
    }

    /// True if the refresh started with `token` should now revert to auto
    pub fn finish_refresh(&self, token: u64) -> bool {
        self.mode == QualityMode::Auto && self.refresh_generation == token
    }

    /// Recovery for a fatal error of `category`
    pub fn recovery_for(category: &ErrorCategory) -> Recovery {
        match category {
            ErrorCategory::Network => Recovery::ResumeLoad,
            ErrorCategory::Media => Recovery::RecoverMedia,
            ErrorCategory::Other(_) => Recovery::Destroy,
        }
    }

    /// Label for the quality selector
    pub fn label(&self) -> String {
        match self.mode {
            QualityMode::Auto => AUTO_LABEL.to_string(),
            QualityMode::Manual(index) => self
                .level(index)
                .map(QualityLevel::display_name)
                .unwrap_or_else(|| format!("Level {index}")),
        }
    }

    pub fn mode(&self) -> QualityMode {
        self.mode
    }

    pub fn is_auto(&self) -> bool {
        self.mode == QualityMode::Auto
    }

    pub fn levels(&self) -> &[QualityLevel] {
        &self.levels
    }

    /// Level by library index
    pub fn level(&self, index: usize) -> Option<&QualityLevel> {
        self.levels.iter().find(|l| l.index == index)
    }

    fn has_level(&self, index: usize) -> bool {
        self.level(index).is_some()
    }
}
