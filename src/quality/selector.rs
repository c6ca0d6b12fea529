//! Debounced adaptive quality selection
//!
//! [`QualitySelector`] is synchronous; owners that share it across tasks put
//! it behind a lock.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{default_profiles, AdjustmentReason, QualityAdjustment, QualityLevel, QualityProfile};
use crate::clock::Clock;
use crate::config::AdapterConfig;
use crate::error::{Error, Result};

/// Selector configuration
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Whether `select_quality` may change the level at all
    pub adaptive: bool,

    /// Minimum time between two changes
    pub min_switch_interval: Duration,

    /// Retained history entries
    pub max_history: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self::from(&AdapterConfig::default())
    }
}

impl From<&AdapterConfig> for SelectorConfig {
    fn from(config: &AdapterConfig) -> Self {
        Self {
            adaptive: true,
            min_switch_interval: config.quality_debounce(),
            max_history: config.quality_history_size.max(1),
        }
    }
}

/// Chooses the quality level for current network conditions
pub struct QualitySelector {
    config: SelectorConfig,
    clock: Arc<dyn Clock>,
    profiles: BTreeMap<QualityLevel, QualityProfile>,
    current: QualityLevel,
    history: VecDeque<QualityAdjustment>,
    last_change: Option<DateTime<Utc>>,
}

impl QualitySelector {
    /// Create a selector over the default catalog, starting at `auto`
    pub fn new(config: SelectorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            profiles: default_profiles(),
            current: QualityLevel::Auto,
            history: VecDeque::new(),
            last_change: None,
        }
    }

    pub fn current_level(&self) -> QualityLevel {
        self.current
    }

    pub fn current_profile(&self) -> Option<&QualityProfile> {
        self.profiles.get(&self.current)
    }

    pub fn profile(&self, level: QualityLevel) -> Option<&QualityProfile> {
        self.profiles.get(&level)
    }

    pub fn profiles(&self) -> &BTreeMap<QualityLevel, QualityProfile> {
        &self.profiles
    }

    /// Adjustments, oldest first
    pub fn history(&self) -> Vec<QualityAdjustment> {
        self.history.iter().cloned().collect()
    }

    pub fn is_adaptive(&self) -> bool {
        self.config.adaptive
    }

    pub fn set_adaptive(&mut self, adaptive: bool) {
        self.config.adaptive = adaptive;
    }

    /// Pick the best level for the given conditions
    ///
    /// Returns the unchanged level when adaptation is off or the last change
    /// is more recent than the minimum switch interval.
    pub fn select_quality(&mut self, latency_ms: f64, bandwidth_mbps: f64) -> QualityLevel {
        if !self.config.adaptive || self.in_debounce_window() {
            return self.current;
        }

        let target = match self.best_candidate(latency_ms, bandwidth_mbps) {
            Some(level) => level,
            None => return self.current,
        };

        if target != self.current {
            let reason = self.adjustment_reason(target, latency_ms, bandwidth_mbps);
            self.apply(target, reason);
        }

        self.current
    }

    /// Manually switch to `level`
    pub fn set_profile(&mut self, level: QualityLevel) -> Result<QualityLevel> {
        if !self.profiles.contains_key(&level) {
            return Err(Error::UnknownQualityLevel(level.to_string()));
        }

        if level != self.current {
            self.apply(level, AdjustmentReason::ManualOverride);
        }
        Ok(self.current)
    }

    /// Insert or replace a catalog entry
    pub fn add_profile(&mut self, level: QualityLevel, profile: QualityProfile) {
        self.profiles.insert(level, profile);
    }

    /// Remove a catalog entry; the active level cannot be removed
    pub fn remove_profile(&mut self, level: QualityLevel) -> Result<QualityProfile> {
        if level == self.current {
            return Err(Error::ActiveProfileRemoval(level));
        }
        self.profiles
            .remove(&level)
            .ok_or_else(|| Error::UnknownQualityLevel(level.to_string()))
    }

    /// Whether `level` exists and the conditions satisfy it
    pub fn can_switch_to_profile(&self, level: QualityLevel, latency_ms: f64, bandwidth_mbps: f64) -> bool {
        self.profiles
            .get(&level)
            .is_some_and(|p| p.is_satisfied_by(latency_ms, bandwidth_mbps))
    }

    /// Whether the last change is too recent for another one
    pub fn in_debounce_window(&self) -> bool {
        let Some(last) = self.last_change else {
            return false;
        };
        let elapsed = self.clock.now().signed_duration_since(last);
        elapsed
            .to_std()
            .map_or(true, |elapsed| elapsed < self.config.min_switch_interval)
    }

    // First satisfied ladder level; otherwise low, or the lowest level left
    // in the catalog when low has been removed
    fn best_candidate(&self, latency_ms: f64, bandwidth_mbps: f64) -> Option<QualityLevel> {
        let available: Vec<QualityLevel> = QualityLevel::LADDER
            .into_iter()
            .filter(|level| self.profiles.contains_key(level))
            .collect();

        available
            .iter()
            .copied()
            .find(|level| self.can_switch_to_profile(*level, latency_ms, bandwidth_mbps))
            .or_else(|| {
                if available.contains(&QualityLevel::Low) {
                    Some(QualityLevel::Low)
                } else {
                    available.last().copied()
                }
            })
    }

    fn adjustment_reason(&self, target: QualityLevel, latency_ms: f64, bandwidth_mbps: f64) -> AdjustmentReason {
        match (self.current.rank(), target.rank()) {
            (Some(from), Some(to)) if to < from => match self.profiles.get(&self.current) {
                Some(previous) if bandwidth_mbps < previous.min_bandwidth_mbps => {
                    AdjustmentReason::InsufficientBandwidth
                }
                Some(previous) if previous.max_latency_ms.is_some_and(|max| latency_ms > max) => {
                    AdjustmentReason::HighLatency
                }
                _ => AdjustmentReason::PoorConditions,
            },
            (Some(from), Some(to)) if to > from => {
                if latency_ms < 30.0 && bandwidth_mbps >= 30.0 {
                    AdjustmentReason::ExcellentConditions
                } else {
                    AdjustmentReason::GoodConditions
                }
            }
            _ => AdjustmentReason::ConditionChange,
        }
    }

    fn apply(&mut self, to: QualityLevel, reason: AdjustmentReason) {
        let now = self.clock.now();
        let adjustment = QualityAdjustment {
            from: self.current,
            to,
            reason,
            timestamp: now,
        };

        tracing::info!(from = %adjustment.from, to = %to, reason = %reason, "Quality level changed");

        self.history.push_back(adjustment);
        while self.history.len() > self.config.max_history {
            self.history.pop_front();
        }

        self.current = to;
        self.last_change = Some(now);
    }
}
