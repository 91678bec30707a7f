//! Tunable configuration with documented ranges

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Reconciliation engine tunables
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Amount slack, in cents, for reference-based candidates (0..=10000)
    pub amount_tolerance_cents: i64,
    /// Amount/day candidates require timestamps closer than this (1..=168)
    pub time_window_hours: i64,
    /// Aggregates strictly below this score are surfaced for review (10..=100)
    pub confidence_threshold: i64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            amount_tolerance_cents: 50,
            time_window_hours: 48,
            confidence_threshold: 75,
        }
    }
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0..=10_000).contains(&self.amount_tolerance_cents) {
            return Err(Error::Config(format!(
                "amount_tolerance_cents must be 0..=10000, got {}",
                self.amount_tolerance_cents
            )));
        }
        if !(1..=168).contains(&self.time_window_hours) {
            return Err(Error::Config(format!(
                "time_window_hours must be 1..=168, got {}",
                self.time_window_hours
            )));
        }
        if !(10..=100).contains(&self.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidence_threshold must be 10..=100, got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }

    pub fn time_window_millis(&self) -> i64 {
        self.time_window_hours * 3_600_000
    }
}

/// Periodic SMS scan cadence
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Minutes between scans, minimum 15
    pub scan_interval_minutes: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_interval_minutes: 15,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_minutes < 15 {
            return Err(Error::Config(format!(
                "scan_interval_minutes must be at least 15, got {}",
                self.scan_interval_minutes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(ReconcilerConfig::default().validate().is_ok());
        assert!(ScanConfig::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_rejected() {
        let mut cfg = ReconcilerConfig::default();
        cfg.amount_tolerance_cents = 10_001;
        assert!(cfg.validate().is_err());

        let mut cfg = ReconcilerConfig::default();
        cfg.time_window_hours = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ReconcilerConfig::default();
        cfg.confidence_threshold = 9;
        assert!(cfg.validate().is_err());

        let scan = ScanConfig {
            scan_interval_minutes: 10,
        };
        assert!(scan.validate().is_err());
    }
}
