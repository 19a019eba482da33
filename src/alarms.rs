use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Severity of a single vital-sign reading against the configured thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AlarmLevel {
    Normal,
    Warning,
    Critical,
    /// No reading available for this vital yet.
    Unknown,
}

impl Default for AlarmLevel {
    fn default() -> Self {
        AlarmLevel::Unknown
    }
}

/// Clinical alarm boundaries for SpO2 and heart rate.
///
/// SpO2 uses two lower bounds: `value <= spo2_critical` is critical,
/// `spo2_critical < value < spo2_warning` is warning. Heart rate uses a band:
/// anything outside `[hr_critical_low, hr_critical_high]` is critical, the
/// margins inside that band up to the warning bounds are warnings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlarmThresholds {
    pub spo2_critical: f64,
    pub spo2_warning: f64,
    pub hr_critical_low: f64,
    pub hr_warning_low: f64,
    pub hr_warning_high: f64,
    pub hr_critical_high: f64,
}

impl Default for AlarmThresholds {
    fn default() -> Self {
        Self {
            spo2_critical: 88.0,
            spo2_warning: 92.0,
            hr_critical_low: 40.0,
            hr_warning_low: 50.0,
            hr_warning_high: 120.0,
            hr_critical_high: 140.0,
        }
    }
}

impl AlarmThresholds {
    /// Reject malformed boundary sets at configuration time so evaluation
    /// never has to second-guess ordering.
    pub fn validate(&self) -> Result<()> {
        if !(self.spo2_critical < self.spo2_warning) {
            bail!(
                "spo2 thresholds must satisfy critical < warning (got {} >= {})",
                self.spo2_critical,
                self.spo2_warning
            );
        }

        let hr = [
            self.hr_critical_low,
            self.hr_warning_low,
            self.hr_warning_high,
            self.hr_critical_high,
        ];
        if !hr.windows(2).all(|pair| pair[0] < pair[1]) {
            bail!(
                "heart-rate thresholds must be strictly ordered: criticalLow < warningLow < warningHigh < criticalHigh (got {:?})",
                hr
            );
        }

        Ok(())
    }

    pub fn classify_spo2(&self, value: f64) -> AlarmLevel {
        if value <= self.spo2_critical {
            AlarmLevel::Critical
        } else if value < self.spo2_warning {
            AlarmLevel::Warning
        } else {
            AlarmLevel::Normal
        }
    }

    pub fn classify_heart_rate(&self, value: f64) -> AlarmLevel {
        if value < self.hr_critical_low || value > self.hr_critical_high {
            AlarmLevel::Critical
        } else if value < self.hr_warning_low || value > self.hr_warning_high {
            AlarmLevel::Warning
        } else {
            AlarmLevel::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> AlarmThresholds {
        AlarmThresholds {
            spo2_critical: 88.0,
            spo2_warning: 92.0,
            hr_critical_low: 40.0,
            hr_warning_low: 50.0,
            hr_warning_high: 120.0,
            hr_critical_high: 140.0,
        }
    }

    #[test]
    fn spo2_classification_covers_all_bands() {
        let t = thresholds();
        assert_eq!(t.classify_spo2(87.0), AlarmLevel::Critical);
        assert_eq!(t.classify_spo2(90.0), AlarmLevel::Warning);
        assert_eq!(t.classify_spo2(95.0), AlarmLevel::Normal);
    }

    #[test]
    fn spo2_boundaries_are_inclusive_on_the_documented_side() {
        let t = thresholds();
        // Exactly at critical is critical, exactly at warning is normal.
        assert_eq!(t.classify_spo2(88.0), AlarmLevel::Critical);
        assert_eq!(t.classify_spo2(92.0), AlarmLevel::Normal);
        assert_eq!(t.classify_spo2(91.9), AlarmLevel::Warning);
    }

    #[test]
    fn heart_rate_band_classification() {
        let t = thresholds();
        assert_eq!(t.classify_heart_rate(39.0), AlarmLevel::Critical);
        assert_eq!(t.classify_heart_rate(40.0), AlarmLevel::Warning);
        assert_eq!(t.classify_heart_rate(45.0), AlarmLevel::Warning);
        assert_eq!(t.classify_heart_rate(50.0), AlarmLevel::Normal);
        assert_eq!(t.classify_heart_rate(100.0), AlarmLevel::Normal);
        assert_eq!(t.classify_heart_rate(120.0), AlarmLevel::Normal);
        assert_eq!(t.classify_heart_rate(121.0), AlarmLevel::Warning);
        assert_eq!(t.classify_heart_rate(140.0), AlarmLevel::Warning);
        assert_eq!(t.classify_heart_rate(141.0), AlarmLevel::Critical);
    }

    #[test]
    fn classification_is_deterministic() {
        let t = thresholds();
        for _ in 0..3 {
            assert_eq!(t.classify_spo2(90.0), AlarmLevel::Warning);
            assert_eq!(t.classify_heart_rate(141.0), AlarmLevel::Critical);
        }
    }

    #[test]
    fn validate_rejects_unordered_boundaries() {
        let mut t = thresholds();
        t.spo2_warning = 88.0;
        assert!(t.validate().is_err());

        let mut t = thresholds();
        t.hr_warning_low = 40.0;
        assert!(t.validate().is_err());

        let mut t = thresholds();
        t.hr_critical_high = 120.0;
        assert!(t.validate().is_err());

        assert!(thresholds().validate().is_ok());
    }
}
