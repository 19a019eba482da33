use serde::{Deserialize, Serialize};

/// Direction of change between two consecutive readings of the same vital.
/// Comparison is on raw sample values, not smoothed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Trend {
    Up,
    Down,
    Stable,
    Unknown,
}

impl Default for Trend {
    fn default() -> Self {
        Trend::Unknown
    }
}

impl Trend {
    pub fn between(previous: Option<f64>, current: f64) -> Trend {
        match previous {
            None => Trend::Unknown,
            Some(prev) if current > prev => Trend::Up,
            Some(prev) if current < prev => Trend::Down,
            Some(_) => Trend::Stable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reading_has_no_trend() {
        assert_eq!(Trend::between(None, 97.0), Trend::Unknown);
    }

    #[test]
    fn direction_follows_raw_comparison() {
        assert_eq!(Trend::between(Some(95.0), 97.0), Trend::Up);
        assert_eq!(Trend::between(Some(97.0), 95.0), Trend::Down);
        assert_eq!(Trend::between(Some(96.0), 96.0), Trend::Stable);
    }
}
