//! Progression configuration.
//!
//! The level curve and default XP amounts are tunable data, not
//! business logic: they load from JSON and never touch the state
//! machines when they change.

use serde::{Deserialize, Serialize};

/// Monotonic step function from total XP to level.
///
/// `thresholds[L]` is the XP required to hold level `L`; the level for
/// a total is the largest index whose threshold is within it. Loading
/// a table that does not start at 0 or is not strictly ascending fails
/// deserialization; `level()` relies on that ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawLevelCurve")]
pub struct LevelCurve {
    /// XP required per level, strictly ascending, starting at 0 for
    /// level 0.
    pub thresholds: Vec<u64>,
}

#[derive(Deserialize)]
struct RawLevelCurve {
    thresholds: Vec<u64>,
}

impl TryFrom<RawLevelCurve> for LevelCurve {
    type Error = String;

    fn try_from(raw: RawLevelCurve) -> Result<Self, Self::Error> {
        if raw.thresholds.first() != Some(&0) {
            return Err("level curve must start at 0 XP for level 0".to_string());
        }
        if !raw.thresholds.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err("level curve thresholds must be strictly ascending".to_string());
        }
        Ok(Self {
            thresholds: raw.thresholds,
        })
    }
}

impl Default for LevelCurve {
    fn default() -> Self {
        // Level L requires L * 1000 XP, up to level 10.
        Self {
            thresholds: (0..=10).map(|level| level * 1000).collect(),
        }
    }
}

impl LevelCurve {
    /// The level held at `total_xp`.
    pub fn level(&self, total_xp: u64) -> u32 {
        self.thresholds
            .iter()
            .take_while(|threshold| **threshold <= total_xp)
            .count()
            .saturating_sub(1) as u32
    }

    /// XP still needed for the next level, `None` at the top of the
    /// table.
    pub fn xp_to_next_level(&self, total_xp: u64) -> Option<u64> {
        let next = self.level(total_xp) as usize + 1;
        self.thresholds
            .get(next)
            .map(|threshold| threshold.saturating_sub(total_xp))
    }
}

/// Tunable progression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionConfig {
    /// The level threshold table
    pub curve: LevelCurve,

    /// XP for a graded milestone whose plan sets no explicit points
    pub default_milestone_xp: u64,

    /// XP for a completed task
    pub task_xp: u64,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            curve: LevelCurve::default(),
            default_milestone_xp: 250,
            task_xp: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_a_step_function_of_xp() {
        let curve = LevelCurve::default();
        assert_eq!(curve.level(0), 0);
        assert_eq!(curve.level(999), 0);
        assert_eq!(curve.level(1000), 1);
        assert_eq!(curve.level(1001), 1);
        assert_eq!(curve.level(10_000), 10);
        // Beyond the table the level stays at the top.
        assert_eq!(curve.level(1_000_000), 10);
    }

    #[test]
    fn xp_to_next_level_counts_down() {
        let curve = LevelCurve::default();
        assert_eq!(curve.xp_to_next_level(0), Some(1000));
        assert_eq!(curve.xp_to_next_level(400), Some(600));
        assert_eq!(curve.xp_to_next_level(1000), Some(1000));
        assert_eq!(curve.xp_to_next_level(10_000), None);
    }

    #[test]
    fn misordered_or_offset_curves_fail_to_load() {
        let err = serde_json::from_str::<LevelCurve>(r#"{"thresholds":[0,300,100]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("ascending"));

        let err = serde_json::from_str::<LevelCurve>(r#"{"thresholds":[100,200]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("start at 0"));

        let err =
            serde_json::from_str::<LevelCurve>(r#"{"thresholds":[]}"#).unwrap_err();
        assert!(err.to_string().contains("start at 0"));
    }

    #[test]
    fn custom_curve_round_trips_through_json() {
        let curve = LevelCurve {
            thresholds: vec![0, 100, 300, 700],
        };
        let json = serde_json::to_string(&curve).unwrap();
        let loaded: LevelCurve = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.level(300), 2);
        assert_eq!(loaded.level(699), 2);
        assert_eq!(loaded.level(700), 3);
    }
}
