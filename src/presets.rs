//! Built-in emotion presets: immutable reference data mapping a mood to a
//! canonical blink pattern. Selecting a preset copies its steps into a fresh
//! [`LoopPattern`], so later edits never touch the catalog.

use crate::error::MabatakiResult;
use crate::model::{LoopPattern, StepSpec};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresetCategory {
    Basic,
    Negative,
    HighEnergy,
}

#[derive(Clone, Copy, Debug)]
pub struct EmotionPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: PresetCategory,
    pub steps: &'static [StepSpec],
}

impl EmotionPreset {
    /// Value-copy of the canonical pattern with fresh step ids.
    pub fn pattern(&self) -> MabatakiResult<LoopPattern> {
        LoopPattern::from_specs(self.steps)
    }
}

pub const DEFAULT_PRESET_ID: &str = "heijo";

const fn step(
    blink_count: u32,
    blink_speed: f64,
    blink_interval: f64,
    pause_duration: f64,
    closed_hold: f64,
) -> StepSpec {
    StepSpec {
        blink_count,
        blink_speed,
        blink_interval,
        pause_duration,
        closed_hold,
    }
}

const PRESETS: &[EmotionPreset] = &[
    EmotionPreset {
        id: "heijo",
        name: "Neutral",
        description: "baseline state",
        category: PresetCategory::Basic,
        steps: &[step(1, 0.15, 0.2, 3.0, 0.0)],
    },
    EmotionPreset {
        id: "odayaka",
        name: "Calm",
        description: "relaxed",
        category: PresetCategory::Basic,
        steps: &[step(1, 0.2, 0.2, 2.8, 0.0), step(1, 0.25, 0.2, 4.0, 0.0)],
    },
    EmotionPreset {
        id: "gokigen",
        name: "Cheerful",
        description: "in a good mood",
        category: PresetCategory::Basic,
        steps: &[step(1, 0.15, 0.2, 2.5, 0.0), step(2, 0.12, 0.2, 3.0, 0.0)],
    },
    EmotionPreset {
        id: "shuchu",
        name: "Focused",
        description: "rare blinks",
        category: PresetCategory::Basic,
        steps: &[step(1, 0.15, 0.2, 8.0, 0.0)],
    },
    EmotionPreset {
        id: "kincho",
        name: "Nervous",
        description: "restless",
        category: PresetCategory::Negative,
        steps: &[step(2, 0.1, 0.2, 1.5, 0.0), step(1, 0.12, 0.2, 1.8, 0.0)],
    },
    EmotionPreset {
        id: "nemuke",
        name: "Sleepy",
        description: "drowsy",
        category: PresetCategory::Negative,
        steps: &[step(1, 0.6, 0.2, 4.0, 0.8), step(1, 0.65, 0.2, 6.0, 1.2)],
    },
    EmotionPreset {
        id: "kanashimi",
        name: "Sad",
        description: "feeling down",
        category: PresetCategory::Negative,
        steps: &[step(1, 0.25, 0.2, 3.5, 0.4), step(1, 0.3, 0.2, 5.0, 0.6)],
    },
    EmotionPreset {
        id: "fuan",
        name: "Anxious",
        description: "fidgety",
        category: PresetCategory::Negative,
        steps: &[
            step(1, 0.13, 0.2, 2.2, 0.0),
            step(2, 0.11, 0.15, 2.5, 0.0),
            step(1, 0.14, 0.2, 3.0, 0.0),
        ],
    },
    EmotionPreset {
        id: "odoroki",
        name: "Surprised",
        description: "startled",
        category: PresetCategory::HighEnergy,
        steps: &[
            step(3, 0.08, 0.15, 1.0, 0.0),
            step(1, 0.1, 0.2, 2.0, 0.0),
            step(2, 0.11, 0.18, 2.5, 0.0),
        ],
    },
    EmotionPreset {
        id: "kofun",
        name: "Excited",
        description: "high tension",
        category: PresetCategory::HighEnergy,
        steps: &[
            step(2, 0.1, 0.15, 1.8, 0.0),
            step(1, 0.12, 0.2, 2.0, 0.0),
            step(2, 0.11, 0.18, 1.5, 0.0),
        ],
    },
    EmotionPreset {
        id: "tere",
        name: "Bashful",
        description: "embarrassed",
        category: PresetCategory::HighEnergy,
        steps: &[
            step(2, 0.13, 0.25, 1.2, 0.25),
            step(1, 0.18, 0.2, 2.0, 0.3),
            step(3, 0.11, 0.2, 1.5, 0.2),
        ],
    },
    EmotionPreset {
        id: "taikutsu",
        name: "Bored",
        description: "listless",
        category: PresetCategory::HighEnergy,
        steps: &[step(1, 0.35, 0.2, 4.5, 0.5), step(1, 0.4, 0.2, 5.5, 0.7)],
    },
];

pub fn presets() -> &'static [EmotionPreset] {
    PRESETS
}

pub fn find_preset(id: &str) -> Option<&'static EmotionPreset> {
    PRESETS.iter().find(|preset| preset.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_twelve_unique_valid_entries() {
        assert_eq!(presets().len(), 12);
        for (i, preset) in presets().iter().enumerate() {
            assert!(
                presets()[..i].iter().all(|p| p.id != preset.id),
                "duplicate preset id '{}'",
                preset.id
            );
            preset.pattern().unwrap().validate().unwrap();
        }
    }

    #[test]
    fn default_preset_exists() {
        assert!(find_preset(DEFAULT_PRESET_ID).is_some());
    }

    #[test]
    fn selection_is_a_value_copy() {
        let preset = find_preset("odayaka").unwrap();
        let mut pattern = preset.pattern().unwrap();
        let id = pattern.steps()[0].id;
        pattern.step_mut(id).unwrap().pause_duration = 99.0;

        // The catalog entry is untouched and a re-selection starts clean.
        assert_eq!(preset.steps[0].pause_duration, 2.8);
        let fresh = preset.pattern().unwrap();
        assert_eq!(fresh.steps()[0].pause_duration, 2.8);
    }

    #[test]
    fn lookup_misses_return_none() {
        assert!(find_preset("no-such-mood").is_none());
    }
}
