use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum_macros::{Display, EnumString};

use crate::utils::safe_json_loads;

// Numeric field domains. Incoming planner values are deltas; these bound the
// per-turn delta and the post-merge value.
pub const PLEASURE_DELTA_MAX: i64 = 60;
pub const PLEASURE_DELTA_MIN: i64 = -100;
pub const DEFAULT_PLEASURE_THRESHOLD: i64 = 100;

pub const CORRUPTION_DELTA_MAX: i64 = 20;
pub const CORRUPTION_MAX: i64 = 100;

pub const SEMEN_DELTA_MAX: i64 = 150;
pub const SEMEN_DELTA_MIN: i64 = -500;
pub const SEMEN_MAX: i64 = 500;

pub const ANAL_DELTA_MAX: i64 = 20;
pub const ANAL_DELTA_MIN: i64 = -100;
pub const ANAL_MAX: i64 = 100;

pub const CAPACITY_DELTA_MAX: i64 = 40;
pub const CAPACITY_DELTA_MIN: i64 = -100;
pub const CAPACITY_MIN: i64 = 50;
pub const CAPACITY_MAX: i64 = 300;
pub const DEFAULT_CAPACITY: i64 = 100;

pub const PHYSIOLOGICAL_STATE_MAX_CHARS: usize = 100;

/// Ordered wetness scale. Ordinal comparisons use the declaration order.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
pub enum WetnessLevel {
    #[default]
    #[strum(serialize = "正常")]
    #[serde(rename = "正常")]
    Normal,
    #[strum(serialize = "微湿")]
    #[serde(rename = "微湿")]
    Damp,
    #[strum(serialize = "湿润")]
    #[serde(rename = "湿润")]
    Moist,
    #[strum(serialize = "淫湿")]
    #[serde(rename = "淫湿")]
    Soaked,
    #[strum(serialize = "爱液横流")]
    #[serde(rename = "爱液横流")]
    Dripping,
}

impl WetnessLevel {
    pub const ORDER: [WetnessLevel; 5] = [
        WetnessLevel::Normal,
        WetnessLevel::Damp,
        WetnessLevel::Moist,
        WetnessLevel::Soaked,
        WetnessLevel::Dripping,
    ];

    pub fn index(self) -> usize {
        Self::ORDER.iter().position(|l| *l == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> WetnessLevel {
        Self::ORDER[index.min(Self::ORDER.len() - 1)]
    }

    /// One ordinal level down; de-escalation never jumps more than one step.
    pub fn step_down(self) -> WetnessLevel {
        Self::from_index(self.index().saturating_sub(1))
    }
}

/// Unordered muscular-state set.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
pub enum VaginalState {
    #[default]
    #[strum(serialize = "放松")]
    #[serde(rename = "放松")]
    Relaxed,
    #[strum(serialize = "轻微收缩")]
    #[serde(rename = "轻微收缩")]
    SlightContraction,
    #[strum(serialize = "无意识收缩")]
    #[serde(rename = "无意识收缩")]
    InvoluntaryContraction,
    #[strum(serialize = "紧绷")]
    #[serde(rename = "紧绷")]
    Tense,
    #[strum(serialize = "痉挛")]
    #[serde(rename = "痉挛")]
    Spasming,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
pub enum PregnancyStatus {
    #[default]
    #[strum(serialize = "未受孕")]
    #[serde(rename = "未受孕")]
    NotPregnant,
    #[strum(serialize = "受孕中")]
    #[serde(rename = "受孕中")]
    Conceived,
}

/// Per-session character status record. Collection fields are stored as JSON
/// text (arrays for inventory/sources/foreign objects, objects for the rest)
/// and must always remain parseable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterStatus {
    pub body_condition: String,
    pub physiological_state: String,
    pub vaginal_state: VaginalState,
    pub vaginal_wetness: WetnessLevel,
    pub vaginal_capacity: i64,
    pub anal_development: i64,
    pub pregnancy_status: PregnancyStatus,
    pub pregnancy_source: Option<String>,
    pub pregnancy_counter: i64,
    pub semen_volume: i64,
    pub semen_sources: String,
    pub vaginal_foreign: String,
    pub pleasure_value: i64,
    pub pleasure_threshold: i64,
    pub corruption_level: i64,
    pub fetishes: String,
    pub permanent_mods: String,
    pub inventory: String,
}

impl Default for CharacterStatus {
    fn default() -> Self {
        CharacterStatus {
            body_condition: "{}".to_string(),
            physiological_state: "呼吸平稳".to_string(),
            vaginal_state: VaginalState::Relaxed,
            vaginal_wetness: WetnessLevel::Normal,
            vaginal_capacity: DEFAULT_CAPACITY,
            anal_development: 0,
            pregnancy_status: PregnancyStatus::NotPregnant,
            pregnancy_source: None,
            pregnancy_counter: 0,
            semen_volume: 0,
            semen_sources: "[]".to_string(),
            vaginal_foreign: "[]".to_string(),
            pleasure_value: 0,
            pleasure_threshold: DEFAULT_PLEASURE_THRESHOLD,
            corruption_level: 0,
            fetishes: "{}".to_string(),
            permanent_mods: "{}".to_string(),
            inventory: "[]".to_string(),
        }
    }
}

impl CharacterStatus {
    /// Parses every JSON collection column at once, substituting the empty
    /// collection for missing or corrupt data.
    pub fn parsed_collections(&self) -> ParsedCollections {
        ParsedCollections {
            inventory: string_items(safe_json_loads(&self.inventory, json!([]))),
            vaginal_foreign: string_items(safe_json_loads(&self.vaginal_foreign, json!([]))),
            semen_sources: string_items(safe_json_loads(&self.semen_sources, json!([]))),
            permanent_mods: safe_json_loads(&self.permanent_mods, json!({})),
            body_condition: safe_json_loads(&self.body_condition, json!({})),
            fetishes: safe_json_loads(&self.fetishes, json!({})),
        }
    }
}

fn string_items(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone)]
pub struct ParsedCollections {
    pub inventory: Vec<String>,
    pub vaginal_foreign: Vec<String>,
    pub semen_sources: Vec<String>,
    pub permanent_mods: Value,
    pub body_condition: Value,
    pub fetishes: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wetness_levels_are_ordered() {
        assert!(WetnessLevel::Normal < WetnessLevel::Damp);
        assert!(WetnessLevel::Soaked < WetnessLevel::Dripping);
        assert_eq!(WetnessLevel::Moist.index(), 2);
        assert_eq!(WetnessLevel::Moist.step_down(), WetnessLevel::Damp);
        assert_eq!(WetnessLevel::Normal.step_down(), WetnessLevel::Normal);
    }

    #[test]
    fn enums_parse_from_chinese_labels() {
        assert_eq!("湿润".parse::<WetnessLevel>().unwrap(), WetnessLevel::Moist);
        assert_eq!("痉挛".parse::<VaginalState>().unwrap(), VaginalState::Spasming);
        assert_eq!(
            "受孕中".parse::<PregnancyStatus>().unwrap(),
            PregnancyStatus::Conceived
        );
        assert!("不存在的等级".parse::<WetnessLevel>().is_err());
        assert_eq!(WetnessLevel::Dripping.to_string(), "爱液横流");
    }

    #[test]
    fn default_status_collections_parse() {
        let status = CharacterStatus::default();
        let parsed = status.parsed_collections();
        assert!(parsed.inventory.is_empty());
        assert!(parsed.fetishes.as_object().unwrap().is_empty());
    }

    #[test]
    fn corrupt_collection_text_degrades_to_empty() {
        let status = CharacterStatus {
            inventory: "not json".to_string(),
            ..CharacterStatus::default()
        };
        assert!(status.parsed_collections().inventory.is_empty());
    }
}
