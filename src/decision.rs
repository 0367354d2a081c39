use serde_json::{Map, Value};

use crate::status::{PregnancyStatus, VaginalState, WetnessLevel};
use crate::utils::{normalize_scene_field, strip_key_whitespace};

// Canonical planner output keys (the wire format is Chinese-labelled JSON).
pub const KEY_LOCATION_CHANGED: &str = "地点变化";
pub const KEY_NEW_LOCATION: &str = "新地点";
pub const KEY_CLOTHING_CHANGED: &str = "着装变化";
pub const KEY_NEW_CLOTHING: &str = "新着装";
pub const KEY_STATUS_UPDATES: &str = "角色状态更新";
pub const KEY_SUGGEST_IMAGE: &str = "建议配图";
pub const KEY_IMAGE_PROMPT: &str = "nai_prompt";
pub const KEY_LOCATION: &str = "地点";
pub const KEY_CLOTHING: &str = "着装";
pub const KEY_SCENE: &str = "场景";

// Alternate spellings the planner occasionally uses for the update map.
const STATUS_UPDATE_ALIASES: [&str; 2] = ["角色状态", "状态更新"];

/// One turn's planner verdict after normalization. `raw_updates` holds the
/// untrusted status-update map; the validator turns it into `updates`.
#[derive(Debug, Clone, Default)]
pub struct StateDecision {
    pub location_changed: bool,
    pub new_location: String,
    pub clothing_changed: bool,
    pub new_clothing: String,
    pub suggest_image: Option<bool>,
    pub image_prompt: String,
    pub raw_updates: Map<String, Value>,
    pub updates: StatusUpdates,
}

impl StateDecision {
    /// Default decision: nothing changes. Used when the planner call fails
    /// or its output is unparseable.
    pub fn no_change() -> Self {
        StateDecision::default()
    }
}

/// Validated, bound-safe residue of a decision's status-update map. Numeric
/// fields carry deltas; everything else carries replacement values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdates {
    pub pleasure_delta: Option<i64>,
    pub corruption_delta: Option<i64>,
    pub semen_delta: Option<i64>,
    pub anal_delta: Option<i64>,
    pub capacity_delta: Option<i64>,
    pub physiological_state: Option<String>,
    pub vaginal_state: Option<VaginalState>,
    pub vaginal_wetness: Option<WetnessLevel>,
    pub pregnancy_status: Option<PregnancyStatus>,
    pub pregnancy_source: Option<String>,
    pub pregnancy_counter: Option<i64>,
    pub semen_sources: Option<String>,
    pub vaginal_foreign: Option<String>,
    pub inventory: Option<String>,
    pub fetishes: Option<String>,
    pub permanent_mods: Option<String>,
    pub body_condition: Option<String>,
}

impl StatusUpdates {
    pub fn is_empty(&self) -> bool {
        *self == StatusUpdates::default()
    }

    /// Names of the populated fields, for logging.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        macro_rules! record {
            ($field:ident) => {
                if self.$field.is_some() {
                    names.push(stringify!($field));
                }
            };
        }
        record!(pleasure_delta);
        record!(corruption_delta);
        record!(semen_delta);
        record!(anal_delta);
        record!(capacity_delta);
        record!(physiological_state);
        record!(vaginal_state);
        record!(vaginal_wetness);
        record!(pregnancy_status);
        record!(pregnancy_source);
        record!(pregnancy_counter);
        record!(semen_sources);
        record!(vaginal_foreign);
        record!(inventory);
        record!(fetishes);
        record!(permanent_mods);
        record!(body_condition);
        names
    }
}

/// Cleans a raw planner JSON object into a canonical decision:
/// - keys are matched whitespace-insensitively,
/// - boolean-ish fields coerce string/number forms,
/// - prose values are trimmed, short token fields fully de-spaced,
/// - the status-update map is recognized under its aliases and always present.
///
/// Never fails: anything unrecognizable simply ends up as the default.
pub fn normalize_planner_decision(raw: &Value) -> StateDecision {
    let Some(object) = raw.as_object() else {
        return StateDecision::no_change();
    };

    let cleaned = clean_object(object);

    let mut decision = StateDecision {
        location_changed: cleaned.get(KEY_LOCATION_CHANGED).map(coerce_bool).unwrap_or(false),
        clothing_changed: cleaned.get(KEY_CLOTHING_CHANGED).map(coerce_bool).unwrap_or(false),
        new_location: cleaned
            .get(KEY_NEW_LOCATION)
            .and_then(Value::as_str)
            .map(normalize_scene_field)
            .unwrap_or_default(),
        new_clothing: cleaned
            .get(KEY_NEW_CLOTHING)
            .and_then(Value::as_str)
            .map(normalize_scene_field)
            .unwrap_or_default(),
        suggest_image: cleaned.get(KEY_SUGGEST_IMAGE).map(coerce_bool),
        image_prompt: cleaned
            .get(KEY_IMAGE_PROMPT)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
        ..StateDecision::default()
    };

    let updates_value = cleaned.get(KEY_STATUS_UPDATES).or_else(|| {
        STATUS_UPDATE_ALIASES
            .iter()
            .find_map(|alias| cleaned.get(*alias))
    });
    if let Some(Value::Object(map)) = updates_value {
        decision.raw_updates = map.clone();
    }

    decision
}

// Recursively cleans key whitespace; trims string values but preserves their
// internal whitespace (physiological prose must survive intact).
fn clean_object(object: &Map<String, Value>) -> Map<String, Value> {
    let mut cleaned = Map::new();
    for (key, value) in object {
        cleaned.insert(strip_key_whitespace(key), clean_value(value));
    }
    cleaned
}

fn clean_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        Value::Object(map) => Value::Object(clean_object(map)),
        Value::Array(items) => Value::Array(items.iter().map(clean_value).collect()),
        other => other.clone(),
    }
}

/// Case-insensitive boolean coercion for fields the planner sometimes emits
/// as strings. Non-string truthy/falsy values pass through on their own terms.
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => {
            matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "是")
        }
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whitespace_in_keys_is_ignored() {
        let raw = json!({
            "地 点 变 化": "true",
            "新地点": " 卧 室 ",
            "角色状态更新": { "pleasure_value": 10 }
        });
        let decision = normalize_planner_decision(&raw);
        assert!(decision.location_changed);
        assert_eq!(decision.new_location, "卧室");
        assert!(!decision.clothing_changed);
        assert_eq!(decision.new_clothing, "");
        assert_eq!(decision.raw_updates["pleasure_value"], 10);
    }

    #[test]
    fn bool_coercion_accepts_known_spellings() {
        for truthy in ["true", "TRUE", "1", "yes", "是"] {
            assert!(coerce_bool(&json!(truthy)), "{truthy} should be true");
        }
        for falsy in ["false", "0", "no", "否", "whatever"] {
            assert!(!coerce_bool(&json!(falsy)), "{falsy} should be false");
        }
        assert!(coerce_bool(&json!(true)));
        assert!(coerce_bool(&json!(1)));
        assert!(!coerce_bool(&json!(0)));
        assert!(!coerce_bool(&json!(null)));
    }

    #[test]
    fn status_update_aliases_are_canonicalized() {
        let raw = json!({ "角色状态": { "corruption_level": 5 } });
        let decision = normalize_planner_decision(&raw);
        assert_eq!(decision.raw_updates["corruption_level"], 5);

        let raw = json!({ "状态更新": { "semen_volume": 50 } });
        let decision = normalize_planner_decision(&raw);
        assert_eq!(decision.raw_updates["semen_volume"], 50);
    }

    #[test]
    fn malformed_updates_become_empty_map() {
        let raw = json!({ "角色状态更新": "not a map" });
        let decision = normalize_planner_decision(&raw);
        assert!(decision.raw_updates.is_empty());

        let decision = normalize_planner_decision(&json!("not an object"));
        assert!(decision.raw_updates.is_empty());
        assert!(!decision.location_changed);
    }

    #[test]
    fn nested_update_keys_are_cleaned_and_prose_preserved() {
        let raw = json!({
            "角色状态更新": { "physiological _state": "  呼吸急促 身体发热  " }
        });
        let decision = normalize_planner_decision(&raw);
        // Internal whitespace of the prose value survives; key spaces do not.
        assert_eq!(
            decision.raw_updates["physiological_state"],
            "呼吸急促 身体发热"
        );
    }

    #[test]
    fn suggest_image_is_tristate() {
        let decision = normalize_planner_decision(&json!({}));
        assert_eq!(decision.suggest_image, None);

        let decision = normalize_planner_decision(&json!({ "建议配图": "是" }));
        assert_eq!(decision.suggest_image, Some(true));
    }
}
