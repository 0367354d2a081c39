use chrono::Local;
use serde_json::Value;

use crate::decision::{StateDecision, StatusUpdates};
use crate::error::StoreError;
use crate::scene_type::SceneType;
use crate::status::{
    ANAL_DELTA_MAX, ANAL_DELTA_MIN, ANAL_MAX, CAPACITY_DELTA_MAX, CAPACITY_DELTA_MIN,
    CAPACITY_MAX, CAPACITY_MIN, CORRUPTION_DELTA_MAX, CORRUPTION_MAX, CharacterStatus,
    PHYSIOLOGICAL_STATE_MAX_CHARS, PLEASURE_DELTA_MAX, PLEASURE_DELTA_MIN, SEMEN_DELTA_MAX,
    SEMEN_DELTA_MIN, SEMEN_MAX, WetnessLevel,
};
use crate::store::{SceneState, SceneStore};
use crate::utils::parse_datetime;

// Idle decay: pleasure bleeds off after this many minutes of silence.
pub const TIME_DECAY_THRESHOLD_MINUTES: i64 = 30;
pub const TIME_DECAY_AMOUNT: i64 = 20;

// Pleasure thresholds and the wetness floor each one mandates.
const PLEASURE_WETNESS_RULES: [(i64, WetnessLevel); 4] = [
    (30, WetnessLevel::Damp),
    (50, WetnessLevel::Moist),
    (70, WetnessLevel::Soaked),
    (90, WetnessLevel::Dripping),
];

const ORGASM_KEYWORDS: [&str; 4] = ["高潮", "余韵", "颤抖", "痉挛"];

const PHYSIO_CLIMAX: &str = "高潮后的余韵中颤抖";
const PHYSIO_HIGH: &str = "呼吸急促，身体剧烈颤抖";
const PHYSIO_MID: &str = "呼吸急促，身体微微发热";
const PHYSIO_LOW: &str = "呼吸略微急促";

/// Validates the raw planner update map against the current status, producing
/// the typed `updates`. Numeric deltas are clamped both per-turn and against
/// the post-merge bounds, enum values must parse, and unrecognized fields are
/// dropped with a warning. The raw map is left untouched for logging.
pub fn validate_state_decision(decision: &mut StateDecision, current: &CharacterStatus) {
    let mut updates = StatusUpdates::default();
    let mut climax_triggered = false;

    for (key, value) in &decision.raw_updates {
        match key.as_str() {
            "pleasure_value" => {
                if let Some(mut delta) = coerce_number(value) {
                    if delta > PLEASURE_DELTA_MAX {
                        log::warn!(
                            "[StateManager] Pleasure delta {} too large, clamping to {}",
                            delta,
                            PLEASURE_DELTA_MAX
                        );
                        delta = PLEASURE_DELTA_MAX;
                    } else if delta < PLEASURE_DELTA_MIN {
                        log::warn!(
                            "[StateManager] Pleasure delta {} too small, clamping to {}",
                            delta,
                            PLEASURE_DELTA_MIN
                        );
                        delta = PLEASURE_DELTA_MIN;
                    }

                    let threshold = current.pleasure_threshold.max(1);
                    let new_pleasure = current.pleasure_value + delta;
                    if new_pleasure >= threshold {
                        log::info!(
                            "[StateManager] Pleasure {}/{} reached threshold, climax reset",
                            new_pleasure,
                            threshold
                        );
                        delta = -current.pleasure_value + threshold / 4;
                        climax_triggered = true;
                    }
                    updates.pleasure_delta = Some(delta);
                }
            }
            "corruption_level" => {
                if let Some(mut delta) = coerce_number(value) {
                    if delta > CORRUPTION_DELTA_MAX {
                        log::warn!(
                            "[StateManager] Corruption delta {} too large, clamping to {}",
                            delta,
                            CORRUPTION_DELTA_MAX
                        );
                        delta = CORRUPTION_DELTA_MAX;
                    } else if delta < 0 {
                        delta = 0;
                    }
                    if current.corruption_level + delta > CORRUPTION_MAX {
                        delta = (CORRUPTION_MAX - current.corruption_level).max(0);
                    }
                    if delta > 0 {
                        updates.corruption_delta = Some(delta);
                    }
                }
            }
            "semen_volume" => {
                if let Some(mut delta) = coerce_number(value) {
                    if delta > SEMEN_DELTA_MAX {
                        log::warn!(
                            "[StateManager] Semen delta {}ml too large, clamping to {}ml",
                            delta,
                            SEMEN_DELTA_MAX
                        );
                        delta = SEMEN_DELTA_MAX;
                    } else if delta < SEMEN_DELTA_MIN {
                        delta = SEMEN_DELTA_MIN;
                    }
                    let new_volume = current.semen_volume + delta;
                    if new_volume < 0 {
                        delta = -current.semen_volume;
                    } else if new_volume > SEMEN_MAX {
                        delta = (SEMEN_MAX - current.semen_volume).max(0);
                    }
                    updates.semen_delta = Some(delta);
                }
            }
            "anal_development" => {
                if let Some(mut delta) = coerce_number(value) {
                    delta = delta.clamp(ANAL_DELTA_MIN, ANAL_DELTA_MAX);
                    let new_development = current.anal_development + delta;
                    if new_development < 0 {
                        delta = -current.anal_development;
                    } else if new_development > ANAL_MAX {
                        delta = (ANAL_MAX - current.anal_development).max(0);
                    }
                    updates.anal_delta = Some(delta);
                }
            }
            "vaginal_capacity" => {
                if let Some(mut delta) = coerce_number(value) {
                    delta = delta.clamp(CAPACITY_DELTA_MIN, CAPACITY_DELTA_MAX);
                    let new_capacity = current.vaginal_capacity + delta;
                    if new_capacity < CAPACITY_MIN {
                        delta = (CAPACITY_MIN - current.vaginal_capacity).max(-current.vaginal_capacity);
                    } else if new_capacity > CAPACITY_MAX {
                        delta = delta.min(CAPACITY_MAX - current.vaginal_capacity);
                    }
                    updates.capacity_delta = Some(delta);
                }
            }
            "physiological_state" => {
                let text = coerce_text(value);
                // Hard cut on a char boundary, no ellipsis: this is stored
                // state, not display text.
                let clipped: String = text.chars().take(PHYSIOLOGICAL_STATE_MAX_CHARS).collect();
                updates.physiological_state = Some(clipped);
            }
            "vaginal_state" => {
                let text = coerce_text(value);
                match text.parse() {
                    Ok(state) => updates.vaginal_state = Some(state),
                    Err(_) => {
                        log::warn!("[StateManager] Invalid vaginal state '{}', dropped", text)
                    }
                }
            }
            "vaginal_wetness" => {
                let text = coerce_text(value);
                match text.parse::<WetnessLevel>() {
                    Ok(level) => {
                        let jump = level.index().abs_diff(current.vaginal_wetness.index());
                        if jump > 2 {
                            log::warn!(
                                "[StateManager] Wetness jump too large: {} -> {}",
                                current.vaginal_wetness,
                                level
                            );
                        }
                        updates.vaginal_wetness = Some(level);
                    }
                    Err(_) => {
                        log::warn!("[StateManager] Invalid wetness level '{}', dropped", text)
                    }
                }
            }
            "pregnancy_status" => {
                let text = coerce_text(value);
                if let Ok(status) = text.parse() {
                    if current.pregnancy_status != status {
                        log::info!(
                            "[StateManager] Pregnancy status change: {} -> {}",
                            current.pregnancy_status,
                            status
                        );
                    }
                    updates.pregnancy_status = Some(status);
                }
            }
            "pregnancy_source" => {
                updates.pregnancy_source = Some(coerce_text(value));
            }
            "pregnancy_counter" => {
                if let Some(counter) = coerce_number(value) {
                    // Day counter, never negative.
                    updates.pregnancy_counter = Some(counter.max(0));
                }
            }
            "semen_sources" => updates.semen_sources = coerce_json_list(value),
            "vaginal_foreign" => updates.vaginal_foreign = coerce_json_list(value),
            "inventory" => updates.inventory = coerce_json_list(value),
            "fetishes" => updates.fetishes = coerce_json_map(value),
            "body_condition" => updates.body_condition = coerce_json_map(value),
            "permanent_mods" => {
                if let Some(obj) = value.as_object() {
                    if !obj.is_empty() {
                        log::info!(
                            "[StateManager] Permanent modification update: {:?}",
                            obj.keys().collect::<Vec<_>>()
                        );
                    }
                }
                updates.permanent_mods = coerce_json_map(value);
            }
            other => {
                log::warn!("[StateManager] Unknown status field '{}', dropped", other);
            }
        }
    }

    // An explicit planner description outranks the climax auto-text.
    if climax_triggered && updates.physiological_state.is_none() {
        updates.physiological_state = Some(PHYSIO_CLIMAX.to_string());
    }

    if !updates.is_empty() {
        log::info!(
            "[StateManager] Status validation passed: {:?}",
            updates.field_names()
        );
    }
    decision.updates = updates;
}

/// Applies the scene-type pleasure policy. A planner-supplied delta is capped
/// to the scene's upper bound; a missing delta turns into the scene's flat
/// decay while any pleasure remains.
pub fn apply_scene_decay(
    decision: &mut StateDecision,
    scene_type: SceneType,
    current: &CharacterStatus,
) {
    if let Some(delta) = decision.updates.pleasure_delta {
        let (_, max_range) = scene_type.pleasure_range();
        if delta > 0 && delta > max_range {
            log::warn!(
                "[StateManager] Pleasure delta {} exceeds {} scene range, capping to {}",
                delta,
                scene_type,
                max_range
            );
            decision.updates.pleasure_delta = Some(max_range);
        }
        return;
    }

    let decay = scene_type.decay_amount();
    if decay > 0 && current.pleasure_value > 0 {
        let actual = decay.min(current.pleasure_value);
        decision.updates.pleasure_delta = Some(-actual);
        log::debug!(
            "[StateManager] Scene decay ({}): pleasure -{}",
            scene_type,
            actual
        );
    }
}

/// Enforces cross-field consistency after validation and decay:
/// pleasure mandates a wetness floor, large pleasure drops de-escalate
/// wetness one step, and sustained arousal rewrites a stale physiological
/// description unless an orgasm state is already in play.
pub fn ensure_status_consistency(
    decision: &mut StateDecision,
    current: &CharacterStatus,
    scene_type: SceneType,
) {
    let updates = &mut decision.updates;

    let pleasure_delta = updates.pleasure_delta.unwrap_or(0);
    let final_pleasure = (current.pleasure_value + pleasure_delta).max(0);

    let final_wetness = updates.vaginal_wetness.unwrap_or(current.vaginal_wetness);
    let wetness_idx = final_wetness.index();

    // The highest satisfied threshold sets the floor.
    let mut wetness_adjusted = false;
    let floor = PLEASURE_WETNESS_RULES
        .iter()
        .rev()
        .find(|(threshold, _)| final_pleasure >= *threshold)
        .map(|(_, level)| *level);
    if let Some(min_wetness) = floor {
        if wetness_idx < min_wetness.index() {
            log::info!(
                "[StateManager] Consistency fix: pleasure {}, wetness raised to {}",
                final_pleasure,
                min_wetness
            );
            updates.vaginal_wetness = Some(min_wetness);
            wetness_adjusted = true;
        }
    }

    // A sharp drop lets wetness recede one step, never more.
    if !wetness_adjusted
        && pleasure_delta < -10
        && final_pleasure < 30
        && wetness_idx >= WetnessLevel::Moist.index()
    {
        let lowered = final_wetness.step_down();
        log::info!(
            "[StateManager] Consistency fix: pleasure dropping, wetness lowered to {}",
            lowered
        );
        updates.vaginal_wetness = Some(lowered);
    }

    let is_orgasm_state = ORGASM_KEYWORDS.iter().any(|keyword| {
        updates
            .physiological_state
            .as_deref()
            .is_some_and(|p| p.contains(keyword))
            || current.physiological_state.contains(keyword)
    });

    if updates.physiological_state.is_none()
        && scene_type != SceneType::Rest
        && !is_orgasm_state
    {
        let auto_physio = if final_pleasure >= 80 {
            Some(PHYSIO_HIGH)
        } else if final_pleasure >= 60 {
            Some(PHYSIO_MID)
        } else if final_pleasure >= 40 {
            Some(PHYSIO_LOW)
        } else {
            None
        };
        if let Some(text) = auto_physio {
            updates.physiological_state = Some(text.to_string());
        }
    }
}

/// Projects the validated updates onto a copy of the current status without
/// persisting anything. The narrator sees the state as it will be after the
/// turn commits.
pub fn apply_state_updates_preview(
    current: &CharacterStatus,
    decision: &StateDecision,
) -> CharacterStatus {
    let mut preview = current.clone();
    let updates = &decision.updates;

    if let Some(delta) = updates.pleasure_delta {
        preview.pleasure_value += delta;
    }
    if let Some(delta) = updates.corruption_delta {
        preview.corruption_level += delta;
    }
    if let Some(delta) = updates.semen_delta {
        preview.semen_volume += delta;
    }
    if let Some(delta) = updates.anal_delta {
        preview.anal_development += delta;
    }
    if let Some(delta) = updates.capacity_delta {
        preview.vaginal_capacity += delta;
    }
    if let Some(text) = &updates.physiological_state {
        preview.physiological_state = text.clone();
    }
    if let Some(state) = updates.vaginal_state {
        preview.vaginal_state = state;
    }
    if let Some(level) = updates.vaginal_wetness {
        preview.vaginal_wetness = level;
    }
    if let Some(status) = updates.pregnancy_status {
        preview.pregnancy_status = status;
    }
    if let Some(source) = &updates.pregnancy_source {
        preview.pregnancy_source = Some(source.clone());
    }
    if let Some(counter) = updates.pregnancy_counter {
        preview.pregnancy_counter = counter;
    }
    if let Some(text) = &updates.semen_sources {
        preview.semen_sources = text.clone();
    }
    if let Some(text) = &updates.vaginal_foreign {
        preview.vaginal_foreign = text.clone();
    }
    if let Some(text) = &updates.inventory {
        preview.inventory = text.clone();
    }
    if let Some(text) = &updates.fetishes {
        preview.fetishes = text.clone();
    }
    if let Some(text) = &updates.permanent_mods {
        preview.permanent_mods = text.clone();
    }
    if let Some(text) = &updates.body_condition {
        preview.body_condition = text.clone();
    }

    preview
}

/// Idle decay: when the previous turn is old enough, pleasure drops by up to
/// `TIME_DECAY_AMOUNT` and the new absolute value is committed immediately.
/// Returns whether a decay was applied (the caller must refetch the status).
pub async fn apply_time_decay(
    store: &SceneStore,
    session_id: &str,
    state: &SceneState,
    status: &CharacterStatus,
) -> Result<bool, StoreError> {
    let Some(last_update) = parse_datetime(&state.last_update_time) else {
        return Ok(false);
    };

    let elapsed_minutes = (Local::now().naive_local() - last_update).num_minutes();
    if elapsed_minutes <= TIME_DECAY_THRESHOLD_MINUTES || status.pleasure_value <= 0 {
        return Ok(false);
    }

    let decay = TIME_DECAY_AMOUNT.min(status.pleasure_value);
    let new_pleasure = (status.pleasure_value - decay).max(0);
    store.set_pleasure_value(session_id, new_pleasure).await?;
    log::info!(
        "[StateManager] Time decay: pleasure {} -> {}",
        status.pleasure_value,
        new_pleasure
    );
    Ok(true)
}

fn coerce_number(value: &Value) -> Option<i64> {
    value.as_f64().map(|f| f as i64)
}

fn coerce_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// List columns accept either a ready JSON-text string or an actual array.
fn coerce_json_list(value: &Value) -> Option<String> {
    match value {
        Value::Array(_) => Some(value.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn coerce_json_map(value: &Value) -> Option<String> {
    match value {
        Value::Object(_) => Some(value.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{PregnancyStatus, VaginalState};
    use serde_json::json;

    fn decision_with_updates(updates: serde_json::Value) -> StateDecision {
        let mut decision = StateDecision::no_change();
        decision.raw_updates = updates.as_object().expect("test map").clone();
        decision
    }

    #[test]
    fn pleasure_delta_is_clamped() {
        let mut decision = decision_with_updates(json!({ "pleasure_value": 90 }));
        let current = CharacterStatus::default();
        validate_state_decision(&mut decision, &current);
        assert_eq!(decision.updates.pleasure_delta, Some(60));

        let mut decision = decision_with_updates(json!({ "pleasure_value": -300 }));
        validate_state_decision(&mut decision, &current);
        assert_eq!(decision.updates.pleasure_delta, Some(-100));
    }

    #[test]
    fn climax_resets_pleasure_to_quarter_threshold() {
        let mut decision = decision_with_updates(json!({ "pleasure_value": 10 }));
        let current = CharacterStatus {
            pleasure_value: 95,
            ..CharacterStatus::default()
        };
        validate_state_decision(&mut decision, &current);
        // 95 + 10 crosses the threshold of 100, so the delta rewrites the
        // value down to threshold / 4 = 25.
        assert_eq!(decision.updates.pleasure_delta, Some(-70));
        assert_eq!(
            decision.updates.physiological_state.as_deref(),
            Some("高潮后的余韵中颤抖")
        );
    }

    #[test]
    fn corruption_only_accumulates() {
        let current = CharacterStatus {
            corruption_level: 95,
            ..CharacterStatus::default()
        };
        let mut decision = decision_with_updates(json!({ "corruption_level": 20 }));
        validate_state_decision(&mut decision, &current);
        assert_eq!(decision.updates.corruption_delta, Some(5));

        let mut decision = decision_with_updates(json!({ "corruption_level": -10 }));
        validate_state_decision(&mut decision, &current);
        assert_eq!(decision.updates.corruption_delta, None);
    }

    #[test]
    fn semen_volume_respects_absolute_bounds() {
        let current = CharacterStatus {
            semen_volume: 30,
            ..CharacterStatus::default()
        };
        let mut decision = decision_with_updates(json!({ "semen_volume": -200 }));
        validate_state_decision(&mut decision, &current);
        assert_eq!(decision.updates.semen_delta, Some(-30));

        let current = CharacterStatus {
            semen_volume: 450,
            ..CharacterStatus::default()
        };
        let mut decision = decision_with_updates(json!({ "semen_volume": 150 }));
        validate_state_decision(&mut decision, &current);
        assert_eq!(decision.updates.semen_delta, Some(50));
    }

    #[test]
    fn capacity_never_shrinks_below_floor() {
        let current = CharacterStatus {
            vaginal_capacity: 60,
            ..CharacterStatus::default()
        };
        let mut decision = decision_with_updates(json!({ "vaginal_capacity": -50 }));
        validate_state_decision(&mut decision, &current);
        assert_eq!(decision.updates.capacity_delta, Some(-10));
    }

    #[test]
    fn invalid_enum_values_are_dropped() {
        let current = CharacterStatus::default();
        let mut decision = decision_with_updates(json!({
            "vaginal_state": "完全不存在",
            "vaginal_wetness": "湿润",
            "pregnancy_status": "也许"
        }));
        validate_state_decision(&mut decision, &current);
        assert_eq!(decision.updates.vaginal_state, None);
        assert_eq!(decision.updates.vaginal_wetness, Some(WetnessLevel::Moist));
        assert_eq!(decision.updates.pregnancy_status, None);
    }

    #[test]
    fn unknown_fields_are_dropped() {
        let current = CharacterStatus::default();
        let mut decision = decision_with_updates(json!({
            "hp": 100,
            "pleasure_value": 10
        }));
        validate_state_decision(&mut decision, &current);
        assert_eq!(decision.updates.pleasure_delta, Some(10));
        assert_eq!(decision.updates.field_names(), vec!["pleasure_delta"]);
    }

    #[test]
    fn physiological_state_is_truncated() {
        let current = CharacterStatus::default();
        let long_text = "长".repeat(150);
        let mut decision =
            decision_with_updates(json!({ "physiological_state": long_text }));
        validate_state_decision(&mut decision, &current);
        let stored = decision.updates.physiological_state.expect("kept");
        // Plain cut at 100 chars, no ellipsis appended.
        assert_eq!(stored.chars().count(), 100);
        assert!(!stored.contains('…'));
        assert!(stored.chars().all(|c| c == '长'));
    }

    #[test]
    fn pregnancy_counter_never_goes_negative() {
        let current = CharacterStatus::default();
        let mut decision = decision_with_updates(json!({ "pregnancy_counter": -5 }));
        validate_state_decision(&mut decision, &current);
        assert_eq!(decision.updates.pregnancy_counter, Some(0));

        let mut decision = decision_with_updates(json!({ "pregnancy_counter": 12 }));
        validate_state_decision(&mut decision, &current);
        assert_eq!(decision.updates.pregnancy_counter, Some(12));
    }

    #[test]
    fn collection_fields_serialize_to_json_text() {
        let current = CharacterStatus::default();
        let mut decision = decision_with_updates(json!({
            "inventory": ["项链", "钥匙"],
            "fetishes": { "项圈": "轻度" },
            "semen_sources": "[\"某人\"]"
        }));
        validate_state_decision(&mut decision, &current);
        let inventory = decision.updates.inventory.expect("inventory kept");
        let parsed: Vec<String> = serde_json::from_str(&inventory).expect("valid json");
        assert_eq!(parsed, vec!["项链", "钥匙"]);
        assert!(decision.updates.fetishes.is_some());
        assert_eq!(decision.updates.semen_sources.as_deref(), Some("[\"某人\"]"));
    }

    #[test]
    fn scene_decay_caps_planner_delta() {
        let current = CharacterStatus::default();
        let mut decision = StateDecision::no_change();
        decision.updates.pleasure_delta = Some(50);
        apply_scene_decay(&mut decision, SceneType::Romantic, &current);
        assert_eq!(decision.updates.pleasure_delta, Some(20));

        // Explicit scenes allow the full delta.
        decision.updates.pleasure_delta = Some(50);
        apply_scene_decay(&mut decision, SceneType::Explicit, &current);
        assert_eq!(decision.updates.pleasure_delta, Some(50));
    }

    #[test]
    fn scene_decay_fills_in_flat_decay() {
        let current = CharacterStatus {
            pleasure_value: 30,
            ..CharacterStatus::default()
        };
        let mut decision = StateDecision::no_change();
        apply_scene_decay(&mut decision, SceneType::Rest, &current);
        assert_eq!(decision.updates.pleasure_delta, Some(-15));

        let mut decision = StateDecision::no_change();
        apply_scene_decay(&mut decision, SceneType::Normal, &current);
        assert_eq!(decision.updates.pleasure_delta, Some(-5));

        // Decay never drives pleasure negative.
        let low = CharacterStatus {
            pleasure_value: 3,
            ..CharacterStatus::default()
        };
        let mut decision = StateDecision::no_change();
        apply_scene_decay(&mut decision, SceneType::Rest, &low);
        assert_eq!(decision.updates.pleasure_delta, Some(-3));

        // Romantic scenes neither decay nor synthesize a delta.
        let mut decision = StateDecision::no_change();
        apply_scene_decay(&mut decision, SceneType::Romantic, &current);
        assert_eq!(decision.updates.pleasure_delta, None);
    }

    #[test]
    fn pleasure_mandates_highest_wetness_floor() {
        let current = CharacterStatus {
            pleasure_value: 45,
            ..CharacterStatus::default()
        };
        let mut decision = StateDecision::no_change();
        decision.updates.pleasure_delta = Some(10);
        // Final pleasure 55 satisfies both the 30 and 50 thresholds; the
        // higher one wins.
        ensure_status_consistency(&mut decision, &current, SceneType::Intimate);
        assert_eq!(decision.updates.vaginal_wetness, Some(WetnessLevel::Moist));

        let current = CharacterStatus {
            pleasure_value: 95,
            vaginal_wetness: WetnessLevel::Soaked,
            ..CharacterStatus::default()
        };
        let mut decision = StateDecision::no_change();
        ensure_status_consistency(&mut decision, &current, SceneType::Explicit);
        assert_eq!(
            decision.updates.vaginal_wetness,
            Some(WetnessLevel::Dripping)
        );
    }

    #[test]
    fn wetness_already_above_floor_is_untouched() {
        let current = CharacterStatus {
            pleasure_value: 35,
            vaginal_wetness: WetnessLevel::Soaked,
            ..CharacterStatus::default()
        };
        let mut decision = StateDecision::no_change();
        ensure_status_consistency(&mut decision, &current, SceneType::Intimate);
        assert_eq!(decision.updates.vaginal_wetness, None);
    }

    #[test]
    fn sharp_pleasure_drop_steps_wetness_down() {
        let current = CharacterStatus {
            pleasure_value: 40,
            vaginal_wetness: WetnessLevel::Soaked,
            ..CharacterStatus::default()
        };
        let mut decision = StateDecision::no_change();
        decision.updates.pleasure_delta = Some(-30);
        ensure_status_consistency(&mut decision, &current, SceneType::Rest);
        assert_eq!(decision.updates.vaginal_wetness, Some(WetnessLevel::Moist));
    }

    #[test]
    fn auto_physiological_state_tiers() {
        let mut decision = StateDecision::no_change();
        let current = CharacterStatus {
            pleasure_value: 85,
            vaginal_wetness: WetnessLevel::Dripping,
            ..CharacterStatus::default()
        };
        ensure_status_consistency(&mut decision, &current, SceneType::Explicit);
        assert_eq!(
            decision.updates.physiological_state.as_deref(),
            Some("呼吸急促，身体剧烈颤抖")
        );

        let mut decision = StateDecision::no_change();
        let calm = CharacterStatus {
            pleasure_value: 45,
            vaginal_wetness: WetnessLevel::Moist,
            ..CharacterStatus::default()
        };
        ensure_status_consistency(&mut decision, &calm, SceneType::Normal);
        assert_eq!(
            decision.updates.physiological_state.as_deref(),
            Some("呼吸略微急促")
        );
    }

    #[test]
    fn auto_physio_skipped_during_orgasm_or_rest() {
        let current = CharacterStatus {
            pleasure_value: 85,
            physiological_state: "高潮后的余韵中颤抖".to_string(),
            vaginal_wetness: WetnessLevel::Dripping,
            ..CharacterStatus::default()
        };
        let mut decision = StateDecision::no_change();
        ensure_status_consistency(&mut decision, &current, SceneType::Explicit);
        assert_eq!(decision.updates.physiological_state, None);

        let neutral = CharacterStatus {
            pleasure_value: 85,
            vaginal_wetness: WetnessLevel::Dripping,
            ..CharacterStatus::default()
        };
        let mut decision = StateDecision::no_change();
        ensure_status_consistency(&mut decision, &neutral, SceneType::Rest);
        assert_eq!(decision.updates.physiological_state, None);
    }

    #[test]
    fn preview_merges_without_persisting() {
        let current = CharacterStatus {
            pleasure_value: 20,
            semen_volume: 100,
            ..CharacterStatus::default()
        };
        let mut decision = StateDecision::no_change();
        decision.updates.pleasure_delta = Some(15);
        decision.updates.semen_delta = Some(-40);
        decision.updates.vaginal_state = Some(VaginalState::Tense);
        decision.updates.pregnancy_status = Some(PregnancyStatus::Conceived);
        decision.updates.inventory = Some("[\"钥匙\"]".to_string());

        let preview = apply_state_updates_preview(&current, &decision);
        assert_eq!(preview.pleasure_value, 35);
        assert_eq!(preview.semen_volume, 60);
        assert_eq!(preview.vaginal_state, VaginalState::Tense);
        assert_eq!(preview.pregnancy_status, PregnancyStatus::Conceived);
        assert_eq!(preview.inventory, "[\"钥匙\"]");
        // The source status is untouched.
        assert_eq!(current.pleasure_value, 20);
    }
}
