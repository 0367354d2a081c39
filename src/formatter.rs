use serde_json::Value;

use crate::settings::{StatusBarMode, StatusChangesFormat};
use crate::status::{CharacterStatus, PregnancyStatus, WetnessLevel};

/// Renders the status record as prompt text for the LLMs. The compact form
/// feeds the planner, the full form the narrator.
pub fn build_status_summary(status: &CharacterStatus, compact: bool) -> String {
    if compact {
        return format!(
            "生理: {} | 阴道: {} | 湿润: {} | 快感: {}/{} | 污染: {}",
            status.physiological_state,
            status.vaginal_state,
            status.vaginal_wetness,
            status.pleasure_value,
            status.pleasure_threshold,
            status.corruption_level
        );
    }

    let parsed = status.parsed_collections();

    let mut lines = vec![
        format!("生理状态: {}", status.physiological_state),
        format!("阴道状态: {}", status.vaginal_state),
        format!("湿润度: {}", status.vaginal_wetness),
        format!("快感值: {}/{}", status.pleasure_value, status.pleasure_threshold),
        format!("污染度: {}", status.corruption_level),
        format!("怀孕状态: {}", status.pregnancy_status),
        format!("体内精液: {}ml", status.semen_volume),
        format!(
            "当前道具: {}",
            if parsed.inventory.is_empty() {
                "无".to_string()
            } else {
                parsed.inventory.join(", ")
            }
        ),
    ];

    if status.semen_volume > 0 && !parsed.semen_sources.is_empty() {
        lines.push(format!("精液来源: {}", parsed.semen_sources.join(", ")));
    }

    if status.pregnancy_status == PregnancyStatus::Conceived {
        lines.push(format!(
            "怀孕详情: 父亲({}), 已怀孕{}天",
            status.pregnancy_source.as_deref().unwrap_or("未知"),
            status.pregnancy_counter
        ));
    }

    if status.vaginal_capacity != 100 {
        lines.push(format!("阴道容量: {}", status.vaginal_capacity));
    }
    if status.anal_development > 0 {
        lines.push(format!("后穴开发度: {}/100", status.anal_development));
    }
    if !parsed.vaginal_foreign.is_empty() {
        lines.push(format!("阴道内异物: {}", parsed.vaginal_foreign.join(", ")));
    }

    if let Some(mods) = parsed.permanent_mods.as_object() {
        if !mods.is_empty() {
            let text = mods
                .iter()
                .map(|(k, v)| format!("{k}({})", value_text(v)))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("永久改造: {text}"));
        }
    }

    if let Some(condition) = parsed.body_condition.as_object() {
        if !condition.is_empty() {
            let text = condition
                .iter()
                .map(|(k, v)| format!("{k}:{}", value_text(v)))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("部位状况: {text}"));
        }
    }

    if let Some(fetishes) = parsed.fetishes.as_object() {
        if !fetishes.is_empty() {
            let text = fetishes
                .iter()
                .map(|(name, data)| match data.as_object() {
                    Some(detail) => format!(
                        "{name}Lv{}({}exp)",
                        detail.get("等级").and_then(Value::as_i64).unwrap_or(0),
                        detail.get("经验").and_then(Value::as_i64).unwrap_or(0)
                    ),
                    None => name.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("已有性癖: {text}"));
        }
    }

    lines.join("\n")
}

/// One-line digest of what the turn changed, for appending to the reply.
/// Returns an empty string when nothing visible moved.
pub fn format_status_changes(
    original: &CharacterStatus,
    updated: &CharacterStatus,
    format: StatusChangesFormat,
) -> String {
    let detailed = format == StatusChangesFormat::Detailed;
    let mut changes: Vec<String> = Vec::new();

    if original.pleasure_value != updated.pleasure_value {
        let delta = updated.pleasure_value - original.pleasure_value;
        if detailed {
            changes.push(format!(
                "快感值: {} → {}/{} ({}{delta})",
                original.pleasure_value,
                updated.pleasure_value,
                updated.pleasure_threshold,
                if delta > 0 { "+" } else { "" }
            ));
        } else {
            changes.push(format!("快感值 {}{delta}", if delta > 0 { "+" } else { "" }));
        }
    }

    if original.vaginal_wetness != updated.vaginal_wetness {
        if detailed {
            changes.push(format!(
                "湿润度: {} → {}",
                original.vaginal_wetness, updated.vaginal_wetness
            ));
        } else {
            changes.push(format!("湿润度 → {}", updated.vaginal_wetness));
        }
    }

    if original.corruption_level != updated.corruption_level {
        let delta = updated.corruption_level - original.corruption_level;
        if detailed {
            changes.push(format!(
                "污染度: {} → {} (+{delta})",
                original.corruption_level, updated.corruption_level
            ));
        } else {
            changes.push(format!("污染度 +{delta}"));
        }
    }

    if original.physiological_state != updated.physiological_state {
        if detailed {
            changes.push(format!("生理: {}", updated.physiological_state));
        } else {
            changes.push("生理变化".to_string());
        }
    }

    if original.vaginal_state != updated.vaginal_state {
        if detailed {
            changes.push(format!(
                "阴道: {} → {}",
                original.vaginal_state, updated.vaginal_state
            ));
        } else {
            changes.push(format!("阴道 → {}", updated.vaginal_state));
        }
    }

    if original.semen_volume != updated.semen_volume {
        let delta = updated.semen_volume - original.semen_volume;
        let sign = if delta > 0 { "+" } else { "" };
        if detailed {
            changes.push(format!(
                "精液: {}ml → {}ml ({sign}{delta}ml)",
                original.semen_volume, updated.semen_volume
            ));
        } else {
            changes.push(format!("精液 {sign}{delta}ml"));
        }
    }

    if original.pregnancy_status != updated.pregnancy_status {
        if detailed {
            if updated.pregnancy_status == PregnancyStatus::Conceived {
                changes.push(format!(
                    "怀孕: {} → {} ({})",
                    original.pregnancy_status,
                    updated.pregnancy_status,
                    updated.pregnancy_source.as_deref().unwrap_or("未知")
                ));
            } else {
                changes.push(format!(
                    "怀孕: {} → {}",
                    original.pregnancy_status, updated.pregnancy_status
                ));
            }
        } else {
            changes.push(format!("怀孕 → {}", updated.pregnancy_status));
        }
    }

    if changes.is_empty() {
        String::new()
    } else {
        format!("📊 {}", changes.join(" | "))
    }
}

/// Status bar appended under the scene reply.
pub fn format_status_bar(
    status: &CharacterStatus,
    mode: StatusBarMode,
    use_progress_bar: bool,
) -> String {
    let heart = heart_icon(status.pleasure_value, status.pleasure_threshold);
    let wetness_icon = wetness_icon(status.vaginal_wetness);

    match mode {
        StatusBarMode::Compact => {
            let mut parts = Vec::new();
            if use_progress_bar {
                let bar = progress_bar(status.pleasure_value, status.pleasure_threshold, 10);
                parts.push(format!(
                    "{heart} {bar} {}/{}",
                    status.pleasure_value, status.pleasure_threshold
                ));
            } else {
                parts.push(format!(
                    "{heart} {}/{}",
                    status.pleasure_value, status.pleasure_threshold
                ));
            }
            parts.push(format!("{wetness_icon} {}", status.vaginal_wetness));
            let physio: String = status.physiological_state.chars().take(12).collect();
            parts.push(format!("🌡️ {physio}"));
            if status.semen_volume > 0 {
                parts.push(format!("💦 {}ml", status.semen_volume));
            }
            if status.pregnancy_status == PregnancyStatus::Conceived {
                parts.push("🤰 受孕中".to_string());
            }
            format!("┈┈ 状态 ┈┈\n{}", parts.join(" | "))
        }
        StatusBarMode::Full => {
            let mut lines = vec!["╭───── 角色状态 ─────╮".to_string()];
            if use_progress_bar {
                let bar = progress_bar(status.pleasure_value, status.pleasure_threshold, 12);
                lines.push(format!(
                    "│ {heart} 快感: {bar} {}/{}",
                    status.pleasure_value, status.pleasure_threshold
                ));
            } else {
                lines.push(format!(
                    "│ {heart} 快感: {}/{}",
                    status.pleasure_value, status.pleasure_threshold
                ));
            }
            lines.push(format!("│ {wetness_icon} 湿润: {}", status.vaginal_wetness));
            lines.push(format!("│ 😈 污染: {}", status.corruption_level));
            lines.push(format!("│ 🌡️ 生理: {}", status.physiological_state));
            lines.push(format!("│ 🔮 阴道: {}", status.vaginal_state));
            if status.semen_volume > 0 {
                lines.push(format!("│ 💦 精液: {}ml", status.semen_volume));
            }
            if status.pregnancy_status == PregnancyStatus::Conceived {
                lines.push(format!(
                    "│ 🤰 怀孕: {}天 ({})",
                    status.pregnancy_counter,
                    status.pregnancy_source.as_deref().unwrap_or("未知")
                ));
            }
            lines.push("╰────────────────────╯".to_string());
            lines.join("\n")
        }
        StatusBarMode::ChangesOnly => String::new(),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn heart_icon(pleasure: i64, threshold: i64) -> &'static str {
    let ratio = if threshold > 0 {
        pleasure as f64 / threshold as f64
    } else {
        0.0
    };
    if ratio >= 0.9 {
        "💗"
    } else if ratio >= 0.7 {
        "💕"
    } else if ratio >= 0.5 {
        "❤️"
    } else if ratio >= 0.3 {
        "🩷"
    } else {
        "🤍"
    }
}

fn wetness_icon(wetness: WetnessLevel) -> &'static str {
    match wetness {
        WetnessLevel::Normal | WetnessLevel::Damp => "💧",
        WetnessLevel::Moist | WetnessLevel::Soaked => "💦",
        WetnessLevel::Dripping => "🌊",
    }
}

fn progress_bar(value: i64, max_value: i64, length: usize) -> String {
    let max_value = if max_value <= 0 { 100 } else { max_value };
    let ratio = (value as f64 / max_value as f64).clamp(0.0, 1.0);
    let filled = (ratio * length as f64) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(length - filled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::VaginalState;

    #[test]
    fn compact_summary_is_single_line() {
        let status = CharacterStatus::default();
        let summary = build_status_summary(&status, true);
        assert!(summary.contains("快感: 0/100"));
        assert!(!summary.contains('\n'));
    }

    #[test]
    fn full_summary_shows_conditional_sections() {
        let status = CharacterStatus {
            semen_volume: 120,
            semen_sources: "[\"某人\"]".to_string(),
            pregnancy_status: PregnancyStatus::Conceived,
            pregnancy_source: Some("某人".to_string()),
            pregnancy_counter: 3,
            anal_development: 10,
            vaginal_capacity: 140,
            fetishes: "{\"项圈\": {\"等级\": 2, \"经验\": 40}}".to_string(),
            ..CharacterStatus::default()
        };
        let summary = build_status_summary(&status, false);
        assert!(summary.contains("精液来源: 某人"));
        assert!(summary.contains("怀孕详情: 父亲(某人), 已怀孕3天"));
        assert!(summary.contains("阴道容量: 140"));
        assert!(summary.contains("后穴开发度: 10/100"));
        assert!(summary.contains("项圈Lv2(40exp)"));
    }

    #[test]
    fn default_status_hides_conditional_sections() {
        let summary = build_status_summary(&CharacterStatus::default(), false);
        assert!(!summary.contains("精液来源"));
        assert!(!summary.contains("怀孕详情"));
        assert!(!summary.contains("阴道容量"));
    }

    #[test]
    fn change_digest_reports_deltas() {
        let original = CharacterStatus::default();
        let updated = CharacterStatus {
            pleasure_value: 35,
            vaginal_wetness: WetnessLevel::Damp,
            vaginal_state: VaginalState::Tense,
            ..CharacterStatus::default()
        };
        let digest = format_status_changes(&original, &updated, StatusChangesFormat::Detailed);
        assert!(digest.starts_with("📊 "));
        assert!(digest.contains("快感值: 0 → 35/100 (+35)"));
        assert!(digest.contains("湿润度: 正常 → 微湿"));
        assert!(digest.contains("阴道: 放松 → 紧绷"));

        let compact = format_status_changes(&original, &updated, StatusChangesFormat::Compact);
        assert!(compact.contains("快感值 +35"));
        assert!(compact.contains("湿润度 → 微湿"));
    }

    #[test]
    fn no_changes_yield_empty_digest() {
        let status = CharacterStatus::default();
        assert_eq!(
            format_status_changes(&status, &status, StatusChangesFormat::Detailed),
            ""
        );
    }

    #[test]
    fn status_bar_modes() {
        let status = CharacterStatus {
            pleasure_value: 95,
            ..CharacterStatus::default()
        };
        let compact = format_status_bar(&status, StatusBarMode::Compact, true);
        assert!(compact.contains("💗"));
        assert!(compact.contains("█"));

        let full = format_status_bar(&status, StatusBarMode::Full, false);
        assert!(full.contains("角色状态"));
        assert!(full.contains("│ 😈 污染: 0"));

        assert_eq!(
            format_status_bar(&status, StatusBarMode::ChangesOnly, true),
            ""
        );
    }

    #[test]
    fn progress_bar_is_bounded() {
        assert_eq!(progress_bar(200, 100, 10), "█".repeat(10));
        assert_eq!(progress_bar(-5, 100, 10), "░".repeat(10));
        assert_eq!(progress_bar(50, 100, 10), format!("{}{}", "█".repeat(5), "░".repeat(5)));
    }
}
