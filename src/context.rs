use crate::error::StoreError;
use crate::store::{HistoryEntry, SceneStore};
use crate::utils::{collapse_text, truncate_text};

pub const HISTORY_LIMIT_CAP: usize = 50;
const SMART_CONTEXT_MIN: usize = 5;

/// Which prompt the context block is built for. The planner sees a short
/// window, the narrator a longer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Planner,
    Reply,
}

/// Renders recent turn history into a prompt block.
pub struct ContextBuilder {
    store: SceneStore,
}

impl ContextBuilder {
    pub fn new(store: SceneStore) -> Self {
        ContextBuilder { store }
    }

    /// Builds the history block for the given prompt. Long reply windows are
    /// summarized: older turns collapse to a trajectory digest, the last five
    /// stay verbatim.
    pub async fn build_context_block(
        &self,
        session_id: &str,
        kind: ContextKind,
        limit: usize,
    ) -> Result<String, StoreError> {
        if session_id.is_empty() {
            return Ok(String::new());
        }

        let limit = limit.min(HISTORY_LIMIT_CAP);
        if limit == 0 {
            return Ok(String::new());
        }

        let history = self.store.get_recent_history(session_id, limit).await?;
        if history.is_empty() {
            return Ok("【最近场景对话】暂无历史记录".to_string());
        }

        if kind == ContextKind::Reply && history.len() > SMART_CONTEXT_MIN {
            Ok(build_smart_context(&history))
        } else {
            Ok(build_standard_context(&history, kind))
        }
    }
}

fn build_standard_context(history: &[HistoryEntry], kind: ContextKind) -> String {
    let count = history.len();
    let header = match kind {
        ContextKind::Planner => format!("【最近场景对话】（最近{count}轮）"),
        ContextKind::Reply => format!("【最近场景对话】（最早在前，共{count}轮）"),
    };

    let mut lines = vec![header];
    for (idx, entry) in history.iter().enumerate() {
        push_entry_lines(&mut lines, idx + 1, entry, 80, false);
    }
    lines.join("\n")
}

fn build_smart_context(history: &[HistoryEntry]) -> String {
    let total = history.len();
    let recent_count = SMART_CONTEXT_MIN.min(total);
    let summary_count = total - recent_count;

    let mut lines = vec![format!("【最近场景对话】（共{total}轮）")];

    if summary_count > 0 {
        lines.push(format!("\n【早期对话摘要】（{summary_count}轮）"));
        lines.push(summarize_history(&history[..summary_count]));
    }

    lines.push(format!("\n【最近对话详情】（{recent_count}轮）"));
    for (idx, entry) in history[summary_count..].iter().enumerate() {
        push_entry_lines(&mut lines, idx + 1, entry, 100, true);
    }

    lines.join("\n")
}

fn push_entry_lines(
    lines: &mut Vec<String>,
    idx: usize,
    entry: &HistoryEntry,
    scene_limit: usize,
    decorated: bool,
) {
    let location = non_empty(&entry.location, "未知");
    let clothing = non_empty(&entry.clothing, "未知");
    let user_msg = collapse_text(&entry.user_message);
    let bot_reply = collapse_text(&entry.bot_reply);
    let scene_preview = collapse_text(&entry.scene_description);

    if decorated {
        lines.push(format!(
            "{idx}. [{}] 📍{location} / 👗{clothing}",
            entry.timestamp
        ));
    } else {
        lines.push(format!(
            "{idx}. [{}] 地点：{location} / 着装：{clothing}",
            entry.timestamp
        ));
    }
    lines.push(format!("    用户：{}", non_empty(&user_msg, "（无内容）")));
    lines.push(format!("    Bot：{}", non_empty(&bot_reply, "（无内容）")));
    if !scene_preview.is_empty() {
        lines.push(format!("    场景：{}", truncate_text(&scene_preview, scene_limit)));
    }
}

// Location trajectory plus the first few user messages, compressed.
fn summarize_history(history: &[HistoryEntry]) -> String {
    if history.is_empty() {
        return "无".to_string();
    }

    let mut locations: Vec<&str> = Vec::new();
    for entry in history {
        if !entry.location.is_empty() && locations.last() != Some(&entry.location.as_str()) {
            locations.push(&entry.location);
        }
    }

    let mut key_messages: Vec<String> = Vec::new();
    for entry in history {
        if !entry.user_message.is_empty() {
            key_messages.push(truncate_text(&entry.user_message, 20));
        }
    }

    let mut parts = Vec::new();
    if !locations.is_empty() {
        let mut trajectory = locations
            .iter()
            .take(5)
            .copied()
            .collect::<Vec<_>>()
            .join(" → ");
        if locations.len() > 5 {
            trajectory.push_str(" → ...");
        }
        parts.push(format!("地点轨迹: {trajectory}"));
    }
    if !key_messages.is_empty() {
        let mut shown: Vec<String> = key_messages.iter().take(3).cloned().collect();
        if key_messages.len() > 3 {
            shown.push(format!("...等{}条消息", key_messages.len()));
        }
        parts.push(format!("对话要点: {}", shown.join("; ")));
    }

    if parts.is_empty() {
        "普通对话".to_string()
    } else {
        parts.join("\n")
    }
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(location: &str, user: &str) -> HistoryEntry {
        HistoryEntry {
            timestamp: "2024-03-01 10:00:00".to_string(),
            location: location.to_string(),
            clothing: "便装".to_string(),
            scene_description: "一段场景描述".to_string(),
            user_message: user.to_string(),
            bot_reply: "回应".to_string(),
        }
    }

    #[test]
    fn standard_context_lists_every_turn() {
        let history = vec![entry("卧室", "早安"), entry("厨房", "做饭")];
        let block = build_standard_context(&history, ContextKind::Reply);
        assert!(block.contains("共2轮"));
        assert!(block.contains("地点：卧室"));
        assert!(block.contains("用户：做饭"));
    }

    #[test]
    fn long_history_gets_summarized() {
        let history: Vec<HistoryEntry> = (0..8)
            .map(|i| entry(&format!("地点{i}"), &format!("消息{i}")))
            .collect();
        let block = build_smart_context(&history);
        assert!(block.contains("【早期对话摘要】（3轮）"));
        assert!(block.contains("【最近对话详情】（5轮）"));
        assert!(block.contains("地点轨迹: 地点0 → 地点1 → 地点2"));
        // Detailed section starts at the fourth turn.
        assert!(block.contains("📍地点3"));
    }

    #[test]
    fn summary_handles_repeated_locations() {
        let history = vec![entry("卧室", "a"), entry("卧室", "b"), entry("阳台", "c")];
        let summary = summarize_history(&history);
        assert!(summary.contains("卧室 → 阳台"));
        assert!(!summary.contains("卧室 → 卧室"));
    }
}
