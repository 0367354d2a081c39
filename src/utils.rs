use chrono::NaiveDateTime;
use serde_json::{Map, Value};

/// Extracts a JSON object from raw LLM output, which is usually wrapped in a
/// ```json fenced block but sometimes arrives bare or as loose labelled text.
pub fn parse_json_response(response: &str) -> Option<Value> {
    let json_str = match response.find("```json") {
        Some(start) => {
            let rest = &response[start + "```json".len()..];
            match rest.find("```") {
                Some(end) => rest[..end].trim(),
                None => rest.trim(),
            }
        }
        None => response.trim(),
    };

    match serde_json::from_str::<Value>(json_str) {
        Ok(value) if value.is_object() => Some(value),
        _ => {
            log::warn!("[Utils] JSON parse failed, trying relaxed extraction");
            parse_structured_text(response)
        }
    }
}

/// Relaxed fallback: pull 地点/着装/场景 out of free text with labelled lines.
/// Returns a JSON object only when all three fields were recovered.
pub fn parse_structured_text(response: &str) -> Option<Value> {
    if response.is_empty() {
        return None;
    }

    let lines: Vec<&str> = response
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let joined = lines.join(" ");

    let mut fields = Map::new();
    for key in ["地点", "着装", "场景"] {
        if let Some(value) = extract_labelled_field(key, &joined) {
            fields.insert(key.to_string(), Value::String(value));
        }
    }

    if !fields.contains_key("场景") {
        if let Some(first) = lines.first() {
            fields.insert("场景".to_string(), Value::String(first.to_string()));
        }
    }

    if ["地点", "着装", "场景"].iter().all(|k| fields.contains_key(*k)) {
        Some(Value::Object(fields))
    } else {
        None
    }
}

// Captures the text after "label：" (or "label:") up to the next label,
// a brace, or end of input.
fn extract_labelled_field(label: &str, text: &str) -> Option<String> {
    let start = ["：", ":"].iter().find_map(|sep| {
        let marker = format!("{label}{sep}");
        text.find(&marker).map(|pos| pos + marker.len())
    })?;

    let rest = &text[start..];
    let mut end = rest.len();
    for next_label in ["地点", "着装", "场景"] {
        for sep in ["：", ":"] {
            let marker = format!("{next_label}{sep}");
            if let Some(pos) = rest.find(&marker) {
                end = end.min(pos);
            }
        }
    }
    for brace in ['{', '}'] {
        if let Some(pos) = rest.find(brace) {
            end = end.min(pos);
        }
    }

    let value = rest[..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Collapses all whitespace runs into single spaces to keep prompts compact.
pub fn collapse_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates overlong text on a char boundary, appending an ellipsis.
pub fn truncate_text(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().take(limit.saturating_sub(1)).collect();
    format!("{}…", kept.trim_end())
}

/// Parses the timestamp formats that show up in stored rows.
pub fn parse_datetime(time_str: &str) -> Option<NaiveDateTime> {
    if time_str.is_empty() {
        return None;
    }

    const FORMATS: [&str; 5] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
    ];

    for fmt in FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(time_str, fmt) {
            return Some(parsed);
        }
    }

    log::warn!("[Utils] Unparseable timestamp: {}", time_str);
    None
}

/// Composite session key for the store: one scene per chat + user pair.
pub fn build_session_id(chat_id: &str, user_id: Option<&str>) -> String {
    let user_part = match user_id {
        Some(id) if !id.is_empty() => id,
        _ => "unknown_user",
    };
    format!("{chat_id}:{user_part}")
}

/// Removes every whitespace character from a decision key. Planner models
/// sometimes emit keys like "地 点 变 化" that must still be recognized.
pub fn strip_key_whitespace(key: &str) -> String {
    key.chars().filter(|c| !c.is_whitespace()).collect()
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Cleans short token fields (location/clothing names): removes whitespace
/// wedged between CJK characters and collapses any other run to one space.
/// Prose fields keep their internal whitespace and must not go through this.
pub fn normalize_scene_field(value: &str) -> String {
    let text = value.replace('\u{3000}', " ");
    let text = text.trim();

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_whitespace() {
            let mut j = i;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            let prev = out.chars().last();
            let next = chars.get(j).copied();
            let between_cjk = matches!((prev, next), (Some(p), Some(n)) if is_cjk(p) && is_cjk(n));
            if !between_cjk && next.is_some() && prev.is_some() {
                out.push(' ');
            }
            i = j;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// Generated scene text may carry literal escaped newlines; unescape them
/// before handing the text to the host for display.
pub fn unescape_scene_text(text: &str) -> String {
    text.replace("\\n\\n", "\n\n").replace("\\n", "\n")
}

/// Parses a JSON collection column, falling back to the given default when
/// the column is empty or corrupt.
pub fn safe_json_loads(text: &str, default: Value) -> Value {
    if text.is_empty() {
        return default;
    }
    serde_json::from_str(text).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json() {
        let response = "some preamble\n```json\n{\"地点\": \"卧室\", \"场景\": \"x\"}\n```";
        let value = parse_json_response(response).expect("should parse");
        assert_eq!(value["地点"], "卧室");
    }

    #[test]
    fn parses_bare_json() {
        let value = parse_json_response("{\"场景\": \"文本\"}").expect("should parse");
        assert_eq!(value["场景"], "文本");
    }

    #[test]
    fn relaxed_extraction_recovers_three_fields() {
        let response = "地点：海边 着装：泳装 场景：夕阳下的沙滩散步";
        let value = parse_json_response(response).expect("relaxed parse should succeed");
        assert_eq!(value["地点"], "海边");
        assert_eq!(value["着装"], "泳装");
        assert_eq!(value["场景"], "夕阳下的沙滩散步");
    }

    #[test]
    fn relaxed_extraction_requires_all_fields() {
        assert!(parse_structured_text("地点：海边").is_none());
    }

    #[test]
    fn scene_field_normalization_strips_cjk_gaps() {
        assert_eq!(normalize_scene_field("卧 室"), "卧室");
        assert_eq!(normalize_scene_field("  咖啡 厅 二 楼 "), "咖啡厅二楼");
        // Latin words keep a single separating space.
        assert_eq!(normalize_scene_field("cafe   lounge"), "cafe lounge");
    }

    #[test]
    fn truncation_is_char_aware() {
        let text = "一二三四五六七八九十";
        let truncated = truncate_text(text, 5);
        assert_eq!(truncated.chars().count(), 5);
        assert!(truncated.ends_with('…'));
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn session_id_falls_back_for_missing_user() {
        assert_eq!(build_session_id("chat1", Some("u9")), "chat1:u9");
        assert_eq!(build_session_id("chat1", None), "chat1:unknown_user");
        assert_eq!(build_session_id("chat1", Some("")), "chat1:unknown_user");
    }

    #[test]
    fn datetime_formats_are_accepted() {
        assert!(parse_datetime("2024-03-01 10:00:00").is_some());
        assert!(parse_datetime("2024-03-01T10:00:00.250").is_some());
        assert!(parse_datetime("2024/03/01 10:00:00").is_some());
        assert!(parse_datetime("not a time").is_none());
    }

    #[test]
    fn unescapes_literal_newlines() {
        assert_eq!(unescape_scene_text("a\\n\\nb\\nc"), "a\n\nb\nc");
    }
}
