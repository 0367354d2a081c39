// ../tests/tests.rs
use scene_weaver::*;

use std::sync::Mutex;

use scene_weaver::decision::StatusUpdates;
use scene_weaver::settings::{BotPersona, ModelMode};
use scene_weaver::status::{VaginalState, WetnessLevel};

// ---- store ----

#[tokio::test]
async fn status_init_is_idempotent() {
    let store = SceneStore::open_in_memory().await.expect("open store");
    store.init_status_if_absent("chat:u1").await.expect("init");

    let updates = StatusUpdates {
        pleasure_delta: Some(30),
        ..StatusUpdates::default()
    };
    store.merge_status("chat:u1", &updates).await.expect("merge");

    // A second init must not reset the row.
    store.init_status_if_absent("chat:u1").await.expect("re-init");
    let status = store
        .get_status("chat:u1")
        .await
        .expect("get")
        .expect("row exists");
    assert_eq!(status.pleasure_value, 30);
}

#[tokio::test]
async fn merge_is_additive_for_numbers_and_replaces_the_rest() {
    let store = SceneStore::open_in_memory().await.expect("open store");
    store.init_status_if_absent("s").await.expect("init");

    let first = StatusUpdates {
        pleasure_delta: Some(20),
        semen_delta: Some(100),
        vaginal_state: Some(VaginalState::Tense),
        inventory: Some("[\"项链\"]".to_string()),
        ..StatusUpdates::default()
    };
    store.merge_status("s", &first).await.expect("merge 1");

    let second = StatusUpdates {
        pleasure_delta: Some(15),
        semen_delta: Some(-40),
        vaginal_state: Some(VaginalState::Spasming),
        vaginal_wetness: Some(WetnessLevel::Moist),
        ..StatusUpdates::default()
    };
    store.merge_status("s", &second).await.expect("merge 2");

    let status = store.get_status("s").await.expect("get").expect("row");
    assert_eq!(status.pleasure_value, 35);
    assert_eq!(status.semen_volume, 60);
    assert_eq!(status.vaginal_state, VaginalState::Spasming);
    assert_eq!(status.vaginal_wetness, WetnessLevel::Moist);
    assert_eq!(status.inventory, "[\"项链\"]");
    // JSON columns must stay parseable.
    assert_eq!(status.parsed_collections().inventory, vec!["项链"]);
}

#[tokio::test]
async fn pleasure_never_goes_negative_in_storage() {
    let store = SceneStore::open_in_memory().await.expect("open store");
    store.init_status_if_absent("s").await.expect("init");

    let updates = StatusUpdates {
        pleasure_delta: Some(-80),
        ..StatusUpdates::default()
    };
    store.merge_status("s", &updates).await.expect("merge");
    let status = store.get_status("s").await.expect("get").expect("row");
    assert_eq!(status.pleasure_value, 0);
}

#[tokio::test]
async fn history_returns_oldest_first() {
    let store = SceneStore::open_in_memory().await.expect("open store");
    for i in 0..4 {
        store
            .add_history(
                "s",
                HistoryEntry {
                    timestamp: format!("2024-03-01 10:0{i}:00"),
                    location: "卧室".to_string(),
                    clothing: "睡裙".to_string(),
                    scene_description: format!("场景{i}"),
                    user_message: format!("消息{i}"),
                    bot_reply: format!("回复{i}"),
                },
            )
            .await
            .expect("insert");
    }

    let recent = store.get_recent_history("s", 3).await.expect("history");
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[0].user_message, "消息1");
    assert_eq!(recent[2].user_message, "消息3");
}

#[tokio::test]
async fn image_preference_survives_scene_clear() {
    let store = SceneStore::open_in_memory().await.expect("open store");
    store
        .create_scene_state(&SceneState {
            chat_id: "s".to_string(),
            enabled: true,
            location: "卧室".to_string(),
            ..SceneState::default()
        })
        .await
        .expect("create");
    store.set_nai_enabled("s", true).await.expect("set nai");

    store.clear_scene_state("s").await.expect("clear");
    assert!(store.get_scene_state("s").await.expect("get").is_none());
    assert!(store.get_nai_enabled("s").await.expect("nai flag"));
}

#[tokio::test]
async fn on_disk_store_opens_and_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scenes.db");
    let store = SceneStore::open(path.to_str().expect("utf8 path"))
        .await
        .expect("open store");
    store.init_status_if_absent("s").await.expect("init");
    assert!(store.get_status("s").await.expect("get").is_some());
}

#[tokio::test]
async fn idle_pleasure_decays_after_long_silence() {
    let store = SceneStore::open_in_memory().await.expect("open store");
    store.init_status_if_absent("s").await.expect("init");
    store
        .merge_status(
            "s",
            &StatusUpdates {
                pleasure_delta: Some(50),
                ..StatusUpdates::default()
            },
        )
        .await
        .expect("merge");

    let stale = SceneState {
        chat_id: "s".to_string(),
        last_update_time: "2024-03-01 10:00:00".to_string(),
        ..SceneState::default()
    };
    let status = store.get_status("s").await.expect("get").expect("row");
    let decayed = state_manager::apply_time_decay(&store, "s", &stale, &status)
        .await
        .expect("decay");
    assert!(decayed);
    // 50 minus the idle decay of 20, committed directly.
    let after = store.get_status("s").await.expect("get").expect("row");
    assert_eq!(after.pleasure_value, 30);
}

#[tokio::test]
async fn idle_decay_skips_recent_or_calm_sessions() {
    let store = SceneStore::open_in_memory().await.expect("open store");
    store.init_status_if_absent("s").await.expect("init");
    store
        .merge_status(
            "s",
            &StatusUpdates {
                pleasure_delta: Some(50),
                ..StatusUpdates::default()
            },
        )
        .await
        .expect("merge");
    let status = store.get_status("s").await.expect("get").expect("row");

    // Updated just now: nothing to decay yet.
    let fresh = SceneState {
        chat_id: "s".to_string(),
        last_update_time: chrono::Local::now()
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        ..SceneState::default()
    };
    let decayed = state_manager::apply_time_decay(&store, "s", &fresh, &status)
        .await
        .expect("decay");
    assert!(!decayed);
    let after = store.get_status("s").await.expect("get").expect("row");
    assert_eq!(after.pleasure_value, 50);

    // Stale but already at zero pleasure: also a no-op.
    store.set_pleasure_value("s", 0).await.expect("set");
    let calm = store.get_status("s").await.expect("get").expect("row");
    let stale = SceneState {
        chat_id: "s".to_string(),
        last_update_time: "2024-03-01 10:00:00".to_string(),
        ..SceneState::default()
    };
    let decayed = state_manager::apply_time_decay(&store, "s", &stale, &calm)
        .await
        .expect("decay");
    assert!(!decayed);
}

#[tokio::test]
async fn disable_keeps_state_for_reenable() {
    let store = SceneStore::open_in_memory().await.expect("open store");
    store
        .create_scene_state(&SceneState {
            chat_id: "s".to_string(),
            enabled: true,
            location: "咖啡厅".to_string(),
            ..SceneState::default()
        })
        .await
        .expect("create");

    store.disable_scene("s").await.expect("disable");
    assert!(!store.is_scene_enabled("s").await.expect("enabled check"));

    store.enable_scene("s").await.expect("enable");
    let state = store.get_scene_state("s").await.expect("get").expect("row");
    assert!(state.enabled);
    assert_eq!(state.location, "咖啡厅");
}

// ---- engine ----

struct Scripted {
    responses: Mutex<Vec<Result<String, AIError>>>,
}

impl Scripted {
    fn new(responses: Vec<Result<String, AIError>>) -> Self {
        Scripted {
            responses: Mutex::new(responses),
        }
    }
}

impl Completion for Scripted {
    async fn complete(&self, _prompt: &str) -> Result<String, AIError> {
        let mut responses = self.responses.lock().expect("lock");
        if responses.is_empty() {
            return Err(AIError::Completion("script exhausted".to_string()));
        }
        responses.remove(0)
    }
}

fn persona() -> BotPersona {
    BotPersona {
        name: "小雪".to_string(),
        personality: "温柔".to_string(),
        reply_style: "细腻".to_string(),
    }
}

async fn engine_with(
    planner: Scripted,
    narrator: Scripted,
    settings: Settings,
) -> SceneEngine<Scripted, Scripted> {
    let store = SceneStore::open_in_memory().await.expect("open store");
    let generator = SceneGenerator::new(planner, narrator, persona());
    let engine = SceneEngine::new(store, generator, settings);
    engine
        .init_scene("chat", Some("u1"), "卧室", "睡裙", "安静的夜晚")
        .await
        .expect("init scene");
    engine
}

#[tokio::test]
async fn dual_mode_turn_persists_everything() {
    let planner_response = r#"```json
{"地点变化": false, "新地点": "", "着装变化": false, "新着装": "",
 "角色状态更新": {"pleasure_value": 10}}
```"#;
    let reply_response = r#"{"地点": "卧室", "着装": "睡裙", "场景": "她轻轻靠了过来。\\n\\n月光洒在床边。"}"#;

    let engine = engine_with(
        Scripted::new(vec![Ok(planner_response.to_string())]),
        Scripted::new(vec![Ok(reply_response.to_string())]),
        Settings::default(),
    )
    .await;

    let outcome = engine
        .handle_turn("chat", Some("u1"), "轻轻拥抱了她")
        .await
        .expect("turn");

    assert_eq!(outcome.scene_type, SceneType::Romantic);
    assert_eq!(outcome.final_status.pleasure_value, 10);
    assert_eq!(outcome.original_status.pleasure_value, 0);
    // Escaped newlines are unescaped for display.
    assert!(outcome.reply_text.contains("她轻轻靠了过来。\n\n月光洒在床边。"));
    assert!(outcome.reply_text.contains("📍 卧室"));
    assert!(outcome.image_path.is_none());

    let store = engine.store();
    let state = store
        .get_scene_state("chat:u1")
        .await
        .expect("get")
        .expect("row");
    assert_eq!(state.scene_description, "她轻轻靠了过来。\\n\\n月光洒在床边。");
    assert_eq!(state.last_activity, "轻轻拥抱了她");

    let history = store.get_recent_history("chat:u1", 5).await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].user_message, "轻轻拥抱了她");
}

#[tokio::test]
async fn planner_failure_still_produces_a_reply() {
    let reply_response = r#"{"地点": "卧室", "着装": "睡裙", "场景": "她微微一笑。"}"#;

    let engine = engine_with(
        Scripted::new(vec![Err(AIError::Timeout)]),
        Scripted::new(vec![Ok(reply_response.to_string())]),
        Settings::default(),
    )
    .await;

    let outcome = engine
        .handle_turn("chat", Some("u1"), "你好呀")
        .await
        .expect("turn");

    assert_eq!(outcome.scene_type, SceneType::Normal);
    // No-change decision plus zero pleasure means nothing to decay.
    assert_eq!(outcome.final_status.pleasure_value, 0);
    assert!(outcome.decision.updates.is_empty());
}

#[tokio::test]
async fn narrator_failure_persists_nothing() {
    let planner_response = r#"{"地点变化": false, "新地点": "", "着装变化": false, "新着装": "",
 "角色状态更新": {"pleasure_value": 10}}"#;

    let engine = engine_with(
        Scripted::new(vec![Ok(planner_response.to_string())]),
        Scripted::new(vec![Err(AIError::Completion("boom".to_string()))]),
        Settings::default(),
    )
    .await;

    let result = engine.handle_turn("chat", Some("u1"), "轻轻拥抱了她").await;
    assert!(matches!(result, Err(SceneError::AI(_))));

    let store = engine.store();
    let state = store
        .get_scene_state("chat:u1")
        .await
        .expect("get")
        .expect("row");
    assert_eq!(state.scene_description, "安静的夜晚");
    let status = store.get_status("chat:u1").await.expect("get").expect("row");
    assert_eq!(status.pleasure_value, 0);
    assert!(store.get_recent_history("chat:u1", 5).await.expect("history").is_empty());
}

#[tokio::test]
async fn turn_without_enabled_scene_is_rejected() {
    let engine = engine_with(
        Scripted::new(vec![]),
        Scripted::new(vec![]),
        Settings::default(),
    )
    .await;
    engine.disable_scene("chat", Some("u1")).await.expect("disable");

    let result = engine.handle_turn("chat", Some("u1"), "在吗").await;
    assert!(matches!(result, Err(SceneError::SceneNotEnabled)));
}

#[tokio::test]
async fn single_model_mode_runs_the_same_pipeline() {
    let response = r#"{"地点变化": true, "新地点": "阳台", "着装变化": false, "新着装": "",
 "角色状态更新": {"pleasure_value": 10},
 "地点": "阳台", "着装": "睡裙", "场景": "夜风拂面。"}"#;

    let settings = Settings {
        model_mode: ModelMode::Single,
        ..Settings::default()
    };
    let engine = engine_with(
        Scripted::new(vec![]),
        Scripted::new(vec![Ok(response.to_string())]),
        settings,
    )
    .await;

    let outcome = engine
        .handle_turn("chat", Some("u1"), "我们去阳台拥抱吧")
        .await
        .expect("turn");

    assert!(outcome.decision.location_changed);
    assert_eq!(outcome.final_status.pleasure_value, 10);

    let state = engine
        .store()
        .get_scene_state("chat:u1")
        .await
        .expect("get")
        .expect("row");
    assert_eq!(state.location, "阳台");
    assert_eq!(state.last_activity, "移动到阳台");
}

#[tokio::test]
async fn reset_status_restores_defaults() {
    let engine = engine_with(
        Scripted::new(vec![]),
        Scripted::new(vec![]),
        Settings::default(),
    )
    .await;

    let store = engine.store();
    let updates = StatusUpdates {
        corruption_delta: Some(40),
        ..StatusUpdates::default()
    };
    store.merge_status("chat:u1", &updates).await.expect("merge");

    engine.reset_status("chat", Some("u1")).await.expect("reset");
    let status = store.get_status("chat:u1").await.expect("get").expect("row");
    assert_eq!(status.corruption_level, 0);
    assert_eq!(status.physiological_state, "呼吸平稳");
}
