use std::path::PathBuf;

use rand::Rng;

use crate::ai::Completion;
use crate::context::{ContextBuilder, ContextKind};
use crate::decision::StateDecision;
use crate::error::SceneError;
use crate::formatter::{format_status_bar, format_status_changes};
use crate::generator::{SceneGenerator, SceneReply, TurnContext};
use crate::nai::NaiClient;
use crate::scene_type::{SceneType, classify};
use crate::settings::{ModelMode, Settings, StatusBarPosition};
use crate::state_manager::{
    apply_scene_decay, apply_state_updates_preview, apply_time_decay, ensure_status_consistency,
    validate_state_decision,
};
use crate::status::CharacterStatus;
use crate::store::{HistoryEntry, SceneState, SceneStore, SceneStateUpdate};
use crate::utils::{build_session_id, collapse_text, truncate_text, unescape_scene_text};

/// Everything one processed turn produced.
#[derive(Debug)]
pub struct TurnOutcome {
    /// Fully formatted reply, ready for the host to send.
    pub reply_text: String,
    pub scene_type: SceneType,
    pub decision: StateDecision,
    pub original_status: CharacterStatus,
    pub final_status: CharacterStatus,
    pub image_path: Option<PathBuf>,
}

/// Orchestrates a full scene turn: scene-type detection, decay, the LLM
/// calls, state persistence and reply formatting. The host bot framework
/// calls into this and handles message transport itself.
pub struct SceneEngine<P: Completion, R: Completion> {
    store: SceneStore,
    generator: SceneGenerator<P, R>,
    context: ContextBuilder,
    nai: Option<NaiClient>,
    settings: Settings,
}

impl<P: Completion, R: Completion> SceneEngine<P, R> {
    pub fn new(store: SceneStore, generator: SceneGenerator<P, R>, settings: Settings) -> Self {
        let context = ContextBuilder::new(store.clone());
        let nai = if settings.nai.api_key.is_empty() {
            None
        } else {
            Some(NaiClient::new(settings.nai.clone()))
        };
        SceneEngine {
            store,
            generator,
            context,
            nai,
            settings,
        }
    }

    /// Processes one user message in an active scene. Fails with
    /// `SceneNotEnabled` when no enabled scene exists for the session;
    /// nothing is persisted unless the whole turn succeeds.
    pub async fn handle_turn(
        &self,
        chat_id: &str,
        user_id: Option<&str>,
        user_message: &str,
    ) -> Result<TurnOutcome, SceneError> {
        let session_id = build_session_id(chat_id, user_id);

        let state = self
            .store
            .get_scene_state(&session_id)
            .await?
            .filter(|s| s.enabled)
            .ok_or(SceneError::SceneNotEnabled)?;

        self.store.init_status_if_absent(&session_id).await?;
        let mut status = self
            .store
            .get_status(&session_id)
            .await?
            .unwrap_or_default();

        let scene_type = classify(user_message, &state.scene_description);
        log::info!("[Engine] Scene type detected: {}", scene_type);

        if apply_time_decay(&self.store, &session_id, &state, &status).await? {
            status = self
                .store
                .get_status(&session_id)
                .await?
                .unwrap_or_default();
        }
        let original_status = status.clone();

        let turn = TurnContext {
            user_message: user_message.to_string(),
            location: state.location.clone(),
            clothing: state.clothing.clone(),
            last_scene: state.scene_description.clone(),
            context_block: String::new(),
        };

        let (decision, reply) = match self.settings.model_mode {
            ModelMode::Single => {
                let mut turn = turn;
                turn.context_block = self
                    .context
                    .build_context_block(
                        &session_id,
                        ContextKind::Reply,
                        self.settings.context.reply_messages,
                    )
                    .await?;

                let (mut decision, reply) = self
                    .generator
                    .single_model_generate(&turn, &status, scene_type)
                    .await?;

                validate_state_decision(&mut decision, &status);
                apply_scene_decay(&mut decision, scene_type, &status);
                ensure_status_consistency(&mut decision, &status, scene_type);
                (decision, reply)
            }
            ModelMode::Dual => {
                let mut planner_turn = turn.clone();
                planner_turn.context_block = self
                    .context
                    .build_context_block(
                        &session_id,
                        ContextKind::Planner,
                        self.settings.context.planner_messages,
                    )
                    .await?;

                let mut decision = self
                    .generator
                    .plan_state_changes(&planner_turn, &status, scene_type)
                    .await;

                validate_state_decision(&mut decision, &status);
                apply_scene_decay(&mut decision, scene_type, &status);
                ensure_status_consistency(&mut decision, &status, scene_type);

                // The narrator writes against the post-merge state.
                let preview = apply_state_updates_preview(&status, &decision);

                let mut reply_turn = turn;
                reply_turn.context_block = self
                    .context
                    .build_context_block(
                        &session_id,
                        ContextKind::Reply,
                        self.settings.context.reply_messages,
                    )
                    .await?;

                let reply = self
                    .generator
                    .generate_scene_reply(&reply_turn, &preview, &mut decision)
                    .await?;
                (decision, reply)
            }
        };

        let activity = derive_last_activity(user_message, &decision, &reply);
        self.store
            .update_scene_state(
                &session_id,
                SceneStateUpdate {
                    location: Some(reply.location.clone()),
                    clothing: Some(reply.clothing.clone()),
                    scene_description: Some(reply.scene.clone()),
                    last_activity: Some(activity),
                },
            )
            .await?;
        self.store.merge_status(&session_id, &decision.updates).await?;

        let final_status = self
            .store
            .get_status(&session_id)
            .await?
            .unwrap_or_default();

        self.store
            .add_history(
                &session_id,
                HistoryEntry {
                    timestamp: String::new(),
                    location: reply.location.clone(),
                    clothing: reply.clothing.clone(),
                    scene_description: reply.scene.clone(),
                    user_message: user_message.to_string(),
                    bot_reply: reply.scene.clone(),
                },
            )
            .await?;

        let reply_text = self.format_reply(&reply, &original_status, &final_status);
        let image_path = self.maybe_generate_image(&session_id, &reply).await;

        log::info!("[Engine] Turn completed for scene type {}", scene_type);
        Ok(TurnOutcome {
            reply_text,
            scene_type,
            decision,
            original_status,
            final_status,
            image_path,
        })
    }

    fn format_reply(
        &self,
        reply: &SceneReply,
        original: &CharacterStatus,
        updated: &CharacterStatus,
    ) -> String {
        let scene_text = unescape_scene_text(&reply.scene);
        let mut formatted = format!(
            "┌─────────────────────┐\n│ 📍 {}\n│ 👗 {}\n└─────────────────────┘\n\n{}",
            reply.location, reply.clothing, scene_text
        );

        let mut status_block_parts = Vec::new();
        if self.settings.status_changes.enabled {
            let changes =
                format_status_changes(original, updated, self.settings.status_changes.format);
            if !changes.is_empty() {
                status_block_parts.push(changes);
            }
        }
        if self.settings.status_bar.enabled {
            let bar = format_status_bar(
                updated,
                self.settings.status_bar.display_mode,
                self.settings.status_bar.use_progress_bar,
            );
            if !bar.is_empty() {
                status_block_parts.push(bar);
            }
        }

        if !status_block_parts.is_empty() {
            let block = status_block_parts.join("\n");
            formatted = match self.settings.status_bar.position {
                StatusBarPosition::Top => format!("{block}\n\n{formatted}"),
                StatusBarPosition::Bottom => format!("{formatted}\n\n{block}"),
            };
        }

        formatted
    }

    /// Image generation never fails the turn. The model's verdict wins when
    /// present; otherwise a probability roll decides, with a minimal default
    /// prompt built from the scene.
    async fn maybe_generate_image(&self, session_id: &str, reply: &SceneReply) -> Option<PathBuf> {
        let nai = self.nai.as_ref()?;

        match self.store.get_nai_enabled(session_id).await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                log::warn!("[NAI] Could not read image preference: {}", e);
                return None;
            }
        }

        let mut prompt = reply.image_prompt.clone();
        match reply.suggest_image {
            Some(false) => {
                log::debug!("[NAI] Model declined an image, skipping");
                return None;
            }
            Some(true) => {
                if prompt.is_empty() {
                    log::warn!("[NAI] Image suggested without a prompt, skipping");
                    return None;
                }
                log::info!("[NAI] Model-suggested image, prompt: {}", truncate_text(&prompt, 100));
            }
            None => {
                let probability = self.settings.nai.trigger_probability.clamp(0.0, 1.0);
                if rand::rng().random_range(0.0..1.0) > probability {
                    log::debug!("[NAI] Probability roll missed, skipping image");
                    return None;
                }
                log::info!("[NAI] Probability fallback triggered ({:.0}%)", probability * 100.0);
                if prompt.is_empty() {
                    prompt = format!("1girl, {}, {}", reply.location, reply.clothing);
                }
            }
        }

        match nai.generate_image(&prompt).await {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("[NAI] Image generation failed: {}", e);
                None
            }
        }
    }

    // ---- scene lifecycle ----

    /// Starts (or restarts) a scene with the given opening state.
    pub async fn init_scene(
        &self,
        chat_id: &str,
        user_id: Option<&str>,
        location: &str,
        clothing: &str,
        scene_description: &str,
    ) -> Result<(), SceneError> {
        let session_id = build_session_id(chat_id, user_id);
        self.store
            .create_scene_state(&SceneState {
                chat_id: session_id.clone(),
                enabled: true,
                location: location.to_string(),
                clothing: clothing.to_string(),
                scene_description: scene_description.to_string(),
                last_activity: "场景初始化".to_string(),
                user_id: user_id.unwrap_or_default().to_string(),
                ..SceneState::default()
            })
            .await?;
        self.store.init_status_if_absent(&session_id).await?;
        log::info!("[Engine] Scene initialized");
        Ok(())
    }

    pub async fn enable_scene(
        &self,
        chat_id: &str,
        user_id: Option<&str>,
    ) -> Result<(), SceneError> {
        let session_id = build_session_id(chat_id, user_id);
        self.store.enable_scene(&session_id).await?;
        Ok(())
    }

    /// Pauses the scene; state survives for a later re-enable.
    pub async fn disable_scene(
        &self,
        chat_id: &str,
        user_id: Option<&str>,
    ) -> Result<(), SceneError> {
        let session_id = build_session_id(chat_id, user_id);
        self.store.disable_scene(&session_id).await?;
        Ok(())
    }

    /// Drops the scene row entirely. Character status and the image
    /// preference are kept.
    pub async fn clear_scene(
        &self,
        chat_id: &str,
        user_id: Option<&str>,
    ) -> Result<(), SceneError> {
        let session_id = build_session_id(chat_id, user_id);
        self.store.clear_scene_state(&session_id).await?;
        Ok(())
    }

    /// Resets the character status back to defaults.
    pub async fn reset_status(
        &self,
        chat_id: &str,
        user_id: Option<&str>,
    ) -> Result<(), SceneError> {
        let session_id = build_session_id(chat_id, user_id);
        self.store.clear_status(&session_id).await?;
        self.store.init_status_if_absent(&session_id).await?;
        Ok(())
    }

    pub async fn set_image_generation(
        &self,
        chat_id: &str,
        user_id: Option<&str>,
        enabled: bool,
    ) -> Result<(), SceneError> {
        let session_id = build_session_id(chat_id, user_id);
        self.store.set_nai_enabled(&session_id, enabled).await?;
        Ok(())
    }

    pub fn store(&self) -> &SceneStore {
        &self.store
    }
}

/// Short label for what just happened, stored on the scene row. Location and
/// clothing changes outrank the raw message.
fn derive_last_activity(
    user_message: &str,
    decision: &StateDecision,
    reply: &SceneReply,
) -> String {
    if decision.location_changed {
        return if reply.location.is_empty() {
            "地点变更".to_string()
        } else {
            format!("移动到{}", reply.location)
        };
    }
    if decision.clothing_changed {
        return if reply.clothing.is_empty() {
            "更换着装".to_string()
        } else {
            format!("换装为{}", reply.clothing)
        };
    }

    let condensed = collapse_text(user_message);
    if !condensed.is_empty() {
        return truncate_text(&condensed, 40);
    }

    let excerpt = collapse_text(&reply.scene);
    if !excerpt.is_empty() {
        return truncate_text(&excerpt, 40);
    }

    "场景更新".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_activity_prefers_location_change() {
        let mut decision = StateDecision::no_change();
        decision.location_changed = true;
        let reply = SceneReply {
            location: "阳台".to_string(),
            ..SceneReply::default()
        };
        assert_eq!(derive_last_activity("随便说点什么", &decision, &reply), "移动到阳台");
    }

    #[test]
    fn last_activity_falls_back_to_message_then_scene() {
        let decision = StateDecision::no_change();
        let reply = SceneReply {
            scene: "很长的场景描写".to_string(),
            ..SceneReply::default()
        };
        assert_eq!(
            derive_last_activity("  一起看电影  ", &decision, &reply),
            "一起看电影"
        );
        assert_eq!(derive_last_activity("", &decision, &reply), "很长的场景描写");

        let empty_reply = SceneReply::default();
        assert_eq!(derive_last_activity("", &decision, &empty_reply), "场景更新");
    }
}
