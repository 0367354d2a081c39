use serde_json::Value;

use crate::ai::Completion;
use crate::decision::{
    KEY_CLOTHING, KEY_IMAGE_PROMPT, KEY_LOCATION, KEY_SCENE, KEY_SUGGEST_IMAGE, StateDecision,
    normalize_planner_decision,
};
use crate::error::SceneError;
use crate::formatter::build_status_summary;
use crate::scene_type::SceneType;
use crate::settings::BotPersona;
use crate::status::CharacterStatus;
use crate::utils::{normalize_scene_field, parse_json_response};

/// What the narrator produced for one turn.
#[derive(Debug, Clone, Default)]
pub struct SceneReply {
    pub location: String,
    pub clothing: String,
    pub scene: String,
    pub suggest_image: Option<bool>,
    pub image_prompt: String,
}

/// Everything the generator needs to know about the current turn.
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    pub user_message: String,
    pub location: String,
    pub clothing: String,
    pub last_scene: String,
    pub context_block: String,
}

/// Drives the LLM side of a turn: the planner judges state changes, the
/// narrator writes the scene. In single-model mode the narrator does both.
pub struct SceneGenerator<P: Completion, R: Completion> {
    planner: P,
    narrator: R,
    persona: BotPersona,
}

impl<P: Completion, R: Completion> SceneGenerator<P, R> {
    pub fn new(planner: P, narrator: R, persona: BotPersona) -> Self {
        SceneGenerator {
            planner,
            narrator,
            persona,
        }
    }

    /// Asks the planner which states change this turn. Never fails: any call
    /// or parse failure degrades to the no-change decision.
    pub async fn plan_state_changes(
        &self,
        turn: &TurnContext,
        status: &CharacterStatus,
        scene_type: SceneType,
    ) -> StateDecision {
        let status_summary = build_status_summary(status, false);
        let prompt = self.build_planner_prompt(turn, &status_summary, scene_type);

        log::debug!("[Planner] Prompt:\n{}", prompt);
        let response = match self.planner.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                log::error!("[Planner] State judgment failed: {}", e);
                return StateDecision::no_change();
            }
        };
        log::debug!("[Planner] Response:\n{}", response);

        let Some(raw) = parse_json_response(&response) else {
            log::error!("[Planner] Unparseable response, using no-change decision");
            return StateDecision::no_change();
        };
        normalize_planner_decision(&raw)
    }

    /// Asks the narrator for the scene text. The reply must carry location,
    /// clothing and scene; a model output that contradicts the decision's
    /// location or clothing wins and the decision is rewritten to match.
    pub async fn generate_scene_reply(
        &self,
        turn: &TurnContext,
        status: &CharacterStatus,
        decision: &mut StateDecision,
    ) -> Result<SceneReply, SceneError> {
        let mut final_location = if decision.location_changed && !decision.new_location.is_empty()
        {
            decision.new_location.clone()
        } else {
            turn.location.clone()
        };
        let mut final_clothing = if decision.clothing_changed && !decision.new_clothing.is_empty()
        {
            decision.new_clothing.clone()
        } else {
            turn.clothing.clone()
        };

        let location_instruction = if decision.location_changed && !decision.new_location.is_empty()
        {
            format!("地点已更新为：{final_location}")
        } else {
            format!("地点保持不变：{final_location}")
        };
        let clothing_instruction = if decision.clothing_changed && !decision.new_clothing.is_empty()
        {
            format!("着装已更新为：{final_clothing}")
        } else {
            format!("着装保持不变：{final_clothing}")
        };

        let status_summary = build_status_summary(status, false);
        let prompt = self.build_reply_prompt(
            turn,
            &location_instruction,
            &clothing_instruction,
            &final_location,
            &final_clothing,
            &status_summary,
        );

        log::debug!("[Reply] Prompt:\n{}", prompt);
        let response = self.narrator.complete(&prompt).await?;
        log::debug!("[Reply] Response:\n{}", response);

        let Some(reply_data) = parse_json_response(&response) else {
            return Err(SceneError::GenerationFailed(
                "narrator output is not parseable JSON".to_string(),
            ));
        };

        for field in [KEY_LOCATION, KEY_CLOTHING, KEY_SCENE] {
            if reply_data.get(field).is_none() {
                return Err(SceneError::GenerationFailed(format!(
                    "narrator output missing field {field}"
                )));
            }
        }

        let reply_location = normalize_scene_field(text_field(&reply_data, KEY_LOCATION));
        let reply_clothing = normalize_scene_field(text_field(&reply_data, KEY_CLOTHING));
        final_location = normalize_scene_field(&final_location);
        final_clothing = normalize_scene_field(&final_clothing);

        if !reply_location.is_empty() && reply_location != final_location {
            log::info!("[Reply] Model location differs from decision, adopting model output");
            final_location = reply_location;
            decision.location_changed = true;
            decision.new_location = final_location.clone();
        }
        if !reply_clothing.is_empty() && reply_clothing != final_clothing {
            log::info!("[Reply] Model clothing differs from decision, adopting model output");
            final_clothing = reply_clothing;
            decision.clothing_changed = true;
            decision.new_clothing = final_clothing.clone();
        }

        Ok(SceneReply {
            location: final_location,
            clothing: final_clothing,
            scene: text_field(&reply_data, KEY_SCENE).to_string(),
            suggest_image: image_verdict(&reply_data),
            image_prompt: text_field(&reply_data, KEY_IMAGE_PROMPT).trim().to_string(),
        })
    }

    /// Single-model mode: one call judges state and writes the scene.
    pub async fn single_model_generate(
        &self,
        turn: &TurnContext,
        status: &CharacterStatus,
        scene_type: SceneType,
    ) -> Result<(StateDecision, SceneReply), SceneError> {
        let status_summary = build_status_summary(status, true);
        let prompt = self.build_single_model_prompt(turn, &status_summary, scene_type);

        log::debug!("[SingleModel] Prompt:\n{}", prompt);
        let response = self.narrator.complete(&prompt).await?;
        log::debug!("[SingleModel] Response:\n{}", response);

        let Some(raw) = parse_json_response(&response) else {
            return Err(SceneError::GenerationFailed(
                "single-model output is not parseable JSON".to_string(),
            ));
        };

        let decision = normalize_planner_decision(&raw);

        let final_location = if decision.location_changed && !decision.new_location.is_empty() {
            decision.new_location.clone()
        } else {
            let from_reply = normalize_scene_field(text_field(&raw, KEY_LOCATION));
            if from_reply.is_empty() {
                turn.location.clone()
            } else {
                from_reply
            }
        };
        let final_clothing = if decision.clothing_changed && !decision.new_clothing.is_empty() {
            decision.new_clothing.clone()
        } else {
            let from_reply = normalize_scene_field(text_field(&raw, KEY_CLOTHING));
            if from_reply.is_empty() {
                turn.clothing.clone()
            } else {
                from_reply
            }
        };

        let scene = text_field(&raw, KEY_SCENE).to_string();
        if scene.is_empty() {
            return Err(SceneError::GenerationFailed(
                "single-model output carries an empty scene".to_string(),
            ));
        }

        let reply = SceneReply {
            location: final_location,
            clothing: final_clothing,
            scene,
            suggest_image: image_verdict(&raw),
            image_prompt: text_field(&raw, KEY_IMAGE_PROMPT).trim().to_string(),
        };
        Ok((decision, reply))
    }

    fn build_planner_prompt(
        &self,
        turn: &TurnContext,
        status_summary: &str,
        scene_type: SceneType,
    ) -> String {
        let context = if turn.context_block.is_empty() {
            "【最近场景对话】暂无历史记录"
        } else {
            &turn.context_block
        };
        format!(
            r#"【你的身份】
你是 {name}

【性格特质与身份】
{personality}

【回复风格】
{reply_style}

【当前场景状态】
地点：{location}
着装：{clothing}
上次场景：{last_scene}

【当前角色状态】
{status_summary}

{context}

【用户消息】
{user_message}
{guidance}

【任务】
根据用户消息和场景类型，判断哪些状态需要改变。

【核心判断原则】
1. 真实性：符合真实的生理和心理反应
2. 渐进性：状态变化要渐进，不要突然跳跃
3. 场景匹配：根据场景强度合理判断数值变化
4. 有互动就有反应：不要过度保守，但也不要过度敏感

【状态字段说明】
- pleasure_value: 快感值增量，单次上限60
- vaginal_wetness: "正常"→"微湿"→"湿润"→"淫湿"→"爱液横流"
- vaginal_state: "放松"/"轻微收缩"/"无意识收缩"/"紧绷"/"痉挛"
- physiological_state: 生理状态描述
- corruption_level: 污染度增量，仅腐化事件时增加，上限20
- semen_volume: 体内精液增量(ml)
- anal_development: 后穴开发度增量，上限20

【输出格式】
严格按照JSON格式输出：

```json
{{
  "地点变化": false,
  "新地点": "",
  "着装变化": false,
  "新着装": "",
  "角色状态更新": {{}}
}}
```

【重要提醒】
- 普通日常对话 → "角色状态更新" 必须为 {{}}
- 数值字段输出增量，不是最终值"#,
            name = self.persona.name,
            personality = self.persona.personality,
            reply_style = self.persona.reply_style,
            location = turn.location,
            clothing = turn.clothing,
            last_scene = turn.last_scene,
            user_message = turn.user_message,
            guidance = scene_type_guidance(scene_type),
        )
    }

    fn build_reply_prompt(
        &self,
        turn: &TurnContext,
        location_instruction: &str,
        clothing_instruction: &str,
        final_location: &str,
        final_clothing: &str,
        status_summary: &str,
    ) -> String {
        let context = if turn.context_block.is_empty() {
            "暂无历史记录"
        } else {
            &turn.context_block
        };
        format!(
            r#"=== 创作任务 ===

【要创作的角色】
角色名：{name}

【角色性格特质】
{personality}

【角色回复风格】
{reply_style}

【当前场景状态】
{location_instruction}
{clothing_instruction}

【角色身体/心理状态】（创作时必须体现这些状态）
{status_summary}

【历史对话】
{context}

【用户消息】
{user_message}

【任务】
根据以上信息，生成完整的小说化场景回复。

**重要提醒**：
- 你的回复内容必须符合当前角色状态！
- 如果快感值较高，描写中要体现身体的敏感和反应
- 回复的语气、动作、心理描写都要与状态一致

1. 地点：{final_location}
2. 着装：{final_clothing}
3. 场景：创作一段小说化的场景描写

{image_rules}

【输出格式】
严格按照JSON格式输出：

```json
{{
  "地点": "{final_location}",
  "着装": "{final_clothing}",
  "场景": "第一段场景描写\\n\\n第二段场景描写",
  "建议配图": false,
  "nai_prompt": ""
}}
```"#,
            name = self.persona.name,
            personality = self.persona.personality,
            reply_style = self.persona.reply_style,
            user_message = turn.user_message,
            image_rules = IMAGE_GUIDANCE,
        )
    }

    fn build_single_model_prompt(
        &self,
        turn: &TurnContext,
        status_summary: &str,
        scene_type: SceneType,
    ) -> String {
        let context = if turn.context_block.is_empty() {
            "暂无历史记录"
        } else {
            &turn.context_block
        };
        format!(
            r#"=== 创作任务 ===

【要创作的角色】
角色名：{name}

【角色性格特质】
{personality}

【角色回复风格】
{reply_style}

【当前场景状态】
地点：{location}
着装：{clothing}

【角色身体/心理状态】（创作时必须体现这些状态）
{status_summary}

【历史对话】
{context}

【用户消息】
{user_message}

{detail}

【任务】
同时完成三件事：
1. 判断状态变化（地点、着装、角色状态）
2. 生成小说化的场景描写
3. 判断是否需要配图

【状态字段说明】
- pleasure_value: 快感值增量，单次上限60
- vaginal_wetness: "正常"→"微湿"→"湿润"→"淫湿"→"爱液横流"
- vaginal_state: "放松"/"轻微收缩"/"无意识收缩"/"紧绷"/"痉挛"
- physiological_state: 生理状态描述
- corruption_level: 污染度增量，仅腐化事件时增加，上限20
- semen_volume: 体内精液增量(ml)
- anal_development: 后穴开发度增量，上限20

**重要提醒**：
- 普通对话时角色状态更新必须为空 {{}}
- 状态变化要与场景描写一致

{image_rules}

【输出格式】严格JSON：
```json
{{
  "地点变化": false,
  "新地点": "",
  "着装变化": false,
  "新着装": "",
  "角色状态更新": {{}},
  "地点": "{location}",
  "着装": "{clothing}",
  "场景": "场景描写内容...",
  "建议配图": false,
  "nai_prompt": ""
}}
```"#,
            name = self.persona.name,
            personality = self.persona.personality,
            reply_style = self.persona.reply_style,
            location = turn.location,
            clothing = turn.clothing,
            user_message = turn.user_message,
            detail = scene_type_detail(scene_type),
            image_rules = IMAGE_GUIDANCE,
        )
    }
}

const IMAGE_GUIDANCE: &str = r#"【智能配图】
判断标准：这个场景画成图，和之前会有明显不同吗？
✅ 需要配图：
  - 姿势/动作变化（站→坐→躺、拥抱、亲吻等）
  - 表情明显变化（脸红、害羞、沉醉、高潮表情）
  - 服装状态变化（脱衣、衣衫不整、换装）
  - 新环境首次出现
  - 身体反应明显（颤抖、出汗、潮红）
❌ 不需要配图：
  - 纯对话（只有说话，没有动作）
  - 内心独白/心理描写
  - 和上一个场景画面差不多
  - 过渡性描写

nai_prompt 要求（建议配图=true时必填）：
  * 英文短语，逗号分隔
  * 必须包含：人数(1girl)、具体姿势、表情、当前服装状态、环境
  * 根据角色状态：快感高→flushed/panting/trembling/ahegao，出汗→sweating
  * 不加质量词"#;

fn scene_type_guidance(scene_type: SceneType) -> &'static str {
    match scene_type {
        SceneType::Romantic => {
            r#"
【系统识别场景类型：浪漫互动】
建议快感值变化范围：+5~20
湿润度可能从"正常"变为"微湿"
生理状态应体现温馨、心跳加速等"#
        }
        SceneType::Intimate => {
            r#"
【系统识别场景类型：亲密接触】
建议快感值变化范围：+15~40
湿润度应有明显提升
生理状态应体现身体反应"#
        }
        SceneType::Explicit => {
            r#"
【系统识别场景类型：明确性行为】
建议快感值变化范围：+30~60
湿润度、阴道状态等应有显著变化
需要综合更新多项状态"#
        }
        SceneType::Rest => {
            r#"
【系统识别场景类型：休息恢复】
状态应趋于平静和恢复
快感值不应增加"#
        }
        SceneType::Normal => {
            r#"
【系统识别场景类型：普通对话】
除非对话内容涉及心理唤起，否则角色状态更新应为空 {}"#
        }
    }
}

fn scene_type_detail(scene_type: SceneType) -> &'static str {
    match scene_type {
        SceneType::Romantic => {
            r#"【系统识别：浪漫互动场景】
建议快感值+5~20，湿润度可能变为"微湿"，生理状态体现温馨感"#
        }
        SceneType::Intimate => {
            r#"【系统识别：亲密接触场景】
建议快感值+15~40，湿润度应提升，生理状态体现身体反应"#
        }
        SceneType::Explicit => {
            r#"【系统识别：明确性行为场景】
建议快感值+30~60，多项状态应有显著变化"#
        }
        SceneType::Rest => {
            r#"【系统识别：休息恢复场景】
状态应趋于平静，快感值不应增加"#
        }
        SceneType::Normal => {
            r#"【系统识别：普通对话场景】
除非涉及心理唤起，否则角色状态更新应为空"#
        }
    }
}

fn text_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

// Tristate: the model may omit the verdict entirely, which later falls back
// to the probability trigger.
fn image_verdict(value: &Value) -> Option<bool> {
    value
        .get(KEY_SUGGEST_IMAGE)
        .filter(|v| !v.is_null())
        .map(crate::decision::coerce_bool)
}
