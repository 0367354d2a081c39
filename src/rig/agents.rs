use std::time::Duration;

use rig::{agent::Agent, completion::Prompt, providers::openai::CompletionModel};

use crate::ai::Completion;
use crate::error::AIError;
use crate::settings::LlmSettings;

pub const PLANNER_PREAMBLE: &str = r#"
你是一个角色扮演场景的状态判断助手。你的输出永远不会展示给用户。

你的职责：
1. 阅读当前场景状态、角色状态和用户消息。
2. 判断本轮互动会引起哪些状态变化（地点、着装、角色身体状态）。
3. 严格按照任务中给出的 JSON 格式输出，不输出任何多余文字。

判断原则：
- 真实性：符合真实的生理和心理反应。
- 渐进性：状态变化要渐进，不要突然跳跃。
- 数值字段永远输出增量，不是最终值。
- 普通日常对话时，角色状态更新必须为空对象。
"#;

pub const NARRATOR_PREAMBLE: &str = r#"
你是一个小说化角色扮演场景的创作者。

你的职责：
1. 以指定角色的身份，根据当前场景状态和角色身体/心理状态进行创作。
2. 场景描写要与角色状态一致：快感值高时体现身体的敏感和反应。
3. 严格按照任务中给出的 JSON 格式输出，场景文本放在"场景"字段中。

创作要求：
- 第三人称小说化描写，分段输出。
- 语气、动作、心理描写都要与状态一致。
- 不要输出 JSON 以外的任何内容。
"#;

/// A rig agent plus the retry policy from settings. Both the planner and the
/// narrator are instances of this.
pub struct ModelAgent {
    agent: Agent<CompletionModel>,
    label: &'static str,
    timeout: Duration,
    max_retries: u32,
    retry_interval: Duration,
}

impl ModelAgent {
    pub fn new(agent: Agent<CompletionModel>, label: &'static str, settings: &LlmSettings) -> Self {
        ModelAgent {
            agent,
            label,
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries.max(1),
            retry_interval: Duration::from_millis(settings.retry_interval_ms),
        }
    }

    async fn prompt_once(&self, prompt: &str) -> Result<String, AIError> {
        match tokio::time::timeout(self.timeout, self.agent.prompt(prompt)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(AIError::Completion(e.to_string())),
            Err(_) => Err(AIError::Timeout),
        }
    }
}

impl Completion for ModelAgent {
    async fn complete(&self, prompt: &str) -> Result<String, AIError> {
        let mut last_error = AIError::Completion("no attempts made".to_string());
        for attempt in 1..=self.max_retries {
            match self.prompt_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    log::warn!(
                        "[{}] Completion failed (attempt {}/{}): {}",
                        self.label,
                        attempt,
                        self.max_retries,
                        e
                    );
                    last_error = e;
                }
            }
            if attempt < self.max_retries {
                tokio::time::sleep(self.retry_interval).await;
            }
        }
        Err(last_error)
    }
}
