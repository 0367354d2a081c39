use rig::client::{CompletionClient, ProviderClient};

use super::{ModelAgent, NARRATOR_PREAMBLE};
use crate::settings::LlmSettings;

/// Scene-writing agent. In single-model mode this agent also carries the
/// state judgment.
pub fn build_narrator(settings: &LlmSettings) -> ModelAgent {
    let openai_client = rig::providers::openai::Client::from_env();

    let agent = openai_client
        .agent(&settings.model)
        .preamble(NARRATOR_PREAMBLE)
        .temperature(settings.temperature)
        .max_tokens(settings.max_tokens)
        .build();

    ModelAgent::new(agent, "Narrator", settings)
}
