use rig::client::{CompletionClient, ProviderClient};

use super::{ModelAgent, PLANNER_PREAMBLE};
use crate::settings::LlmSettings;

/// State-judgment agent. Low temperature keeps the JSON verdicts stable.
pub fn build_planner(settings: &LlmSettings) -> ModelAgent {
    let openai_client = rig::providers::openai::Client::from_env();

    let agent = openai_client
        .agent(&settings.model)
        .preamble(PLANNER_PREAMBLE)
        .temperature(settings.temperature)
        .max_tokens(settings.max_tokens)
        .build();

    ModelAgent::new(agent, "Planner", settings)
}
