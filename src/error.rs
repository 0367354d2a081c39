use thiserror::Error;

// Enum for handling various engine-level errors.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("AI error: {:#}", 0)]
    AI(#[from] AIError), // Errors from the LLM transport.

    #[error("Store error: {:#}", 0)]
    Store(#[from] StoreError), // Errors from the durable scene/status store.

    #[error("Serialization error: {:#}", 0)]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {:#}", 0)]
    IO(#[from] std::io::Error),

    #[error("Scene mode is not enabled for this session")]
    SceneNotEnabled, // The host asked for a turn but no active scene exists.

    #[error("Scene reply generation failed: {:#}", 0)]
    GenerationFailed(String), // Narrative call produced nothing usable; no state was committed.
}

// Errors related to LLM calls are separated into their own enum so the
// generator can degrade gracefully (planner failure => default decision).
#[derive(Debug, Error)]
pub enum AIError {
    #[error("Completion failed: {:#}", 0)]
    Completion(String), // Transport-level failure after its own retries.

    #[error("Timeout occurred")]
    Timeout,

    #[error("Failed to parse model response: {:#}", 0)]
    ResponseParse(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {:#}", 0)]
    Sqlite(#[from] tokio_rusqlite::Error),

    #[error("Row decode error: {:#}", 0)]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("HTTP error: {:#}", 0)]
    Http(#[from] reqwest::Error),

    #[error("Image API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("No image data in response")]
    NoImageData,

    #[error("Image generation not configured")]
    NotConfigured, // Missing API token or disabled for the session.

    #[error("IO error: {:#}", 0)]
    IO(#[from] std::io::Error),
}
