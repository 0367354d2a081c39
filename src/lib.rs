pub mod ai;
pub mod context;
pub mod decision;
pub mod engine;
pub mod error;
pub mod formatter;
pub mod generator;
pub mod logging;
pub mod nai;
pub mod rig;
pub mod scene_type;
pub mod settings;
pub mod state_manager;
pub mod status;
pub mod store;
pub mod utils;

// Re-export commonly used items for easier access
pub use ai::Completion;
pub use decision::{StateDecision, StatusUpdates};
pub use engine::{SceneEngine, TurnOutcome};
pub use error::{AIError, ImageError, SceneError, StoreError};
pub use generator::{SceneGenerator, SceneReply, TurnContext};
pub use scene_type::SceneType;
pub use settings::Settings;
pub use status::CharacterStatus;
pub use store::{HistoryEntry, SceneState, SceneStore};
