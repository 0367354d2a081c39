use std::future::Future;

use crate::error::AIError;

/// Seam between the engine and whatever produces model text. Production code
/// wraps rig agents; tests plug in scripted responders.
pub trait Completion: Send + Sync {
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String, AIError>> + Send;
}
