mod agents;
mod narrator;
mod planner;

pub use agents::*;
pub use narrator::*;
pub use planner::*;
