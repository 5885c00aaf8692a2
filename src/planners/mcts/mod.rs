mod planner;
mod tree;

pub use planner::{MctsPlanner, SearchOutcome, valid_actions};
pub use tree::{Edge, Node, NodeId, SearchTree};
