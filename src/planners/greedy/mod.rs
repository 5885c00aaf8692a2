mod planner;

pub use planner::{Assignment, GreedyPlanner, Pinned};
