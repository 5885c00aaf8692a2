use crate::infra::Action;
use crate::state::State;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Statistics of one action taken from a node.
#[derive(Clone, Debug, Default)]
pub struct Edge {
    pub visits: u32,
    pub reward_sum: f64,
    /// Sampled successor states, at most `max_children`.
    pub children: Vec<NodeId>,
}

impl Edge {
    pub fn mean(&self) -> Option<f64> {
        (self.visits > 0).then(|| self.reward_sum / self.visits as f64)
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub state: State,
    /// Reward of the searching agent on the transition into this node.
    pub reward: f64,
    /// Rollouts performed before the node is expanded.
    pub rollouts: u32,
    pub visits: u32,
    pub edges: [Edge; Action::COUNT],
}

impl Node {
    fn new(state: State, reward: f64, rollouts: u32) -> Self {
        Self {
            state,
            reward,
            rollouts,
            visits: 0,
            edges: std::array::from_fn(|_| Edge::default()),
        }
    }

    pub fn edge(&self, action: Action) -> &Edge {
        &self.edges[action.index()]
    }
}

/// Arena of search nodes; children refer to each other by index.
#[derive(Clone, Debug)]
pub struct SearchTree {
    nodes: Vec<Node>,
}

impl SearchTree {
    pub const ROOT: NodeId = NodeId(0);

    /// Creates a tree whose root is expanded on the first visit.
    pub fn new(root: State, expand_threshold: u32) -> Self {
        Self {
            nodes: vec![Node::new(root, 0.0, expand_threshold)],
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Appends a successor of `parent` reached through `action`.
    pub fn add_child(&mut self, parent: NodeId, action: Action, state: State, reward: f64) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(state, reward, 0));
        self.nodes[parent.0].edges[action.index()].children.push(id);
        id
    }

    /// Records one backed-up return for `action` at `id`.
    pub fn record(&mut self, id: NodeId, action: Action, value: f64) {
        let node = &mut self.nodes[id.0];
        let edge = &mut node.edges[action.index()];
        edge.visits += 1;
        edge.reward_sum += value;
        node.visits += 1;
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
