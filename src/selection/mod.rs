mod path_index;
mod tree_model;

pub use path_index::{NodeState, PathIndex};
pub use tree_model::{Location, Node, NodeId, Selection, TreeError, TreeModel};
