//! Core data model types for catree

mod hash;
mod meta;
mod node;
mod path;

pub use hash::Hash;
pub use meta::TreeMeta;
pub use node::{NodeData, NodeKey};
pub use path::HashPath;
