//! The content-addressed Merkle tree
//!
//! A tree of fixed depth `D` holds up to `2^D` leaves, filled left to right.
//! Every internal node is stored under its own hash, so identical subtrees
//! are stored once and any committed root can be walked from the store.
//! Subtrees that are still entirely empty are never stored; their hashes are
//! taken from the policy's zero-subtree table.

mod config;
mod response;
#[allow(clippy::module_inception)]
mod tree;

pub use config::{TreeConfig, TreeMode};
pub use response::{AddDataResponse, CommitResponse, UpdateResponse};
pub use tree::ContentAddressedTree;
