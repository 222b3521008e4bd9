//! Payloads delivered to completion callbacks

use crate::model::Hash;

/// Outcome of a batch insertion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddDataResponse {
    /// Root before the batch
    pub previous_root: Hash,
    /// Root after the batch (uncommitted)
    pub root: Hash,
    /// Root of the smallest aligned subtree holding the whole batch
    pub subtree_root: Hash,
    /// Height of that subtree
    pub subtree_height: u32,
    /// Index of the first inserted leaf
    pub start_index: u64,
    /// One past the index of the last inserted leaf
    pub end_index: u64,
    /// Tree size after the batch
    pub size: u64,
}

/// Outcome of a leaf replacement
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateResponse {
    pub index: u64,
    pub previous_value: Hash,
    pub previous_root: Hash,
    pub root: Hash,
}

/// Outcome of a commit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitResponse {
    pub root: Hash,
    pub size: u64,
    /// New nodes made durable (duplicates of durable nodes are not counted)
    pub nodes_written: usize,
}
