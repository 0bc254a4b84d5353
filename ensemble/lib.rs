/*!
This crate defines the structural representation of a fitted ensemble of decision trees, decoded from the per-tree node listing an external gradient boosting trainer emits. The trees are used only for routing: which leaf does a row of features reach in each tree. Nothing here trains, scores, or updates a tree.
*/

#![allow(clippy::tabs_in_doc_comments)]

pub mod dump;

pub use dump::{EnsembleError, MalformedTreeError, NodeDump};

/// Trees are stored as a `Vec` of `Node`s indexed by node id. The root is the node with id 0. Each branch holds the ids of its two children.
#[derive(Debug)]
pub struct Tree {
	pub nodes: Vec<Node>,
	/// The number of leaf nodes in this tree, cached at construction.
	pub n_leaves: usize,
}

/// A node is either a branch or a leaf.
#[derive(Debug)]
pub enum Node {
	Branch(BranchNode),
	Leaf(LeafNode),
}

/// A `BranchNode` is an internal node in a tree. A row reaching this node is sent to the left or right child by comparing the value of a single feature with the threshold.
#[derive(Debug)]
pub struct BranchNode {
	/// This is the index in the tree's node vector for this node's left child.
	pub left_child_index: usize,
	/// This is the index in the tree's node vector for this node's right child.
	pub right_child_index: usize,
	/// This is the index of the feature column to compare.
	pub feature_index: usize,
	/// Rows whose feature value is strictly less than the threshold are sent left, all others are sent right.
	pub threshold: f32,
	/// This is the direction rows with a missing feature value should be sent.
	pub missing_direction: SplitDirection,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SplitDirection {
	Left,
	Right,
}

/// The leaves in a tree are numbered depth-first, left to right, starting at zero. The leaf index identifies the column of the one-hot embedding within the tree's column block.
#[derive(Debug)]
pub struct LeafNode {
	pub leaf_index: usize,
}

/// An `Ensemble` is an ordered sequence of trees. The order determines the column order of the embedding: tree `i`'s leaves occupy the columns `leaf_offsets[i]..leaf_offsets[i] + trees[i].n_leaves`.
#[derive(Debug)]
pub struct Ensemble {
	pub trees: Vec<Tree>,
	/// The prefix sums of `n_leaves` over the trees, so `leaf_offsets[i]` is the first embedding column belonging to tree `i`.
	pub leaf_offsets: Vec<usize>,
	/// The total number of leaves across all trees, which is the number of embedding columns.
	pub n_leaves: usize,
	/// The largest feature index referenced by any branch in any tree, `None` if every tree is a single leaf. Used to check that a feature matrix is wide enough before routing any rows through the ensemble.
	pub max_feature_index: Option<usize>,
}
