/*!
This module decodes the per-tree node listing produced by an external trainer into validated [`Tree`](crate::Tree)s and assembles them into an [`Ensemble`](crate::Ensemble). The concrete text or binary format a particular trainer emits is an adapter concern outside this crate. Adapters translate into [`NodeDump`] records, which also derive serde so a listing can be carried as JSON.
*/

use crate::{BranchNode, Ensemble, LeafNode, Node, SplitDirection, Tree};
use itertools::izip;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One node of a per-tree dump. Split fields must be present on branches and absent on leaves. Node ids must be the dense range `0..n` where `n` is the number of nodes in the dump, with id 0 as the root.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NodeDump {
	pub id: usize,
	pub is_leaf: bool,
	#[serde(default)]
	pub feature_index: Option<usize>,
	#[serde(default)]
	pub threshold: Option<f32>,
	#[serde(default)]
	pub missing_goes_left: Option<bool>,
	#[serde(default)]
	pub left_child_id: Option<usize>,
	#[serde(default)]
	pub right_child_id: Option<usize>,
}

/// An error describing structural corruption in a single tree dump.
#[derive(Debug, Error, PartialEq)]
pub enum MalformedTreeError {
	#[error("the dump has no node with id 0")]
	MissingRoot,
	#[error("node id {id} appears more than once")]
	DuplicateNodeId { id: usize },
	#[error("node id {id} is out of range for a dump of {n_nodes} nodes")]
	NodeIdOutOfRange { id: usize, n_nodes: usize },
	#[error("leaf node {id} carries split fields")]
	LeafWithSplitFields { id: usize },
	#[error("branch node {id} is missing one or more split fields")]
	BranchMissingSplitFields { id: usize },
	#[error("node {id} references child id {child_id}, which does not exist")]
	InvalidChildId { id: usize, child_id: usize },
	#[error("node {id} is reached by more than one path, so the dump is not a tree")]
	CycleOrSharedChild { id: usize },
	#[error("node {id} is not reachable from the root")]
	UnreachableNode { id: usize },
}

/// An error constructing an ensemble from a sequence of tree dumps.
#[derive(Debug, Error)]
pub enum EnsembleError {
	#[error("an ensemble must contain at least one tree")]
	EmptyEnsemble,
	#[error("tree {tree_index} is malformed: {source}")]
	MalformedTree {
		tree_index: usize,
		#[source]
		source: MalformedTreeError,
	},
	#[error("failed to deserialize the tree dumps: {0}")]
	Json(#[from] serde_json::Error),
}

impl Tree {
	/// Construct a validated tree from a node dump. Leaves are numbered depth-first, left to right, so re-parsing the same dump always produces the same leaf indexes.
	pub fn from_dump(dump: &[NodeDump]) -> Result<Tree, MalformedTreeError> {
		if dump.is_empty() {
			return Err(MalformedTreeError::MissingRoot);
		}
		let n_nodes = dump.len();
		// Place each node at the index given by its id. Ids are unique and dense, so every slot is filled.
		let mut nodes: Vec<Option<Node>> = (0..n_nodes).map(|_| None).collect();
		for node_dump in dump {
			if node_dump.id >= n_nodes {
				return Err(MalformedTreeError::NodeIdOutOfRange {
					id: node_dump.id,
					n_nodes,
				});
			}
			if nodes[node_dump.id].is_some() {
				return Err(MalformedTreeError::DuplicateNodeId { id: node_dump.id });
			}
			nodes[node_dump.id] = Some(node_from_dump(node_dump)?);
		}
		let mut nodes: Vec<Node> = nodes.into_iter().map(|node| node.unwrap()).collect();
		// Traverse from the root, verifying each node is reached exactly once and numbering leaves in depth-first left-to-right order.
		let mut seen = vec![false; n_nodes];
		seen[0] = true;
		let mut stack = vec![0];
		let mut n_leaves = 0;
		while let Some(node_index) = stack.pop() {
			match &mut nodes[node_index] {
				Node::Branch(branch) => {
					// Push the right child first so the left child is visited first.
					let child_indexes = [branch.right_child_index, branch.left_child_index];
					for child_index in child_indexes.iter().copied() {
						if child_index >= n_nodes {
							return Err(MalformedTreeError::InvalidChildId {
								id: node_index,
								child_id: child_index,
							});
						}
						if seen[child_index] {
							return Err(MalformedTreeError::CycleOrSharedChild { id: child_index });
						}
						seen[child_index] = true;
						stack.push(child_index);
					}
				}
				Node::Leaf(leaf) => {
					leaf.leaf_index = n_leaves;
					n_leaves += 1;
				}
			}
		}
		if let Some(id) = seen.iter().position(|seen| !*seen) {
			return Err(MalformedTreeError::UnreachableNode { id });
		}
		Ok(Tree { nodes, n_leaves })
	}
}

fn node_from_dump(node_dump: &NodeDump) -> Result<Node, MalformedTreeError> {
	let has_split_fields = node_dump.feature_index.is_some()
		|| node_dump.threshold.is_some()
		|| node_dump.missing_goes_left.is_some()
		|| node_dump.left_child_id.is_some()
		|| node_dump.right_child_id.is_some();
	if node_dump.is_leaf {
		if has_split_fields {
			return Err(MalformedTreeError::LeafWithSplitFields { id: node_dump.id });
		}
		// The leaf index is assigned during the depth-first traversal.
		return Ok(Node::Leaf(LeafNode { leaf_index: 0 }));
	}
	match (
		node_dump.feature_index,
		node_dump.threshold,
		node_dump.missing_goes_left,
		node_dump.left_child_id,
		node_dump.right_child_id,
	) {
		(
			Some(feature_index),
			Some(threshold),
			Some(missing_goes_left),
			Some(left_child_index),
			Some(right_child_index),
		) => Ok(Node::Branch(BranchNode {
			left_child_index,
			right_child_index,
			feature_index,
			threshold,
			missing_direction: if missing_goes_left {
				SplitDirection::Left
			} else {
				SplitDirection::Right
			},
		})),
		_ => Err(MalformedTreeError::BranchMissingSplitFields { id: node_dump.id }),
	}
}

impl Ensemble {
	/// Construct an ensemble from an ordered sequence of tree dumps. The order of the dumps determines the column order of the embedding.
	pub fn from_dumps(dumps: &[Vec<NodeDump>]) -> Result<Ensemble, EnsembleError> {
		if dumps.is_empty() {
			return Err(EnsembleError::EmptyEnsemble);
		}
		let trees = izip!(0.., dumps.iter())
			.map(|(tree_index, dump)| {
				Tree::from_dump(dump)
					.map_err(|source| EnsembleError::MalformedTree { tree_index, source })
			})
			.collect::<Result<Vec<Tree>, EnsembleError>>()?;
		let mut leaf_offsets = Vec::with_capacity(trees.len());
		let mut n_leaves = 0;
		for tree in trees.iter() {
			leaf_offsets.push(n_leaves);
			n_leaves += tree.n_leaves;
		}
		let max_feature_index = trees
			.iter()
			.flat_map(|tree| tree.nodes.iter())
			.filter_map(|node| match node {
				Node::Branch(branch) => Some(branch.feature_index),
				Node::Leaf(_) => None,
			})
			.max();
		Ok(Ensemble {
			trees,
			leaf_offsets,
			n_leaves,
			max_feature_index,
		})
	}

	/// Construct an ensemble from a JSON array of tree dumps, each a JSON array of node records.
	pub fn from_json(json: &str) -> Result<Ensemble, EnsembleError> {
		let dumps: Vec<Vec<NodeDump>> = serde_json::from_str(json)?;
		Ensemble::from_dumps(&dumps)
	}
}

#[cfg(test)]
fn branch_dump(
	id: usize,
	feature_index: usize,
	threshold: f32,
	missing_goes_left: bool,
	left_child_id: usize,
	right_child_id: usize,
) -> NodeDump {
	NodeDump {
		id,
		is_leaf: false,
		feature_index: Some(feature_index),
		threshold: Some(threshold),
		missing_goes_left: Some(missing_goes_left),
		left_child_id: Some(left_child_id),
		right_child_id: Some(right_child_id),
	}
}

#[cfg(test)]
fn leaf_dump(id: usize) -> NodeDump {
	NodeDump {
		id,
		is_leaf: true,
		feature_index: None,
		threshold: None,
		missing_goes_left: None,
		left_child_id: None,
		right_child_id: None,
	}
}

#[test]
fn test_from_dump_assigns_leaf_indexes_depth_first_left_to_right() {
	// Root splits to a left subtree with two leaves and a right leaf.
	let dump = vec![
		branch_dump(0, 0, 0.5, true, 1, 2),
		branch_dump(1, 1, 2.0, false, 3, 4),
		leaf_dump(2),
		leaf_dump(3),
		leaf_dump(4),
	];
	let tree = Tree::from_dump(&dump).unwrap();
	assert_eq!(tree.n_leaves, 3);
	let leaf_index = |node_index: usize| match &tree.nodes[node_index] {
		Node::Leaf(leaf) => leaf.leaf_index,
		Node::Branch(_) => panic!(),
	};
	// Depth-first left-to-right: node 3, node 4, node 2.
	assert_eq!(leaf_index(3), 0);
	assert_eq!(leaf_index(4), 1);
	assert_eq!(leaf_index(2), 2);
}

#[test]
fn test_from_dump_is_deterministic() {
	let mut dump = vec![
		branch_dump(0, 0, 0.5, true, 1, 2),
		leaf_dump(1),
		leaf_dump(2),
	];
	let tree = Tree::from_dump(&dump).unwrap();
	// The dump order of the nodes must not affect the leaf numbering.
	dump.reverse();
	let tree_reversed = Tree::from_dump(&dump).unwrap();
	for (node, node_reversed) in izip!(tree.nodes.iter(), tree_reversed.nodes.iter()) {
		match (node, node_reversed) {
			(Node::Leaf(leaf), Node::Leaf(leaf_reversed)) => {
				assert_eq!(leaf.leaf_index, leaf_reversed.leaf_index)
			}
			(Node::Branch(_), Node::Branch(_)) => {}
			_ => panic!(),
		}
	}
}

#[test]
fn test_from_dump_single_leaf() {
	let tree = Tree::from_dump(&[leaf_dump(0)]).unwrap();
	assert_eq!(tree.n_leaves, 1);
}

#[test]
fn test_from_dump_missing_root() {
	assert_eq!(
		Tree::from_dump(&[]).unwrap_err(),
		MalformedTreeError::MissingRoot
	);
}

#[test]
fn test_from_dump_duplicate_node_id() {
	let dump = vec![
		branch_dump(0, 0, 0.5, true, 1, 1),
		leaf_dump(1),
		leaf_dump(1),
	];
	assert_eq!(
		Tree::from_dump(&dump).unwrap_err(),
		MalformedTreeError::DuplicateNodeId { id: 1 },
	);
}

#[test]
fn test_from_dump_node_id_out_of_range() {
	let dump = vec![
		branch_dump(0, 0, 0.5, true, 1, 2),
		leaf_dump(1),
		leaf_dump(7),
	];
	assert_eq!(
		Tree::from_dump(&dump).unwrap_err(),
		MalformedTreeError::NodeIdOutOfRange { id: 7, n_nodes: 3 },
	);
}

#[test]
fn test_from_dump_leaf_with_split_fields() {
	let mut leaf = leaf_dump(1);
	leaf.threshold = Some(1.0);
	let dump = vec![branch_dump(0, 0, 0.5, true, 1, 2), leaf, leaf_dump(2)];
	assert_eq!(
		Tree::from_dump(&dump).unwrap_err(),
		MalformedTreeError::LeafWithSplitFields { id: 1 },
	);
}

#[test]
fn test_from_dump_branch_missing_split_fields() {
	let mut branch = branch_dump(0, 0, 0.5, true, 1, 2);
	branch.missing_goes_left = None;
	let dump = vec![branch, leaf_dump(1), leaf_dump(2)];
	assert_eq!(
		Tree::from_dump(&dump).unwrap_err(),
		MalformedTreeError::BranchMissingSplitFields { id: 0 },
	);
}

#[test]
fn test_from_dump_invalid_child_id() {
	let dump = vec![branch_dump(0, 0, 0.5, true, 1, 9), leaf_dump(1)];
	assert_eq!(
		Tree::from_dump(&dump).unwrap_err(),
		MalformedTreeError::InvalidChildId { id: 0, child_id: 9 },
	);
}

#[test]
fn test_from_dump_shared_child() {
	// Both children of the root are the same node.
	let dump = vec![branch_dump(0, 0, 0.5, true, 1, 1), leaf_dump(1)];
	assert_eq!(
		Tree::from_dump(&dump).unwrap_err(),
		MalformedTreeError::CycleOrSharedChild { id: 1 },
	);
}

#[test]
fn test_from_dump_cycle() {
	// Node 1 points back at the root.
	let dump = vec![
		branch_dump(0, 0, 0.5, true, 1, 2),
		branch_dump(1, 0, 0.5, true, 2, 0),
		leaf_dump(2),
	];
	assert_eq!(
		Tree::from_dump(&dump).unwrap_err(),
		MalformedTreeError::CycleOrSharedChild { id: 0 },
	);
}

#[test]
fn test_from_dumps_empty_ensemble() {
	match Ensemble::from_dumps(&[]).unwrap_err() {
		EnsembleError::EmptyEnsemble => {}
		_ => panic!(),
	}
}

#[test]
fn test_from_dumps_propagates_malformed_tree() {
	let dumps = vec![vec![leaf_dump(0)], vec![]];
	match Ensemble::from_dumps(&dumps).unwrap_err() {
		EnsembleError::MalformedTree { tree_index, source } => {
			assert_eq!(tree_index, 1);
			assert_eq!(source, MalformedTreeError::MissingRoot);
		}
		_ => panic!(),
	}
}

#[test]
fn test_from_dumps_leaf_offsets() {
	let dumps = vec![
		vec![
			branch_dump(0, 3, 0.5, true, 1, 2),
			leaf_dump(1),
			leaf_dump(2),
		],
		vec![leaf_dump(0)],
		vec![
			branch_dump(0, 1, 1.5, false, 1, 2),
			leaf_dump(1),
			leaf_dump(2),
		],
	];
	let ensemble = Ensemble::from_dumps(&dumps).unwrap();
	assert_eq!(ensemble.leaf_offsets, vec![0, 2, 3]);
	assert_eq!(ensemble.n_leaves, 5);
	assert_eq!(ensemble.max_feature_index, Some(3));
}

#[test]
fn test_from_json() {
	let json = r#"[
		[
			{"id": 0, "is_leaf": false, "feature_index": 0, "threshold": 0.5, "missing_goes_left": true, "left_child_id": 1, "right_child_id": 2},
			{"id": 1, "is_leaf": true},
			{"id": 2, "is_leaf": true}
		],
		[
			{"id": 0, "is_leaf": true}
		]
	]"#;
	let ensemble = Ensemble::from_json(json).unwrap();
	assert_eq!(ensemble.trees.len(), 2);
	assert_eq!(ensemble.n_leaves, 3);
}
