use crate::{EmbedError, FeatureValue};
use ndarray::prelude::*;
use treestack_ensemble::{BranchNode, LeafNode, Node, SplitDirection, Tree};

/// Route one row of features from the root of a tree to a terminal leaf and return the leaf's depth-first index within the tree.
///
/// At each branch the value at the branch's feature index decides the direction: `Missing` follows the branch's missing direction, and a number goes left when it is strictly less than the threshold and right otherwise. A value exactly equal to the threshold goes right. This convention must match the trainer that produced the thresholds.
pub fn locate_leaf(tree: &Tree, row: ArrayView1<FeatureValue>) -> Result<usize, EmbedError> {
	// Start at the root node and traverse the tree until we get to a leaf.
	let mut node_index = 0;
	loop {
		match &tree.nodes[node_index] {
			Node::Branch(BranchNode {
				left_child_index,
				right_child_index,
				feature_index,
				threshold,
				missing_direction,
			}) => {
				let feature_value =
					row.get(*feature_index)
						.ok_or(EmbedError::FeatureIndexOutOfRange {
							feature_index: *feature_index,
							n_features: row.len(),
						})?;
				node_index = match feature_value {
					FeatureValue::Missing => match missing_direction {
						SplitDirection::Left => *left_child_index,
						SplitDirection::Right => *right_child_index,
					},
					FeatureValue::Number(value) => {
						if *value < *threshold {
							*left_child_index
						} else {
							*right_child_index
						}
					}
				};
			}
			Node::Leaf(LeafNode { leaf_index }) => return Ok(*leaf_index),
		}
	}
}

#[cfg(test)]
use treestack_ensemble::NodeDump;

#[cfg(test)]
fn stump(feature_index: usize, threshold: f32, missing_goes_left: bool) -> Tree {
	let dump = vec![
		NodeDump {
			id: 0,
			is_leaf: false,
			feature_index: Some(feature_index),
			threshold: Some(threshold),
			missing_goes_left: Some(missing_goes_left),
			left_child_id: Some(1),
			right_child_id: Some(2),
		},
		NodeDump {
			id: 1,
			is_leaf: true,
			feature_index: None,
			threshold: None,
			missing_goes_left: None,
			left_child_id: None,
			right_child_id: None,
		},
		NodeDump {
			id: 2,
			is_leaf: true,
			feature_index: None,
			threshold: None,
			missing_goes_left: None,
			left_child_id: None,
			right_child_id: None,
		},
	];
	Tree::from_dump(&dump).unwrap()
}

#[test]
fn test_locate_leaf_threshold_boundary() {
	let tree = stump(0, 0.5, true);
	let epsilon = f32::EPSILON;
	let below = arr1(&[FeatureValue::Number(0.5 - epsilon)]);
	let equal = arr1(&[FeatureValue::Number(0.5)]);
	let above = arr1(&[FeatureValue::Number(0.5 + epsilon)]);
	// Strictly less than the threshold goes left, equal goes right.
	assert_eq!(locate_leaf(&tree, below.view()).unwrap(), 0);
	assert_eq!(locate_leaf(&tree, equal.view()).unwrap(), 1);
	assert_eq!(locate_leaf(&tree, above.view()).unwrap(), 1);
}

#[test]
fn test_locate_leaf_missing_direction() {
	// The missing direction decides on its own, whatever the other features hold.
	let tree = stump(0, 0.5, true);
	let row = arr1(&[FeatureValue::Missing, FeatureValue::Number(1e9)]);
	assert_eq!(locate_leaf(&tree, row.view()).unwrap(), 0);
	let tree = stump(0, 0.5, false);
	assert_eq!(locate_leaf(&tree, row.view()).unwrap(), 1);
}

#[test]
fn test_locate_leaf_nan_is_not_missing() {
	// A genuine NaN is an ordinary number: the comparison is false, so it goes right even when the missing direction is left.
	let tree = stump(0, 0.5, true);
	let row = arr1(&[FeatureValue::Number(f32::NAN)]);
	assert_eq!(locate_leaf(&tree, row.view()).unwrap(), 1);
}

#[test]
fn test_locate_leaf_single_leaf_tree() {
	let dump = vec![NodeDump {
		id: 0,
		is_leaf: true,
		feature_index: None,
		threshold: None,
		missing_goes_left: None,
		left_child_id: None,
		right_child_id: None,
	}];
	let tree = Tree::from_dump(&dump).unwrap();
	let row = arr1(&[FeatureValue::Number(123.0)]);
	assert_eq!(locate_leaf(&tree, row.view()).unwrap(), 0);
}

#[test]
fn test_locate_leaf_feature_index_out_of_range() {
	let tree = stump(5, 0.5, true);
	let row = arr1(&[
		FeatureValue::Number(0.0),
		FeatureValue::Number(0.0),
		FeatureValue::Number(0.0),
	]);
	assert_eq!(
		locate_leaf(&tree, row.view()).unwrap_err(),
		EmbedError::FeatureIndexOutOfRange {
			feature_index: 5,
			n_features: 3,
		},
	);
}
