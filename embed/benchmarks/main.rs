use ndarray::prelude::*;
use treestack_embed::{compute_embedding, FeatureValue};
use treestack_ensemble::{Ensemble, NodeDump};

fn main() {
	let n_trees = 100;
	let depth = 6;
	let n_rows = 1_000_000;
	let n_features = 20;

	// Build an ensemble of complete binary trees with synthetic splits.
	let dumps: Vec<Vec<NodeDump>> = (0..n_trees)
		.map(|tree_index| complete_tree_dump(depth, tree_index, n_features))
		.collect();
	let ensemble = Ensemble::from_dumps(&dumps).unwrap();

	// Build a synthetic feature matrix with a sprinkling of missing values.
	let features = Array::from_shape_fn((n_rows, n_features), |(row_index, feature_index)| {
		let value = ((row_index * 31 + feature_index * 7) % 1000) as f32 / 1000.0;
		if (row_index + feature_index) % 97 == 0 {
			FeatureValue::Missing
		} else {
			FeatureValue::Number(value)
		}
	});

	let start = std::time::Instant::now();
	let embedding = compute_embedding(&ensemble, features.view(), &|| {}).unwrap();
	let duration = start.elapsed();
	println!("rows: {}", embedding.n_rows);
	println!("columns: {}", embedding.n_leaves);
	println!("set bits: {}", embedding.matrix.n_set_bits());
	println!("duration: {:?}", duration);
}

/// A complete binary tree of the given depth whose splits cycle through the feature columns.
fn complete_tree_dump(depth: usize, tree_index: usize, n_features: usize) -> Vec<NodeDump> {
	let n_branches = (1 << depth) - 1;
	let n_nodes = (1 << (depth + 1)) - 1;
	(0..n_nodes)
		.map(|id| {
			if id < n_branches {
				NodeDump {
					id,
					is_leaf: false,
					feature_index: Some((id + tree_index) % n_features),
					threshold: Some(((id * 13 + tree_index * 3) % 100) as f32 / 100.0),
					missing_goes_left: Some(id % 2 == 0),
					left_child_id: Some(2 * id + 1),
					right_child_id: Some(2 * id + 2),
				}
			} else {
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
		})
		.collect()
}
