use crate::locate_leaf::locate_leaf;
use crate::sparse::BinaryCsrMatrix;
use crate::{EmbedError, FeatureValue};
use itertools::izip;
use ndarray::prelude::*;
use rayon::prelude::*;
use std::ops::Range;
use treestack_ensemble::Ensemble;

/// The artifact produced by [`compute_embedding`]: a sparse one-hot matrix with one column per leaf across all trees and exactly one set bit per (row, tree) pair, plus the cumulative per-tree column boundaries. It holds no reference back to the ensemble or the feature matrix.
#[derive(Debug, PartialEq)]
pub struct EmbeddingResult {
	/// The number of rows in the input feature matrix.
	pub n_rows: usize,
	/// The total number of leaves across all trees, which is the number of columns.
	pub n_leaves: usize,
	/// `tree_cuts[i]` is the column offset where tree `i`'s block of leaf columns ends, so tree `i` owns the columns `tree_cuts[i - 1]..tree_cuts[i]` (starting at 0 for the first tree). Monotonically non-decreasing, and the last entry equals `n_leaves`.
	pub tree_cuts: Vec<usize>,
	pub matrix: BinaryCsrMatrix,
}

impl EmbeddingResult {
	/// The range of columns belonging to one tree, derived from the tree cuts.
	pub fn tree_block(&self, tree_index: usize) -> Range<usize> {
		let start = if tree_index == 0 {
			0
		} else {
			self.tree_cuts[tree_index - 1]
		};
		start..self.tree_cuts[tree_index]
	}

	/// Iterate the set bits whose column falls in one tree's block, as (row index, column index) pairs, without copying the matrix.
	pub fn tree_block_set_bits(
		&self,
		tree_index: usize,
	) -> impl Iterator<Item = (usize, usize)> + '_ {
		let block = self.tree_block(tree_index);
		self.matrix
			.iter_set_bits()
			.filter(move |(_, column_index)| block.contains(column_index))
	}
}

/// Compute the one-hot leaf embedding of a feature matrix under an ensemble.
///
/// Each row is routed through each tree with [`locate_leaf`], and the bit at the tree's leaf offset plus the reached leaf index is set. The work is partitioned over row chunks, one coordinate list per chunk, and the lists are merged in row order afterwards, so the result is identical no matter how the rows are partitioned. `progress` is called once per processed row.
pub fn compute_embedding(
	ensemble: &Ensemble,
	features: ArrayView2<FeatureValue>,
	progress: &(impl Fn() + Sync),
) -> Result<EmbeddingResult, EmbedError> {
	let n_rows = features.nrows();
	let n_threads = rayon::current_num_threads();
	let chunk_size = ((n_rows + n_threads - 1) / n_threads).max(1);
	compute_embedding_with_chunk_size(ensemble, features, chunk_size, progress)
}

fn compute_embedding_with_chunk_size(
	ensemble: &Ensemble,
	features: ArrayView2<FeatureValue>,
	chunk_size: usize,
	progress: &(impl Fn() + Sync),
) -> Result<EmbeddingResult, EmbedError> {
	let n_rows = features.nrows();
	let n_trees = ensemble.trees.len();
	if n_rows == 0 {
		return Err(EmbedError::EmptyInput);
	}
	// Verify the caller contract before routing any rows: every feature index referenced by the ensemble must exist in the feature matrix.
	if let Some(feature_index) = ensemble.max_feature_index {
		if feature_index >= features.ncols() {
			return Err(EmbedError::RowWidthMismatch {
				feature_index,
				n_features: features.ncols(),
			});
		}
	}
	let row_ranges: Vec<Range<usize>> = (0..n_rows)
		.step_by(chunk_size)
		.map(|start| start..(start + chunk_size).min(n_rows))
		.collect();
	// Each worker produces the column indexes for its own row range. The ranges are merged in row order afterwards, so the write order of the workers never affects the result.
	let partial_column_indices: Vec<Vec<usize>> = row_ranges
		.into_par_iter()
		.map(|row_range| compute_column_indices_for_rows(ensemble, features, row_range, progress))
		.collect::<Result<Vec<Vec<usize>>, EmbedError>>()?;
	let column_indices: Vec<usize> = partial_column_indices.into_iter().flatten().collect();
	// Every row has exactly one set bit per tree.
	let row_offsets: Vec<usize> = (0..=n_rows).map(|row_index| row_index * n_trees).collect();
	let matrix = BinaryCsrMatrix {
		n_rows,
		n_columns: ensemble.n_leaves,
		row_offsets,
		column_indices,
	};
	let tree_cuts: Vec<usize> = izip!(ensemble.leaf_offsets.iter(), ensemble.trees.iter())
		.map(|(leaf_offset, tree)| leaf_offset + tree.n_leaves)
		.collect();
	Ok(EmbeddingResult {
		n_rows,
		n_leaves: ensemble.n_leaves,
		tree_cuts,
		matrix,
	})
}

fn compute_column_indices_for_rows(
	ensemble: &Ensemble,
	features: ArrayView2<FeatureValue>,
	row_range: Range<usize>,
	progress: &(impl Fn() + Sync),
) -> Result<Vec<usize>, EmbedError> {
	let mut column_indices = Vec::with_capacity(row_range.len() * ensemble.trees.len());
	for row in features
		.slice(s![row_range, ..])
		.axis_iter(Axis(0))
	{
		for (leaf_offset, tree) in izip!(ensemble.leaf_offsets.iter(), ensemble.trees.iter()) {
			let leaf_index = locate_leaf(tree, row)?;
			column_indices.push(leaf_offset + leaf_index);
		}
		progress();
	}
	Ok(column_indices)
}

#[cfg(test)]
use treestack_ensemble::NodeDump;

#[cfg(test)]
fn test_ensemble() -> Ensemble {
	// Tree A: root split on feature 0 at threshold 0.5, two leaves. Tree B: a single leaf.
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
	Ensemble::from_json(json).unwrap()
}

#[test]
fn test_compute_embedding_two_tree_scenario() {
	let ensemble = test_ensemble();
	let features = arr2(&[[FeatureValue::Number(0.2)], [FeatureValue::Number(0.8)]]);
	let embedding = compute_embedding(&ensemble, features.view(), &|| {}).unwrap();
	assert_eq!(embedding.n_rows, 2);
	assert_eq!(embedding.n_leaves, 3);
	assert_eq!(embedding.tree_cuts, vec![2, 3]);
	// Row [0.2] lands in tree A leaf 0 and tree B leaf 0 at offset 2. Row [0.8] lands in tree A leaf 1.
	assert_eq!(embedding.matrix.row(0), &[0, 2]);
	assert_eq!(embedding.matrix.row(1), &[1, 2]);
}

#[test]
fn test_compute_embedding_one_set_bit_per_row_and_tree() {
	let ensemble = test_ensemble();
	let features = arr2(&[
		[FeatureValue::Number(0.1)],
		[FeatureValue::Number(0.5)],
		[FeatureValue::Missing],
		[FeatureValue::Number(0.9)],
		[FeatureValue::Number(0.3)],
	]);
	let embedding = compute_embedding(&ensemble, features.view(), &|| {}).unwrap();
	let n_trees = ensemble.trees.len();
	assert_eq!(embedding.matrix.n_set_bits(), features.nrows() * n_trees);
	assert_eq!(embedding.tree_cuts.len(), n_trees);
	assert!(embedding
		.tree_cuts
		.windows(2)
		.all(|window| window[0] <= window[1]));
	assert_eq!(*embedding.tree_cuts.last().unwrap(), embedding.n_leaves);
	for row_index in 0..embedding.n_rows {
		let row = embedding.matrix.row(row_index);
		assert_eq!(row.len(), n_trees);
		// One column per tree block, in tree order.
		for (tree_index, column_index) in row.iter().enumerate() {
			assert!(embedding.tree_block(tree_index).contains(column_index));
		}
	}
}

#[test]
fn test_compute_embedding_is_independent_of_partitioning() {
	let ensemble = test_ensemble();
	let features = arr2(&[
		[FeatureValue::Number(0.1)],
		[FeatureValue::Number(0.6)],
		[FeatureValue::Number(0.4)],
		[FeatureValue::Missing],
		[FeatureValue::Number(0.8)],
	]);
	let one_row_chunks =
		compute_embedding_with_chunk_size(&ensemble, features.view(), 1, &|| {}).unwrap();
	let single_chunk =
		compute_embedding_with_chunk_size(&ensemble, features.view(), features.nrows(), &|| {})
			.unwrap();
	let uneven_chunks =
		compute_embedding_with_chunk_size(&ensemble, features.view(), 2, &|| {}).unwrap();
	assert_eq!(one_row_chunks, single_chunk);
	assert_eq!(one_row_chunks, uneven_chunks);
}

#[test]
fn test_compute_embedding_single_leaf_tree_sets_same_column_for_every_row() {
	let dump = vec![vec![NodeDump {
		id: 0,
		is_leaf: true,
		feature_index: None,
		threshold: None,
		missing_goes_left: None,
		left_child_id: None,
		right_child_id: None,
	}]];
	let ensemble = Ensemble::from_dumps(&dump).unwrap();
	let features = arr2(&[
		[FeatureValue::Number(-1.0)],
		[FeatureValue::Number(7.0)],
		[FeatureValue::Missing],
	]);
	let embedding = compute_embedding(&ensemble, features.view(), &|| {}).unwrap();
	assert_eq!(embedding.tree_cuts, vec![1]);
	for row_index in 0..embedding.n_rows {
		assert_eq!(embedding.matrix.row(row_index), &[0]);
	}
}

#[test]
fn test_compute_embedding_empty_input() {
	let ensemble = test_ensemble();
	let features = Array2::<FeatureValue>::from_shape_vec((0, 1), vec![]).unwrap();
	assert_eq!(
		compute_embedding(&ensemble, features.view(), &|| {}).unwrap_err(),
		EmbedError::EmptyInput,
	);
}

#[test]
fn test_compute_embedding_row_width_mismatch() {
	// The ensemble references feature index 5 but the matrix has 3 columns.
	let json = r#"[
		[
			{"id": 0, "is_leaf": false, "feature_index": 5, "threshold": 0.5, "missing_goes_left": true, "left_child_id": 1, "right_child_id": 2},
			{"id": 1, "is_leaf": true},
			{"id": 2, "is_leaf": true}
		]
	]"#;
	let ensemble = Ensemble::from_json(json).unwrap();
	let features = arr2(&[[
		FeatureValue::Number(0.0),
		FeatureValue::Number(0.0),
		FeatureValue::Number(0.0),
	]]);
	assert_eq!(
		compute_embedding(&ensemble, features.view(), &|| {}).unwrap_err(),
		EmbedError::RowWidthMismatch {
			feature_index: 5,
			n_features: 3,
		},
	);
}

#[test]
fn test_compute_embedding_reports_progress_once_per_row() {
	let ensemble = test_ensemble();
	let features = arr2(&[
		[FeatureValue::Number(0.1)],
		[FeatureValue::Number(0.6)],
		[FeatureValue::Number(0.9)],
	]);
	let n_rows_processed = std::sync::atomic::AtomicUsize::new(0);
	compute_embedding(&ensemble, features.view(), &|| {
		n_rows_processed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
	})
	.unwrap();
	assert_eq!(
		n_rows_processed.load(std::sync::atomic::Ordering::Relaxed),
		3
	);
}
