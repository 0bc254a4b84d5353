/*!
This crate computes the decision-tree-space embedding of a feature matrix: every row is routed through every tree of a fitted ensemble to its terminal leaf, and the result is a sparse one-hot matrix with one column per leaf across all trees, together with the per-tree column boundaries. The embedding is the feature representation consumed by a downstream penalized linear model, as in gradient-boosted-tree plus linear-model stacking.

```
use ndarray::prelude::*;
use treestack_embed::{compute_embedding, FeatureValue};
use treestack_ensemble::Ensemble;

let json = r#"[[{"id": 0, "is_leaf": true}]]"#;
let ensemble = Ensemble::from_json(json).unwrap();
let features = arr2(&[
	[FeatureValue::Number(0.2)],
	[FeatureValue::Missing],
]);
let embedding = compute_embedding(&ensemble, features.view(), &|| {}).unwrap();
assert_eq!(embedding.n_leaves, 1);
assert_eq!(embedding.tree_cuts, vec![1]);
```
*/

#![allow(clippy::tabs_in_doc_comments)]

mod compute_embedding;
mod locate_leaf;
mod sparse;

pub use self::compute_embedding::{compute_embedding, EmbeddingResult};
pub use self::locate_leaf::locate_leaf;
pub use self::sparse::{BinaryCscMatrix, BinaryCsrMatrix, EmbeddingCoordinates};

use thiserror::Error;

/// One cell of the feature matrix. Missing values are an explicit variant rather than a NaN sentinel, so a genuine NaN that survived upstream cleaning is still an ordinary number and only `Missing` engages a branch's missing direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FeatureValue {
	Number(f32),
	Missing,
}

impl FeatureValue {
	pub fn as_number(&self) -> Option<f32> {
		match self {
			FeatureValue::Number(value) => Some(*value),
			FeatureValue::Missing => None,
		}
	}
}

impl From<Option<f32>> for FeatureValue {
	fn from(value: Option<f32>) -> FeatureValue {
		match value {
			Some(value) => FeatureValue::Number(value),
			None => FeatureValue::Missing,
		}
	}
}

/// An error computing an embedding. Every variant is a caller contract violation or a degenerate input, detected before any partial embedding is produced.
#[derive(Debug, Error, PartialEq)]
pub enum EmbedError {
	#[error("the feature matrix has zero rows")]
	EmptyInput,
	#[error("the ensemble references feature index {feature_index} but the feature matrix has only {n_features} columns")]
	RowWidthMismatch {
		feature_index: usize,
		n_features: usize,
	},
	#[error("a branch references feature index {feature_index} but the row has only {n_features} values")]
	FeatureIndexOutOfRange {
		feature_index: usize,
		n_features: usize,
	},
}
