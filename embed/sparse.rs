use crate::compute_embedding::EmbeddingResult;
use serde::{Deserialize, Serialize};

/// A binary matrix in compressed sparse row form. `row_offsets` has one entry per row plus one, and `column_indices[row_offsets[i]..row_offsets[i + 1]]` holds the sorted column indexes of the set bits in row `i`. The values are implicitly 1, so no value array is stored.
#[derive(Debug, PartialEq)]
pub struct BinaryCsrMatrix {
	pub n_rows: usize,
	pub n_columns: usize,
	pub row_offsets: Vec<usize>,
	pub column_indices: Vec<usize>,
}

impl BinaryCsrMatrix {
	/// The column indexes of the set bits in one row, without copying.
	pub fn row(&self, row_index: usize) -> &[usize] {
		&self.column_indices[self.row_offsets[row_index]..self.row_offsets[row_index + 1]]
	}

	pub fn n_set_bits(&self) -> usize {
		self.column_indices.len()
	}

	/// Iterate all set bits as (row index, column index) pairs in row-major order.
	pub fn iter_set_bits(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
		(0..self.n_rows).flat_map(move |row_index| {
			self.row(row_index)
				.iter()
				.map(move |column_index| (row_index, *column_index))
		})
	}

	/// Transpose to compressed sparse column form, which column-major consumers such as penalized linear trainers want. This is a counting sort over the column indexes, so the row indexes within each column come out sorted.
	pub fn to_csc(&self) -> BinaryCscMatrix {
		let mut column_offsets = vec![0; self.n_columns + 1];
		for column_index in self.column_indices.iter() {
			column_offsets[column_index + 1] += 1;
		}
		for column_index in 0..self.n_columns {
			column_offsets[column_index + 1] += column_offsets[column_index];
		}
		let mut next_in_column = column_offsets[..self.n_columns].to_vec();
		let mut row_indices = vec![0; self.n_set_bits()];
		for (row_index, column_index) in self.iter_set_bits() {
			row_indices[next_in_column[column_index]] = row_index;
			next_in_column[column_index] += 1;
		}
		BinaryCscMatrix {
			n_rows: self.n_rows,
			n_columns: self.n_columns,
			column_offsets,
			row_indices,
		}
	}
}

/// A binary matrix in compressed sparse column form, the transpose layout of [`BinaryCsrMatrix`].
#[derive(Debug, PartialEq)]
pub struct BinaryCscMatrix {
	pub n_rows: usize,
	pub n_columns: usize,
	pub column_offsets: Vec<usize>,
	pub row_indices: Vec<usize>,
}

impl BinaryCscMatrix {
	/// The row indexes of the set bits in one column, without copying.
	pub fn column(&self, column_index: usize) -> &[usize] {
		&self.row_indices[self.column_offsets[column_index]..self.column_offsets[column_index + 1]]
	}
}

/// The persisted form of an embedding: the coordinate list of set bits plus the shape and tree cuts, sufficient to reconstruct the matrix bit for bit.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct EmbeddingCoordinates {
	pub n_rows: usize,
	pub n_leaves: usize,
	pub tree_cuts: Vec<usize>,
	/// The set bits as (row index, column index) pairs in row-major order.
	pub coordinates: Vec<(usize, usize)>,
}

impl EmbeddingResult {
	pub fn to_coordinates(&self) -> EmbeddingCoordinates {
		EmbeddingCoordinates {
			n_rows: self.n_rows,
			n_leaves: self.n_leaves,
			tree_cuts: self.tree_cuts.clone(),
			coordinates: self.matrix.iter_set_bits().collect(),
		}
	}

	pub fn from_coordinates(coordinates: EmbeddingCoordinates) -> EmbeddingResult {
		let EmbeddingCoordinates {
			n_rows,
			n_leaves,
			tree_cuts,
			mut coordinates,
		} = coordinates;
		// The set of coordinates is order independent, so sort rather than trust the stored order.
		coordinates.sort_unstable();
		let mut row_offsets = vec![0; n_rows + 1];
		for (row_index, _) in coordinates.iter() {
			row_offsets[row_index + 1] += 1;
		}
		for row_index in 0..n_rows {
			row_offsets[row_index + 1] += row_offsets[row_index];
		}
		let column_indices = coordinates
			.iter()
			.map(|(_, column_index)| *column_index)
			.collect();
		EmbeddingResult {
			n_rows,
			n_leaves,
			tree_cuts,
			matrix: BinaryCsrMatrix {
				n_rows,
				n_columns: n_leaves,
				row_offsets,
				column_indices,
			},
		}
	}
}

#[cfg(test)]
fn test_matrix() -> BinaryCsrMatrix {
	// 3 x 4 matrix:
	// 1 0 1 0
	// 0 1 0 1
	// 1 0 0 1
	BinaryCsrMatrix {
		n_rows: 3,
		n_columns: 4,
		row_offsets: vec![0, 2, 4, 6],
		column_indices: vec![0, 2, 1, 3, 0, 3],
	}
}

#[test]
fn test_csr_row_access() {
	let matrix = test_matrix();
	assert_eq!(matrix.row(0), &[0, 2]);
	assert_eq!(matrix.row(1), &[1, 3]);
	assert_eq!(matrix.row(2), &[0, 3]);
	assert_eq!(matrix.n_set_bits(), 6);
}

#[test]
fn test_csr_to_csc() {
	let matrix = test_matrix().to_csc();
	assert_eq!(matrix.column_offsets, vec![0, 2, 3, 4, 6]);
	assert_eq!(matrix.column(0), &[0, 2]);
	assert_eq!(matrix.column(1), &[1]);
	assert_eq!(matrix.column(2), &[0]);
	assert_eq!(matrix.column(3), &[1, 2]);
}

#[test]
fn test_csr_csc_consistency() {
	let csr = test_matrix();
	let csc = csr.to_csc();
	let mut csc_set_bits = Vec::new();
	for column_index in 0..csc.n_columns {
		for row_index in csc.column(column_index).iter() {
			csc_set_bits.push((*row_index, column_index));
		}
	}
	csc_set_bits.sort_unstable();
	let mut csr_set_bits: Vec<(usize, usize)> = csr.iter_set_bits().collect();
	csr_set_bits.sort_unstable();
	assert_eq!(csr_set_bits, csc_set_bits);
}

#[test]
fn test_coordinates_round_trip() {
	let embedding = EmbeddingResult {
		n_rows: 3,
		n_leaves: 4,
		tree_cuts: vec![2, 4],
		matrix: test_matrix(),
	};
	let coordinates = embedding.to_coordinates();
	let json = serde_json::to_string(&coordinates).unwrap();
	let decoded: EmbeddingCoordinates = serde_json::from_str(&json).unwrap();
	assert_eq!(EmbeddingResult::from_coordinates(decoded), embedding);
}

#[test]
fn test_from_coordinates_sorts_unordered_input() {
	let embedding = EmbeddingResult {
		n_rows: 3,
		n_leaves: 4,
		tree_cuts: vec![2, 4],
		matrix: test_matrix(),
	};
	let mut coordinates = embedding.to_coordinates();
	coordinates.coordinates.reverse();
	assert_eq!(EmbeddingResult::from_coordinates(coordinates), embedding);
}

#[test]
fn test_tree_block_slicing() {
	let embedding = EmbeddingResult {
		n_rows: 3,
		n_leaves: 4,
		tree_cuts: vec![2, 4],
		matrix: test_matrix(),
	};
	assert_eq!(embedding.tree_block(0), 0..2);
	assert_eq!(embedding.tree_block(1), 2..4);
	let block_set_bits: Vec<(usize, usize)> = embedding.tree_block_set_bits(1).collect();
	assert_eq!(block_set_bits, vec![(0, 2), (1, 3), (2, 3)]);
}
