//! Exact inner-product vector index.
//!
//! [`FlatIndex`] keeps every vector in memory and scores a query against all
//! of them. It never normalizes: with unit-length inputs the inner product is
//! the cosine similarity. The index is built once per search and discarded
//! with it.

use std::cmp::Ordering;

use thiserror::Error;

/// Errors that can occur while building or querying an index.
#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    /// No vectors were supplied, so the dimension is unknown
    #[error("Cannot build an index from zero vectors")]
    Empty,

    /// A vector did not share the dimension of the first vector
    #[error("Dimension mismatch at vector {position}: expected {expected}, got {actual}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        actual: usize,
    },
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// One ranked entry returned by a search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Position of the vector in the build input
    pub index: usize,
    /// Inner product with the query
    pub score: f32,
}

/// Compute the inner product of two equal-length vectors.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Descending by score, ascending by position on ties.
fn rank_order(a: &Hit, b: &Hit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.index.cmp(&b.index))
}

/// Immutable exhaustive-search index over equal-dimension vectors.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    data: Vec<f32>,
    dimension: usize,
    len: usize,
}

impl FlatIndex {
    /// Build an index over `vectors`.
    ///
    /// The dimension is taken from the first vector; every other vector must
    /// match it.
    ///
    /// # Errors
    /// Returns `IndexError::Empty` for no vectors and
    /// `IndexError::DimensionMismatch` for a ragged input
    pub fn build<V: AsRef<[f32]>>(vectors: &[V]) -> IndexResult<Self> {
        let dimension = vectors.first().ok_or(IndexError::Empty)?.as_ref().len();
        let mut data = Vec::with_capacity(dimension * vectors.len());
        for (position, vector) in vectors.iter().enumerate() {
            let vector = vector.as_ref();
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    position,
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }
        Ok(Self {
            data,
            dimension,
            len: vectors.len(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn vector(&self, i: usize) -> &[f32] {
        &self.data[i * self.dimension..(i + 1) * self.dimension]
    }

    /// Return the `k` highest-scoring vectors for one query.
    ///
    /// Results are sorted by descending score with ties broken by the lower
    /// index. Fewer than `k` hits are returned when the index is smaller.
    ///
    /// # Errors
    /// Returns `IndexError::DimensionMismatch` if the query has the wrong
    /// dimension
    pub fn search_one(&self, query: &[f32], k: usize) -> IndexResult<Vec<Hit>> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                position: 0,
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Hit> = (0..self.len)
            .map(|index| Hit {
                index,
                score: inner_product(query, self.vector(index)),
            })
            .collect();

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, rank_order);
            hits.truncate(k);
        }
        hits.sort_by(rank_order);
        Ok(hits)
    }

    /// Run [`FlatIndex::search_one`] for every query, in query order.
    ///
    /// # Errors
    /// Returns `IndexError::DimensionMismatch` (with the query position) if
    /// any query has the wrong dimension
    pub fn search<V: AsRef<[f32]>>(&self, queries: &[V], k: usize) -> IndexResult<Vec<Vec<Hit>>> {
        queries
            .iter()
            .enumerate()
            .map(|(position, q)| {
                self.search_one(q.as_ref(), k).map_err(|e| match e {
                    IndexError::DimensionMismatch { expected, actual, .. } => {
                        IndexError::DimensionMismatch {
                            position,
                            expected,
                            actual,
                        }
                    }
                    other => other,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: &[f32]) -> Vec<f32> {
        let n = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / n).collect()
    }

    #[test]
    fn test_inner_product() {
        assert_eq!(inner_product(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
        assert_eq!(inner_product(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_build_empty_fails() {
        let vectors: Vec<Vec<f32>> = Vec::new();
        assert_eq!(FlatIndex::build(&vectors).unwrap_err(), IndexError::Empty);
    }

    #[test]
    fn test_build_ragged_fails() {
        let vectors: Vec<Vec<f32>> = vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]];
        assert_eq!(
            FlatIndex::build(&vectors).unwrap_err(),
            IndexError::DimensionMismatch {
                position: 1,
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn test_search_sorted_descending() {
        let vectors = vec![
            unit(&[1.0, 0.0, 0.0]),
            unit(&[0.8, 0.6, 0.0]),
            unit(&[0.0, 1.0, 0.0]),
            unit(&[0.6, 0.8, 0.0]),
        ];
        let index = FlatIndex::build(&vectors).unwrap();
        let hits = index.search_one(&unit(&[1.0, 0.2, 0.0]), 4).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(order, vec![0, 1, 3, 2]);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_ties_broken_by_lower_index() {
        let vectors: Vec<Vec<f32>> = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 0.0],
        ];
        let index = FlatIndex::build(&vectors).unwrap();
        let hits = index.search_one(&[1.0, 0.0], 4).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(order, vec![1, 3, 4, 0]);
    }

    #[test]
    fn test_self_similarity_is_top_match() {
        let vectors: Vec<Vec<f32>> = (0..20)
            .map(|i| unit(&[(i as f32).sin(), (i as f32).cos(), 0.3 * i as f32 + 1.0]))
            .collect();
        let index = FlatIndex::build(&vectors).unwrap();
        for (i, v) in vectors.iter().enumerate() {
            let hits = index.search_one(v, 3).unwrap();
            assert_eq!(hits[0].index, i);
            assert!((hits[0].score - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_k_larger_than_index_returns_all() {
        let vectors: Vec<Vec<f32>> = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let index = FlatIndex::build(&vectors).unwrap();
        let hits = index.search_one(&[0.5, 0.5], 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.index < 2));
    }

    #[test]
    fn test_k_zero_returns_nothing() {
        let index = FlatIndex::build(&[vec![1.0f32]]).unwrap();
        assert!(index.search_one(&[1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_no_internal_normalization() {
        let index = FlatIndex::build(&[vec![2.0f32, 0.0], vec![0.5, 0.0]]).unwrap();
        let hits = index.search_one(&[3.0, 0.0], 2).unwrap();
        assert_eq!(hits[0], Hit { index: 0, score: 6.0 });
        assert_eq!(hits[1], Hit { index: 1, score: 1.5 });
    }

    #[test]
    fn test_batch_search_and_query_dimension_check() {
        let index = FlatIndex::build(&[vec![1.0f32, 0.0], vec![0.0, 1.0]]).unwrap();
        let results = index.search(&[vec![1.0f32, 0.0], vec![0.0, 1.0]], 1).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0][0].index, 0);
        assert_eq!(results[1][0].index, 1);

        let err = index.search(&[vec![1.0f32, 0.0], vec![1.0]], 1).unwrap_err();
        assert_eq!(
            err,
            IndexError::DimensionMismatch {
                position: 1,
                expected: 2,
                actual: 1
            }
        );
    }
}
