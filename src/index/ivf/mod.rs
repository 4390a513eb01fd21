//! IVF (inverted file) index: k-means training, partition-shuffled
//! persistence, and approximate k-NN queries.
//!
//! A trained index is a storage *group* holding four arrays (centroids,
//! shuffled vectors, shuffled ids, partition indices) plus a small metadata
//! document. Only the centroids and indices live in memory; vector data is
//! read on demand at query time, either wholesale (infinite-RAM mode) or
//! streamed through a bounded window (finite-RAM mode).

pub mod build;
pub mod kmeans;
pub mod search;
pub mod streamer;

use tracing::info;

use crate::context::Context;
use crate::error::{CumulusError, Result};
use crate::matrix::ColMajorMatrix;
use crate::storage::{ArrayStore, DenseArray};
use crate::types::Scalar;

use search::SearchMatches;

/// Reject malformed partition index vectors.
///
/// A well-formed vector has length `nlist + 1`, starts at zero, is monotone
/// non-decreasing, and ends at the database column count. Inputs that fail
/// any of these are rejected outright; nothing is silently repaired.
pub(crate) fn validate_indices(indices: &[u64], nlist: usize, num_vectors: u64) -> Result<()> {
    if indices.len() != nlist + 1 {
        return Err(CumulusError::InvalidPartitioning(format!(
            "indices length {} does not match {} partitions + 1",
            indices.len(),
            nlist
        )));
    }
    if indices[0] != 0 {
        return Err(CumulusError::InvalidPartitioning(format!(
            "indices must start at 0, got {}",
            indices[0]
        )));
    }
    for (p, pair) in indices.windows(2).enumerate() {
        if pair[1] < pair[0] {
            return Err(CumulusError::InvalidPartitioning(format!(
                "indices decrease at partition {p}: {} -> {}",
                pair[0], pair[1]
            )));
        }
    }
    if indices[nlist] != num_vectors {
        return Err(CumulusError::InvalidPartitioning(format!(
            "indices end at {} but the database has {} columns",
            indices[nlist], num_vectors
        )));
    }
    Ok(())
}

/// In-memory handle for a trained IVF index.
///
/// Holds the centroids and partition indices; the shuffled database and ids
/// stay in storage and are fetched per query batch.
#[derive(Debug, Clone)]
pub struct IvfIndex<S: Scalar> {
    group_uri: String,
    centroids: ColMajorMatrix<S>,
    indices: Vec<u64>,
    vectors: DenseArray,
    ids: DenseArray,
    num_vectors: usize,
}

impl<S: Scalar> IvfIndex<S> {
    /// Open an existing index group and load its resident artifacts.
    pub async fn open(store: &ArrayStore, group_uri: &str) -> Result<Self> {
        let meta = build::read_group_meta(store, group_uri).await?;
        if meta.dtype != S::DTYPE {
            return Err(CumulusError::SchemaMismatch {
                expected: S::DTYPE,
                actual: meta.dtype,
            });
        }

        let centroids_array =
            DenseArray::open(store, &build::centroids_uri(group_uri)).await?;
        let centroids: ColMajorMatrix<S> = centroids_array.read_matrix().await?;
        if centroids.num_rows() != meta.dimension {
            return Err(CumulusError::ShapeMismatch {
                expected: meta.dimension,
                actual: centroids.num_rows(),
            });
        }
        if centroids.num_cols() != meta.nlist {
            return Err(CumulusError::ShapeMismatch {
                expected: meta.nlist,
                actual: centroids.num_cols(),
            });
        }

        let indices_array = DenseArray::open(store, &build::indices_uri(group_uri)).await?;
        let indices: Vec<u64> = indices_array.read_vector().await?;
        validate_indices(&indices, meta.nlist, meta.num_vectors as u64)?;

        let vectors = DenseArray::open(store, &build::vectors_uri(group_uri)).await?;
        let ids = DenseArray::open(store, &build::ids_uri(group_uri)).await?;
        if vectors.num_rows() != meta.dimension {
            return Err(CumulusError::ShapeMismatch {
                expected: meta.dimension,
                actual: vectors.num_rows(),
            });
        }
        if vectors.num_cols() != meta.num_vectors {
            return Err(CumulusError::ShapeMismatch {
                expected: meta.num_vectors,
                actual: vectors.num_cols(),
            });
        }
        if ids.num_cols() != meta.num_vectors {
            return Err(CumulusError::ShapeMismatch {
                expected: meta.num_vectors,
                actual: ids.num_cols(),
            });
        }

        info!(
            group = group_uri,
            dimension = meta.dimension,
            nlist = meta.nlist,
            num_vectors = meta.num_vectors,
            dtype = %meta.dtype,
            "opened IVF index"
        );

        Ok(Self {
            group_uri: group_uri.to_string(),
            centroids,
            indices,
            vectors,
            ids,
            num_vectors: meta.num_vectors,
        })
    }

    pub fn group_uri(&self) -> &str {
        &self.group_uri
    }

    pub fn dimension(&self) -> usize {
        self.centroids.num_rows()
    }

    /// Number of partitions (and centroids).
    pub fn num_partitions(&self) -> usize {
        self.centroids.num_cols()
    }

    pub fn num_vectors(&self) -> usize {
        self.num_vectors
    }

    pub fn centroids(&self) -> &ColMajorMatrix<S> {
        &self.centroids
    }

    pub fn indices(&self) -> &[u64] {
        &self.indices
    }

    /// Answer a k-NN query batch.
    ///
    /// `upper_bound == 0` keeps the whole shuffled database resident for the
    /// batch (infinite-RAM mode); any other value streams the active
    /// partitions through a window of at most `upper_bound` columns.
    pub async fn search(
        &self,
        ctx: &Context,
        queries: &ColMajorMatrix<S>,
        nprobe: usize,
        k_nn: usize,
        upper_bound: usize,
    ) -> Result<SearchMatches> {
        if upper_bound == 0 {
            search::query_infinite_ram(
                &self.vectors,
                &self.ids,
                &self.centroids,
                queries,
                &self.indices,
                nprobe,
                k_nn,
                ctx.nthreads(),
            )
            .await
        } else {
            search::query_finite_ram(
                &self.vectors,
                &self.ids,
                &self.centroids,
                queries,
                &self.indices,
                nprobe,
                k_nn,
                upper_bound,
                ctx.nthreads(),
            )
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_indices_accepts_well_formed() {
        assert!(validate_indices(&[0, 3, 3, 7, 10], 4, 10).is_ok());
        assert!(validate_indices(&[0, 0], 1, 0).is_ok());
    }

    #[test]
    fn test_validate_indices_rejects_wrong_length() {
        // The reference implementation silently extended short vectors;
        // here they are errors.
        assert!(matches!(
            validate_indices(&[0, 3, 7], 3, 10),
            Err(CumulusError::InvalidPartitioning(_))
        ));
    }

    #[test]
    fn test_validate_indices_rejects_nonzero_start() {
        assert!(matches!(
            validate_indices(&[1, 3, 10], 2, 10),
            Err(CumulusError::InvalidPartitioning(_))
        ));
    }

    #[test]
    fn test_validate_indices_rejects_decreasing() {
        assert!(matches!(
            validate_indices(&[0, 5, 3, 10], 3, 10),
            Err(CumulusError::InvalidPartitioning(_))
        ));
    }

    #[test]
    fn test_validate_indices_rejects_wrong_total() {
        assert!(matches!(
            validate_indices(&[0, 3, 9], 2, 10),
            Err(CumulusError::InvalidPartitioning(_))
        ));
    }
}
