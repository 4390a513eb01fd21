//! Build phase: partition a database against trained centroids, shuffle it
//! so every partition's members are contiguous, and persist the index group.
//!
//! Group layout under one uri prefix:
//!
//! ```text
//! <group>/meta.json          dimension, nlist, num_vectors, dtype
//! <group>/centroids          dense 2-D (D, nlist)
//! <group>/shuffled_vectors   dense 2-D (D, N), partition-contiguous
//! <group>/shuffled_ids       dense 1-D (N), original vector ids
//! <group>/indices            dense 1-D (nlist + 1), partition boundaries
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CumulusError, Result};
use crate::index::flat;
use crate::index::ivf::kmeans::{self, KmeansInit, KmeansParams};
use crate::index::ivf::IvfIndex;
use crate::matrix::ColMajorMatrix;
use crate::storage::{ArrayStore, DenseArray};
use crate::types::{ElementType, Scalar};

// ---------------------------------------------------------------------------
// Group member uris
// ---------------------------------------------------------------------------

pub(crate) fn meta_key(group_uri: &str) -> String {
    format!("{group_uri}/meta.json")
}

pub(crate) fn centroids_uri(group_uri: &str) -> String {
    format!("{group_uri}/centroids")
}

pub(crate) fn vectors_uri(group_uri: &str) -> String {
    format!("{group_uri}/shuffled_vectors")
}

pub(crate) fn ids_uri(group_uri: &str) -> String {
    format!("{group_uri}/shuffled_ids")
}

pub(crate) fn indices_uri(group_uri: &str) -> String {
    format!("{group_uri}/indices")
}

/// Group metadata document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GroupMeta {
    pub dimension: usize,
    pub nlist: usize,
    pub num_vectors: usize,
    pub dtype: ElementType,
}

pub(crate) async fn read_group_meta(store: &ArrayStore, group_uri: &str) -> Result<GroupMeta> {
    let raw = store.get(&meta_key(group_uri)).await?;
    Ok(serde_json::from_slice(&raw)?)
}

// ---------------------------------------------------------------------------
// Build pipeline
// ---------------------------------------------------------------------------

/// Partition `database` against pre-trained `centroids`, shuffle it into
/// partition-contiguous order, and persist the group at `group_uri`.
///
/// Returns the opened in-memory handle. The shuffled-ids artifact maps each
/// shuffled column back to its original column index, so external identity
/// survives the reordering.
pub async fn build_index<S: Scalar>(
    store: &ArrayStore,
    group_uri: &str,
    database: &ColMajorMatrix<S>,
    centroids: &ColMajorMatrix<S>,
    nthreads: usize,
) -> Result<IvfIndex<S>> {
    let n = database.num_cols();
    let dimension = database.num_rows();
    let nlist = centroids.num_cols();

    if n == 0 {
        return Err(CumulusError::EmptyInput("database has no vectors".into()));
    }
    if nlist == 0 {
        return Err(CumulusError::EmptyInput("no centroids".into()));
    }
    if centroids.num_rows() != dimension {
        return Err(CumulusError::ShapeMismatch {
            expected: dimension,
            actual: centroids.num_rows(),
        });
    }

    let timer = crate::metrics::INDEX_BUILD_DURATION.start_timer();
    info!(group = group_uri, n, dimension, nlist, "building IVF index");

    // Assign each vector to its partition, then turn per-partition degrees
    // into boundary indices by prefix sum.
    let (_scores, parts) = flat::partition_with_scores(centroids, database, nthreads)?;

    let mut degrees = vec![0u64; nlist];
    for &part in &parts {
        degrees[part as usize] += 1;
    }

    let mut indices = vec![0u64; nlist + 1];
    for p in 0..nlist {
        indices[p + 1] = indices[p] + degrees[p];
    }

    // Scatter columns into partition-contiguous order, recording the
    // original id of each shuffled column.
    let mut write_cursor: Vec<u64> = indices[..nlist].to_vec();
    let mut shuffled = ColMajorMatrix::<S>::new(dimension, n);
    let mut shuffled_ids = vec![0u64; n];
    for (i, &part) in parts.iter().enumerate() {
        let dst = write_cursor[part as usize] as usize;
        shuffled.col_mut(dst).copy_from_slice(database.col(i));
        shuffled_ids[dst] = i as u64;
        write_cursor[part as usize] += 1;
    }

    for (p, &degree) in degrees.iter().enumerate() {
        debug!(partition = p, degree, "partition degree");
    }

    // Persist the group.
    DenseArray::create_matrix(store, &centroids_uri(group_uri), centroids).await?;
    DenseArray::create_matrix(store, &vectors_uri(group_uri), &shuffled).await?;
    DenseArray::create_vector(store, &ids_uri(group_uri), &shuffled_ids).await?;
    DenseArray::create_vector(store, &indices_uri(group_uri), &indices).await?;

    let meta = GroupMeta {
        dimension,
        nlist,
        num_vectors: n,
        dtype: S::DTYPE,
    };
    store
        .put(&meta_key(group_uri), Bytes::from(serde_json::to_vec(&meta)?))
        .await?;

    timer.observe_duration();
    info!(group = group_uri, n, nlist, "IVF index build complete");

    IvfIndex::open(store, group_uri).await
}

/// Train centroids on the database itself, then build and persist the
/// index group.
pub async fn train_and_build<S: Scalar>(
    store: &ArrayStore,
    group_uri: &str,
    database: &ColMajorMatrix<S>,
    init: KmeansInit,
    params: &KmeansParams,
) -> Result<IvfIndex<S>> {
    let centroids = kmeans::train(database, init, params)?;
    build_index(store, group_uri, database, &centroids, params.nthreads.max(1)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use std::sync::Arc;

    fn memory_store() -> ArrayStore {
        ArrayStore::new(Arc::new(InMemory::new()))
    }

    fn two_cluster_db() -> (ColMajorMatrix<f32>, ColMajorMatrix<f32>) {
        // Vectors alternate between the two clusters so the shuffle has
        // real work to do.
        let mut db = ColMajorMatrix::new(2, 6);
        let points = [
            [0.1f32, 0.0],
            [10.2, 0.1],
            [0.0, 0.2],
            [9.9, 0.0],
            [0.2, 0.1],
            [10.0, 0.3],
        ];
        for (j, p) in points.iter().enumerate() {
            db.col_mut(j).copy_from_slice(p);
        }

        let mut centroids = ColMajorMatrix::new(2, 2);
        centroids.col_mut(0).copy_from_slice(&[0.0, 0.0]);
        centroids.col_mut(1).copy_from_slice(&[10.0, 0.0]);
        (db, centroids)
    }

    #[tokio::test]
    async fn test_build_produces_monotone_indices() {
        let store = memory_store();
        let (db, centroids) = two_cluster_db();
        let index = build_index(&store, "idx", &db, &centroids, 2).await.unwrap();

        let indices = index.indices();
        assert_eq!(indices.len(), 3);
        assert_eq!(indices[0], 0);
        assert_eq!(indices[2], 6);
        assert!(indices.windows(2).all(|w| w[0] <= w[1]));
        // Both clusters hold three members.
        assert_eq!(indices[1], 3);
    }

    #[tokio::test]
    async fn test_partition_reconstruction() {
        // The ids found inside partition p must be exactly the vectors
        // whose nearest centroid is p.
        let store = memory_store();
        let (db, centroids) = two_cluster_db();
        let index = build_index(&store, "idx", &db, &centroids, 1).await.unwrap();

        let shuffled: Vec<u64> = DenseArray::open(&store, &ids_uri("idx"))
            .await
            .unwrap()
            .read_vector()
            .await
            .unwrap();

        let assignments = kmeans::predict(&centroids, &db);
        let indices = index.indices();
        for p in 0..2u64 {
            let mut in_partition: Vec<u64> =
                shuffled[indices[p as usize] as usize..indices[p as usize + 1] as usize].to_vec();
            in_partition.sort_unstable();
            let mut expected: Vec<u64> = assignments
                .iter()
                .enumerate()
                .filter(|&(_, &a)| a == p)
                .map(|(i, _)| i as u64)
                .collect();
            expected.sort_unstable();
            assert_eq!(in_partition, expected, "partition {p} mismatch");
        }
    }

    #[tokio::test]
    async fn test_shuffled_vectors_match_ids() {
        let store = memory_store();
        let (db, centroids) = two_cluster_db();
        build_index(&store, "idx", &db, &centroids, 1).await.unwrap();

        let shuffled: ColMajorMatrix<f32> = DenseArray::open(&store, &vectors_uri("idx"))
            .await
            .unwrap()
            .read_matrix()
            .await
            .unwrap();
        let ids: Vec<u64> = DenseArray::open(&store, &ids_uri("idx"))
            .await
            .unwrap()
            .read_vector()
            .await
            .unwrap();

        for (col, &orig) in ids.iter().enumerate() {
            assert_eq!(shuffled.col(col), db.col(orig as usize));
        }
    }

    #[tokio::test]
    async fn test_open_rejects_wrong_element_type() {
        let store = memory_store();
        let (db, centroids) = two_cluster_db();
        build_index(&store, "idx", &db, &centroids, 1).await.unwrap();

        match IvfIndex::<u8>::open(&store, "idx").await {
            Err(CumulusError::SchemaMismatch { expected, actual }) => {
                assert_eq!(expected, ElementType::Uint8);
                assert_eq!(actual, ElementType::Float32);
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_database_rejected() {
        let store = memory_store();
        let db = ColMajorMatrix::<f32>::new(2, 0);
        let centroids = ColMajorMatrix::<f32>::new(2, 2);
        assert!(matches!(
            build_index(&store, "idx", &db, &centroids, 1).await,
            Err(CumulusError::EmptyInput(_))
        ));
    }

    #[tokio::test]
    async fn test_u8_index_roundtrip() {
        let store = memory_store();
        let mut db = ColMajorMatrix::<u8>::new(2, 4);
        for (j, p) in [[0u8, 1], [200, 200], [2, 0], [199, 201]].iter().enumerate() {
            db.col_mut(j).copy_from_slice(p);
        }
        let mut centroids = ColMajorMatrix::<u8>::new(2, 2);
        centroids.col_mut(0).copy_from_slice(&[0, 0]);
        centroids.col_mut(1).copy_from_slice(&[200, 200]);

        let index = build_index(&store, "idx8", &db, &centroids, 1).await.unwrap();
        assert_eq!(index.num_vectors(), 4);
        assert_eq!(index.indices(), &[0, 2, 4]);
    }
}
