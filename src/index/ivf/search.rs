//! IVF query engines.
//!
//! Both modes start the same way: rank centroids for every query and keep
//! the top `nprobe` as that query's probe list. The infinite-RAM engine
//! then holds the whole shuffled database resident and scans each query's
//! probed partitions independently. The finite-RAM engine inverts the
//! probes into a centroid-to-queries map, streams the active partitions
//! through a bounded window, and lets each worker scan whole partitions
//! for every query interested in them, collecting candidates into a
//! per-thread grid of bounded heaps that is folded at the end.

use tracing::debug;

use crate::error::{CumulusError, Result};
use crate::index::flat::{self, squared_l2};
use crate::index::heap::BoundedHeap;
use crate::index::ivf::streamer::PartitionedStreamer;
use crate::index::ivf::validate_indices;
use crate::matrix::ColMajorMatrix;
use crate::storage::DenseArray;
use crate::types::Scalar;

/// Top-k result for a query batch: column `j` holds query `j`'s neighbors,
/// ascending by distance. Both matrices have shape `(k_nn, num_queries)`.
///
/// Distances are Euclidean (the square root is taken once at extraction).
/// When a query observed fewer than `k_nn` candidates, the tail of its
/// column is padded with `u64::MAX` ids and infinite distances.
#[derive(Debug, Clone)]
pub struct SearchMatches {
    pub distances: ColMajorMatrix<f32>,
    pub ids: ColMajorMatrix<u64>,
}

/// Sentinel id for unfilled result slots.
pub const NO_MATCH: u64 = u64::MAX;

/// Query with the entire shuffled database resident.
///
/// Parallelism is per query: each worker owns a contiguous slice of
/// queries together with their heaps and output columns.
#[allow(clippy::too_many_arguments)]
pub async fn query_infinite_ram<S: Scalar>(
    db: &DenseArray,
    ids: &DenseArray,
    centroids: &ColMajorMatrix<S>,
    queries: &ColMajorMatrix<S>,
    indices: &[u64],
    nprobe: usize,
    k_nn: usize,
    nthreads: usize,
) -> Result<SearchMatches> {
    let timer = crate::metrics::QUERY_DURATION
        .with_label_values(&["infinite_ram"])
        .start_timer();

    check_query_shapes(centroids, queries)?;
    validate_indices(indices, centroids.num_cols(), db.num_cols() as u64)?;

    let num_queries = queries.num_cols();
    let mut matches = empty_matches(k_nn, num_queries);
    if k_nn == 0 || num_queries == 0 {
        return Ok(matches);
    }

    let shuffled_db: ColMajorMatrix<S> = db.read_matrix().await?;
    let shuffled_ids: Vec<u64> = ids.read_vector().await?;
    if shuffled_ids.len() != shuffled_db.num_cols() {
        return Err(CumulusError::ShapeMismatch {
            expected: shuffled_db.num_cols(),
            actual: shuffled_ids.len(),
        });
    }
    if shuffled_db.num_rows() != queries.num_rows() {
        return Err(CumulusError::ShapeMismatch {
            expected: queries.num_rows(),
            actual: shuffled_db.num_rows(),
        });
    }

    let probes = flat::assign_nearest(centroids, queries, nprobe, nthreads)?;
    let nprobe = probes.num_rows();

    let nthreads = nthreads.max(1).min(num_queries);
    let chunk_queries = num_queries.div_ceil(nthreads);

    std::thread::scope(|scope| {
        for (chunk_idx, (dist_chunk, id_chunk)) in matches
            .distances
            .data_mut()
            .chunks_mut(chunk_queries * k_nn)
            .zip(matches.ids.data_mut().chunks_mut(chunk_queries * k_nn))
            .enumerate()
        {
            let first_query = chunk_idx * chunk_queries;
            let shuffled_db = &shuffled_db;
            let shuffled_ids = &shuffled_ids;
            let probes = &probes;
            scope.spawn(move || {
                for (slot, (dist_col, id_col)) in dist_chunk
                    .chunks_mut(k_nn)
                    .zip(id_chunk.chunks_mut(k_nn))
                    .enumerate()
                {
                    let j = first_query + slot;
                    let q_col = queries.col(j);
                    let mut heap = BoundedHeap::smallest(k_nn);
                    for p in 0..nprobe {
                        let part = probes.col(j)[p] as usize;
                        let start = indices[part] as usize;
                        let stop = indices[part + 1] as usize;
                        for i in start..stop {
                            let score = squared_l2(q_col, shuffled_db.col(i));
                            heap.insert(score, shuffled_ids[i]);
                        }
                    }
                    fill_column(heap, dist_col, id_col);
                }
            });
        }
    });

    crate::metrics::QUERIES_TOTAL
        .with_label_values(&["infinite_ram"])
        .inc();
    timer.observe_duration();
    Ok(matches)
}

/// Query with at most `upper_bound` shuffled columns resident at a time.
///
/// `upper_bound == 0` requests "ingest everything reachable", which
/// degrades to a single window over all active partitions.
#[allow(clippy::too_many_arguments)]
pub async fn query_finite_ram<S: Scalar>(
    db: &DenseArray,
    ids: &DenseArray,
    centroids: &ColMajorMatrix<S>,
    queries: &ColMajorMatrix<S>,
    indices: &[u64],
    nprobe: usize,
    k_nn: usize,
    upper_bound: usize,
    nthreads: usize,
) -> Result<SearchMatches> {
    let timer = crate::metrics::QUERY_DURATION
        .with_label_values(&["finite_ram"])
        .start_timer();

    check_query_shapes(centroids, queries)?;
    validate_indices(indices, centroids.num_cols(), db.num_cols() as u64)?;
    if db.num_rows() != queries.num_rows() {
        return Err(CumulusError::ShapeMismatch {
            expected: queries.num_rows(),
            actual: db.num_rows(),
        });
    }

    let num_queries = queries.num_cols();
    let mut matches = empty_matches(k_nn, num_queries);
    if k_nn == 0 || num_queries == 0 {
        return Ok(matches);
    }

    let probes = flat::assign_nearest(centroids, queries, nprobe, nthreads)?;
    let nprobe = probes.num_rows();

    // Invert the probes matrix: the sorted, deduplicated set of active
    // partitions, and for each one the queries that probe it. Active
    // indices, not global partition ids, key the query lists so workers
    // can address them directly.
    let mut active: Vec<usize> = probes.data().iter().map(|&p| p as usize).collect();
    active.sort_unstable();
    active.dedup();

    let mut queries_for: Vec<Vec<u32>> = vec![Vec::new(); active.len()];
    for j in 0..num_queries {
        for p in 0..nprobe {
            let part = probes.col(j)[p] as usize;
            // `active` was built from these same probes, so the lookup
            // always succeeds.
            if let Ok(slot) = active.binary_search(&part) {
                queries_for[slot].push(j as u32);
            }
        }
    }

    debug!(
        num_queries,
        nprobe,
        active_partitions = active.len(),
        upper_bound,
        "finite-RAM query"
    );

    let mut streamer = PartitionedStreamer::<S>::new(
        db.clone(),
        ids.clone(),
        indices.to_vec(),
        active,
        upper_bound,
    )
    .await?;

    let nthreads = nthreads.max(1);
    // Per-thread, per-query heap grid; workers never share a heap.
    let mut heaps: Vec<Vec<BoundedHeap<f32, u64>>> = (0..nthreads)
        .map(|_| (0..num_queries).map(|_| BoundedHeap::smallest(k_nn)).collect())
        .collect();

    loop {
        let num_parts = streamer.num_col_parts();
        if num_parts == 0 {
            break;
        }
        let parts_per_thread = num_parts.div_ceil(nthreads);

        std::thread::scope(|scope| {
            for (w, thread_heaps) in heaps.iter_mut().enumerate() {
                let first_part = (w * parts_per_thread).min(num_parts);
                let last_part = ((w + 1) * parts_per_thread).min(num_parts);
                if first_part == last_part {
                    continue;
                }
                let streamer = &streamer;
                let queries_for = &queries_for;
                scope.spawn(move || {
                    for p in first_part..last_part {
                        let active_idx = p + streamer.col_part_offset();
                        let span = streamer.part_cols(active_idx);
                        for &j in &queries_for[active_idx] {
                            let q_col = queries.col(j as usize);
                            let heap = &mut thread_heaps[j as usize];
                            for i in span.clone() {
                                let score = squared_l2(q_col, streamer.column(i));
                                heap.insert(score, streamer.ids()[i]);
                            }
                        }
                    }
                });
            }
        });

        if !streamer.advance().await? {
            break;
        }
    }

    // Fold the grid into its first row; bounded insertion preserves the
    // top-k invariant.
    if let Some((first_row, other_rows)) = heaps.split_first_mut() {
        for row in other_rows {
            for (merged, heap) in first_row.iter_mut().zip(row.iter()) {
                for &(score, id) in heap.iter() {
                    merged.insert(score, id);
                }
            }
        }
        for (j, heap) in first_row.iter_mut().enumerate() {
            fill_column(
                std::mem::take(heap),
                matches.distances.col_mut(j),
                matches.ids.col_mut(j),
            );
        }
    }

    crate::metrics::QUERIES_TOTAL
        .with_label_values(&["finite_ram"])
        .inc();
    timer.observe_duration();
    Ok(matches)
}

fn check_query_shapes<S: Scalar>(
    centroids: &ColMajorMatrix<S>,
    queries: &ColMajorMatrix<S>,
) -> Result<()> {
    if centroids.num_rows() != queries.num_rows() {
        return Err(CumulusError::ShapeMismatch {
            expected: centroids.num_rows(),
            actual: queries.num_rows(),
        });
    }
    Ok(())
}

fn empty_matches(k_nn: usize, num_queries: usize) -> SearchMatches {
    SearchMatches {
        distances: ColMajorMatrix::new(k_nn, num_queries),
        ids: ColMajorMatrix::new(k_nn, num_queries),
    }
}

/// Sort a query's heap and emit its column, square-rooting scores on the
/// way out and padding unfilled slots with sentinels.
fn fill_column(heap: BoundedHeap<f32, u64>, dist_col: &mut [f32], id_col: &mut [u64]) {
    let sorted = heap.into_sorted_vec();
    for slot in 0..dist_col.len() {
        match sorted.get(slot) {
            Some(&(score, id)) => {
                dist_col[slot] = score.sqrt();
                id_col[slot] = id;
            }
            None => {
                dist_col[slot] = f32::INFINITY;
                id_col[slot] = NO_MATCH;
            }
        }
    }
}
