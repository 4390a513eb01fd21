//! Flat (brute-force) scoring kernels and their parallel drivers.
//!
//! These kernels are the inner loops of both training and querying: nearest
//! centroid assignment for every database vector, and top-`nprobe` centroid
//! selection for every query. Work is split over the outer dimension into
//! contiguous chunks, one scoped worker thread per chunk, each writing a
//! disjoint slice of the output so no synchronization is needed.

use crate::error::{CumulusError, Result};
use crate::index::heap::BoundedHeap;
use crate::matrix::ColMajorMatrix;
use crate::types::Scalar;

/// Squared Euclidean distance between two columns, accumulated in `f32`.
#[inline]
pub fn squared_l2<S: Scalar>(a: &[S], b: &[S]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut sum = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        let d = x.to_f32() - y.to_f32();
        sum += d * d;
    }
    sum
}

/// For each query column, the `nprobe` nearest centroid indices, ascending
/// by squared distance down each output column.
///
/// `nprobe` is clamped to the centroid count; the output has
/// `min(nprobe, nlist)` rows and one column per query.
pub fn assign_nearest<S: Scalar>(
    centroids: &ColMajorMatrix<S>,
    queries: &ColMajorMatrix<S>,
    nprobe: usize,
    nthreads: usize,
) -> Result<ColMajorMatrix<u64>> {
    if centroids.num_rows() != queries.num_rows() {
        return Err(CumulusError::ShapeMismatch {
            expected: centroids.num_rows(),
            actual: queries.num_rows(),
        });
    }

    let num_queries = queries.num_cols();
    let nprobe = nprobe.min(centroids.num_cols());
    let mut top = ColMajorMatrix::<u64>::new(nprobe, num_queries);
    if nprobe == 0 || num_queries == 0 {
        return Ok(top);
    }

    let nthreads = nthreads.max(1).min(num_queries);
    let chunk_queries = num_queries.div_ceil(nthreads);

    std::thread::scope(|scope| {
        for (chunk_idx, out_chunk) in top
            .data_mut()
            .chunks_mut(chunk_queries * nprobe)
            .enumerate()
        {
            let first_query = chunk_idx * chunk_queries;
            scope.spawn(move || {
                for (slot, out_col) in out_chunk.chunks_mut(nprobe).enumerate() {
                    let q_col = queries.col(first_query + slot);
                    let mut heap = BoundedHeap::smallest(nprobe);
                    for c in 0..centroids.num_cols() {
                        let score = squared_l2(q_col, centroids.col(c));
                        heap.insert(score, c as u64);
                    }
                    for (dst, (_, id)) in out_col.iter_mut().zip(heap.into_sorted_vec()) {
                        *dst = id;
                    }
                }
            });
        }
    });

    Ok(top)
}

/// For each vector column, the nearest centroid's squared distance and
/// index. Equivalent to [`assign_nearest`] with `nprobe == 1`, but returns
/// the scores as well (the training loop needs both).
pub fn partition_with_scores<S: Scalar>(
    centroids: &ColMajorMatrix<S>,
    vectors: &ColMajorMatrix<S>,
    nthreads: usize,
) -> Result<(Vec<f32>, Vec<u64>)> {
    if centroids.num_rows() != vectors.num_rows() {
        return Err(CumulusError::ShapeMismatch {
            expected: centroids.num_rows(),
            actual: vectors.num_rows(),
        });
    }
    if centroids.num_cols() == 0 {
        return Err(CumulusError::EmptyInput("no centroids".into()));
    }

    let n = vectors.num_cols();
    let mut scores = vec![0.0f32; n];
    let mut parts = vec![0u64; n];
    if n == 0 {
        return Ok((scores, parts));
    }

    let nthreads = nthreads.max(1).min(n);
    let chunk = n.div_ceil(nthreads);

    std::thread::scope(|scope| {
        for (chunk_idx, (score_chunk, part_chunk)) in scores
            .chunks_mut(chunk)
            .zip(parts.chunks_mut(chunk))
            .enumerate()
        {
            let first = chunk_idx * chunk;
            scope.spawn(move || {
                for (slot, (score_out, part_out)) in score_chunk
                    .iter_mut()
                    .zip(part_chunk.iter_mut())
                    .enumerate()
                {
                    let v_col = vectors.col(first + slot);
                    let mut best_score = f32::MAX;
                    let mut best_part = 0u64;
                    for c in 0..centroids.num_cols() {
                        let score = squared_l2(v_col, centroids.col(c));
                        if score < best_score {
                            best_score = score;
                            best_part = c as u64;
                        }
                    }
                    *score_out = best_score;
                    *part_out = best_part;
                }
            });
        }
    });

    Ok((scores, parts))
}
