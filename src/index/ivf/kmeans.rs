//! k-means centroid training: kmeans++ / random seeding and Lloyd
//! iteration with low-degree cluster reassignment.
//!
//! Each iteration assigns every training vector to its nearest centroid,
//! accumulates per-centroid sums and membership counts (degrees), and then
//! reseeds pathologically small clusters from the highest-residual training
//! vectors before recomputing the means. Convergence is declared when the
//! largest squared centroid shift falls below `tol` times the total squared
//! centroid weight.

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::resolve_nthreads;
use crate::error::{CumulusError, Result};
use crate::index::flat;
use crate::index::heap::BoundedHeap;
use crate::matrix::ColMajorMatrix;
use crate::types::Scalar;

/// Centroid initialization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KmeansInit {
    /// Leave the centroid matrix as constructed (zeros); Lloyd iteration
    /// and reassignment must recover from it. Mostly useful for tests.
    None,
    /// Sample `nlist` distinct training vectors uniformly.
    Random,
    /// kmeans++ (Arthur and Vassilvitskii, 2007): sample each next centroid
    /// with probability proportional to its squared distance from the
    /// nearest centroid chosen so far.
    Kmeanspp,
}

/// Training parameters.
#[derive(Debug, Clone)]
pub struct KmeansParams {
    /// Number of centroids to produce.
    pub nlist: usize,
    /// Maximum Lloyd iterations; reaching it is normal termination.
    pub max_iter: usize,
    /// Relative Frobenius convergence tolerance.
    pub tol: f64,
    /// Fraction of low-degree centroids eligible for reseeding per
    /// iteration.
    pub reassign_ratio: f64,
    /// Worker count for the assignment kernels. `0` auto-detects.
    pub nthreads: usize,
    /// RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for KmeansParams {
    fn default() -> Self {
        Self {
            nlist: 256,
            max_iter: 25,
            tol: 2.5e-5,
            reassign_ratio: 0.075,
            nthreads: 0,
            seed: None,
        }
    }
}

impl KmeansParams {
    pub fn from_config(config: &crate::config::TrainingConfig, nthreads: usize) -> Self {
        Self {
            nlist: config.nlist,
            max_iter: config.max_iter,
            tol: config.tol,
            reassign_ratio: config.reassign_ratio,
            nthreads,
            seed: config.seed,
        }
    }
}

/// Train `params.nlist` centroids on the given training set.
///
/// The returned matrix has the training set's element type and dimension,
/// one centroid per column. Reaching `max_iter` without convergence is not
/// an error.
pub fn train<S: Scalar>(
    training_set: &ColMajorMatrix<S>,
    init: KmeansInit,
    params: &KmeansParams,
) -> Result<ColMajorMatrix<S>> {
    let n = training_set.num_cols();
    let dimension = training_set.num_rows();

    if n == 0 {
        return Err(CumulusError::EmptyInput("training set has no vectors".into()));
    }
    if params.nlist == 0 {
        return Err(CumulusError::EmptyInput("nlist must be > 0".into()));
    }
    if params.nlist > n {
        // A trained index must hold exactly nlist centroids, so there is no
        // way to seed them from fewer distinct vectors.
        return Err(CumulusError::ShapeMismatch {
            expected: params.nlist,
            actual: n,
        });
    }

    let timer = crate::metrics::TRAINING_DURATION.start_timer();
    let nthreads = resolve_nthreads(params.nthreads);
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!(
        n,
        nlist = params.nlist,
        dimension,
        max_iter = params.max_iter,
        init = ?init,
        "starting k-means training"
    );

    let mut centroids = ColMajorMatrix::<S>::new(dimension, params.nlist);
    match init {
        KmeansInit::None => {}
        KmeansInit::Random => random_init(training_set, &mut centroids, &mut rng),
        KmeansInit::Kmeanspp => kmeans_pp(training_set, &mut centroids, nthreads, &mut rng)?,
    }

    lloyd(training_set, &mut centroids, params, nthreads)?;

    timer.observe_duration();
    Ok(centroids)
}

/// Nearest centroid index for each vector column. Single-threaded; used by
/// tests and callers that only need plain assignments.
pub fn predict<S: Scalar>(centroids: &ColMajorMatrix<S>, vectors: &ColMajorMatrix<S>) -> Vec<u64> {
    let mut assignments = Vec::with_capacity(vectors.num_cols());
    for v_col in vectors.columns() {
        let mut best_score = f32::MAX;
        let mut best = 0u64;
        for c in 0..centroids.num_cols() {
            let score = flat::squared_l2(v_col, centroids.col(c));
            if score < best_score {
                best_score = score;
                best = c as u64;
            }
        }
        assignments.push(best);
    }
    assignments
}

/// Seed centroids from `nlist` distinct training vectors chosen uniformly.
fn random_init<S: Scalar>(
    training_set: &ColMajorMatrix<S>,
    centroids: &mut ColMajorMatrix<S>,
    rng: &mut StdRng,
) {
    let n = training_set.num_cols();
    let mut visited = vec![false; n];
    for c in 0..centroids.num_cols() {
        let mut index;
        loop {
            index = rng.gen_range(0..n);
            if !visited[index] {
                break;
            }
        }
        visited[index] = true;
        centroids.col_mut(c).copy_from_slice(training_set.col(index));
    }
}

/// kmeans++ seeding.
///
/// Maintains, for every training vector, its squared distance to the
/// nearest centroid chosen so far; only the newest centroid can lower it,
/// so each round is one parallel pass over the training set followed by a
/// weighted draw.
fn kmeans_pp<S: Scalar>(
    training_set: &ColMajorMatrix<S>,
    centroids: &mut ColMajorMatrix<S>,
    nthreads: usize,
    rng: &mut StdRng,
) -> Result<()> {
    let n = training_set.num_cols();
    let nlist = centroids.num_cols();

    let first = rng.gen_range(0..n);
    centroids.col_mut(0).copy_from_slice(training_set.col(first));

    // Sentinel larger than any real squared distance; every entry is
    // overwritten by the first update pass below.
    let mut distances = vec![f64::MAX / 8192.0; n];

    for i in 1..nlist {
        // The newest centroid is the only one that can shrink a distance.
        let newest = i - 1;
        update_min_distances(training_set, centroids.col(newest), &mut distances, nthreads);

        // Sampling proportional to squared distance; the distribution
        // normalizes the weights internally.
        let next = match WeightedIndex::new(&distances) {
            Ok(dist) => dist.sample(rng),
            Err(_) => {
                // Every remaining vector coincides with a chosen centroid.
                warn!(
                    chosen = i,
                    nlist, "all residual distances are zero, duplicating last centroid"
                );
                for j in i..nlist {
                    let prev = centroids.col(j - 1).to_vec();
                    centroids.col_mut(j).copy_from_slice(&prev);
                }
                return Ok(());
            }
        };
        centroids.col_mut(i).copy_from_slice(training_set.col(next));
        distances[next] = 0.0;
    }

    Ok(())
}

/// One parallel pass lowering each vector's distance against a new centroid.
fn update_min_distances<S: Scalar>(
    training_set: &ColMajorMatrix<S>,
    centroid: &[S],
    distances: &mut [f64],
    nthreads: usize,
) {
    let n = distances.len();
    let nthreads = nthreads.max(1).min(n.max(1));
    let chunk = n.div_ceil(nthreads);

    std::thread::scope(|scope| {
        for (chunk_idx, dist_chunk) in distances.chunks_mut(chunk).enumerate() {
            let first = chunk_idx * chunk;
            scope.spawn(move || {
                for (slot, d) in dist_chunk.iter_mut().enumerate() {
                    let score = flat::squared_l2(training_set.col(first + slot), centroid) as f64;
                    if score < *d {
                        *d = score;
                    }
                }
            });
        }
    });
}

/// Lloyd iteration with low-degree reassignment.
fn lloyd<S: Scalar>(
    training_set: &ColMajorMatrix<S>,
    centroids: &mut ColMajorMatrix<S>,
    params: &KmeansParams,
    nthreads: usize,
) -> Result<()> {
    let n = training_set.num_cols();
    let dimension = training_set.num_rows();
    let nlist = centroids.num_cols();

    let mut sums = ColMajorMatrix::<f32>::new(dimension, nlist);
    let mut degrees = vec![0u64; nlist];

    // How many centroids to try to fix up per iteration.
    let heap_size = (params.reassign_ratio * nlist as f64).ceil() as usize + 5;

    for iter in 0..params.max_iter {
        let (scores, parts) = flat::partition_with_scores(centroids, training_set, nthreads)?;

        sums.data_mut().fill(0.0);
        degrees.fill(0);

        let mut high_scores: BoundedHeap<f32, u64> = BoundedHeap::largest(heap_size);
        for (i, (&score, &part)) in scores.iter().zip(parts.iter()).enumerate() {
            let centroid = sums.col_mut(part as usize);
            for (acc, v) in centroid.iter_mut().zip(training_set.col(i)) {
                *acc += v.to_f32();
            }
            degrees[part as usize] += 1;
            high_scores.insert(score, i as u64);
        }

        let mut low_degrees: BoundedHeap<u64, u64> = BoundedHeap::smallest(heap_size);
        let mut max_degree = 0u64;
        for (c, &degree) in degrees.iter().enumerate() {
            max_degree = max_degree.max(degree);
            low_degrees.insert(degree, c as u64);
        }
        let lower_degree_bound = (max_degree as f64 * params.reassign_ratio).ceil() as u64;

        // Move the highest-scoring vectors into the lowest-degree
        // partitions. Skipped on the final iteration.
        if iter != params.max_iter - 1 {
            let lows = low_degrees.into_sorted_vec();
            let highs = high_scores.into_sorted_vec();
            let mut reassigned = 0usize;
            for (&(degree, zero_part), &(_score, vector_id)) in lows.iter().zip(highs.iter()) {
                if degree > lower_degree_bound {
                    break;
                }
                let old_part = parts[vector_id as usize] as usize;
                let vector = training_set.col(vector_id as usize);

                let low_centroid = sums.col_mut(zero_part as usize);
                for (dst, v) in low_centroid.iter_mut().zip(vector) {
                    *dst = v.to_f32();
                }
                let old_centroid = sums.col_mut(old_part);
                for (dst, v) in old_centroid.iter_mut().zip(vector) {
                    *dst -= v.to_f32();
                }
                degrees[zero_part as usize] += 1;
                degrees[old_part] -= 1;
                reassigned += 1;
            }
            if reassigned > 0 {
                debug!(iter, reassigned, lower_degree_bound, "reseeded low-degree centroids");
            }
        }

        // Finalize means and check convergence. Zero-degree centroids keep
        // their previous value and contribute nothing to either sum.
        let mut max_diff = 0.0f64;
        let mut total_weight = 0.0f64;
        for c in 0..nlist {
            if degrees[c] == 0 {
                continue;
            }
            let inv = 1.0 / degrees[c] as f32;
            let old = centroids.col_mut(c);
            let mean = sums.col_mut(c);
            let mut diff = 0.0f64;
            for (o, m) in old.iter_mut().zip(mean.iter_mut()) {
                *m *= inv;
                total_weight += (*m as f64) * (*m as f64);
                let d = (o.to_f32() - *m) as f64;
                diff += d * d;
                *o = S::from_f32(*m);
            }
            max_diff = max_diff.max(diff);
        }

        debug!(
            iter,
            max_diff,
            total_weight,
            tol = params.tol,
            "lloyd iteration complete"
        );

        if max_diff < params.tol * total_weight {
            info!(iterations = iter + 1, max_diff, "k-means converged");
            return Ok(());
        }
    }

    warn!(
        max_iter = params.max_iter,
        "k-means reached the iteration limit without converging, using current centroids"
    );
    Ok(())
}
