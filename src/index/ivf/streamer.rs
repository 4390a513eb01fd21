//! Bounded-memory window over the active partitions of a shuffled database.
//!
//! Given the ordered list of partitions a query batch needs, the streamer
//! materializes as many whole partitions as fit into its column budget,
//! reading their vectors (and the matching shuffled ids) with one coalesced
//! multi-range request each. `advance` slides the window to the next batch
//! of partitions; partitions are never split across windows.

use std::ops::Range;
use tracing::debug;

use crate::error::{CumulusError, Result};
use crate::index::ivf::validate_indices;
use crate::matrix::ColMajorMatrix;
use crate::storage::DenseArray;
use crate::types::Scalar;

/// A moving window over the shuffled database restricted to a sorted list
/// of active partitions.
#[derive(Debug)]
pub struct PartitionedStreamer<S: Scalar> {
    vectors: DenseArray,
    ids_array: DenseArray,
    indices: Vec<u64>,
    active: Vec<usize>,
    /// Cumulative column counts over `active`; `active_offsets[i]` is the
    /// first streamed-column index of active partition `i`.
    active_offsets: Vec<usize>,
    window_cap: usize,

    buf: ColMajorMatrix<S>,
    ids: Vec<u64>,

    /// `[first, last)` into `active` for the current window.
    window_first_part: usize,
    window_last_part: usize,
    window_cols: usize,
    /// Streamed columns preceding the current window.
    col_offset: usize,
}

impl<S: Scalar> PartitionedStreamer<S> {
    /// Construct a streamer and load the first window.
    ///
    /// `active` must be sorted ascending and deduplicated. `upper_bound`
    /// caps the window width in columns; `0` means "no bound". A single
    /// partition wider than the bound is rejected with `PartitionTooLarge`
    /// (windows never split partitions, so it could never be served).
    pub async fn new(
        vectors: DenseArray,
        ids_array: DenseArray,
        indices: Vec<u64>,
        active: Vec<usize>,
        upper_bound: usize,
    ) -> Result<Self> {
        let nlist = indices.len().saturating_sub(1);
        validate_indices(&indices, nlist, vectors.num_cols() as u64)?;
        if ids_array.num_cols() != vectors.num_cols() {
            return Err(CumulusError::ShapeMismatch {
                expected: vectors.num_cols(),
                actual: ids_array.num_cols(),
            });
        }
        for pair in active.windows(2) {
            if pair[0] >= pair[1] {
                return Err(CumulusError::InvalidPartitioning(
                    "active partition list must be sorted and deduplicated".into(),
                ));
            }
        }
        if let Some(&last) = active.last() {
            if last >= nlist {
                return Err(CumulusError::InvalidPartitioning(format!(
                    "active partition {last} out of range for {nlist} partitions"
                )));
            }
        }

        let part_size =
            |p: usize| -> usize { (indices[p + 1] - indices[p]) as usize };

        let total_max_cols: usize = active.iter().map(|&p| part_size(p)).sum();
        let window_cap = if upper_bound == 0 {
            total_max_cols
        } else {
            upper_bound.min(total_max_cols)
        };

        if upper_bound != 0 {
            for &p in &active {
                if part_size(p) > window_cap {
                    return Err(CumulusError::PartitionTooLarge {
                        partition: p,
                        columns: part_size(p),
                        upper_bound: window_cap,
                    });
                }
            }
        }

        let mut active_offsets = Vec::with_capacity(active.len() + 1);
        let mut running = 0usize;
        active_offsets.push(0);
        for &p in &active {
            running += part_size(p);
            active_offsets.push(running);
        }

        let dimension = vectors.num_rows();
        let mut streamer = Self {
            vectors,
            ids_array,
            indices,
            active,
            active_offsets,
            window_cap,
            buf: ColMajorMatrix::new(dimension, window_cap),
            ids: vec![0; window_cap],
            window_first_part: 0,
            window_last_part: 0,
            window_cols: 0,
            col_offset: 0,
        };
        streamer.advance().await?;
        Ok(streamer)
    }

    /// Load the next batch of partitions into the window.
    ///
    /// Returns `false` once every active partition has been served; the
    /// terminating call leaves the cursors unchanged and the window empty.
    pub async fn advance(&mut self) -> Result<bool> {
        let first = self.window_last_part;
        let mut last = first;
        let mut cols = 0usize;
        while last < self.active.len() {
            let next = self.part_size(self.active[last]);
            if cols + next > self.window_cap {
                break;
            }
            cols += next;
            last += 1;
        }

        let parts = last - first;
        if (cols == 0) != (parts == 0) {
            return Err(CumulusError::InvalidPartitioning(format!(
                "window holds {parts} partitions but {cols} columns"
            )));
        }
        if parts == 0 {
            self.window_first_part = first;
            self.window_cols = 0;
            return Ok(false);
        }

        self.col_offset = self.active_offsets[first];
        self.window_first_part = first;
        self.window_last_part = last;
        self.window_cols = cols;

        // One coalesced read for the vectors, one for the ids.
        let col_ranges: Vec<Range<usize>> = self.active[first..last]
            .iter()
            .map(|&p| self.indices[p] as usize..self.indices[p + 1] as usize)
            .filter(|r| r.end > r.start)
            .collect();

        let dimension = self.buf.num_rows();
        self.vectors
            .read_block(&col_ranges, &mut self.buf.data_mut()[..cols * dimension])
            .await?;
        self.ids_array
            .read_block(&col_ranges, &mut self.ids[..cols])
            .await?;

        crate::metrics::STREAMER_WINDOWS_TOTAL.inc();
        debug!(
            first_part = first,
            num_parts = parts,
            num_cols = cols,
            col_offset = self.col_offset,
            "streamer window loaded"
        );
        Ok(true)
    }

    fn part_size(&self, p: usize) -> usize {
        (self.indices[p + 1] - self.indices[p]) as usize
    }

    /// Columns resident in the current window.
    pub fn num_cols(&self) -> usize {
        self.window_cols
    }

    /// Partitions resident in the current window.
    pub fn num_col_parts(&self) -> usize {
        self.window_last_part - self.window_first_part
    }

    /// Index into the active list of the window's first partition.
    pub fn col_part_offset(&self) -> usize {
        self.window_first_part
    }

    /// Streamed columns preceding the current window.
    pub fn col_offset(&self) -> usize {
        self.col_offset
    }

    /// Window-local column span of active partition `active_idx`. Valid only
    /// for partitions resident in the current window.
    pub fn part_cols(&self, active_idx: usize) -> Range<usize> {
        debug_assert!(
            active_idx >= self.window_first_part && active_idx < self.window_last_part
        );
        self.active_offsets[active_idx] - self.col_offset
            ..self.active_offsets[active_idx + 1] - self.col_offset
    }

    /// Column `i` of the window (window-local index).
    pub fn column(&self, i: usize) -> &[S] {
        debug_assert!(i < self.window_cols);
        self.buf.col(i)
    }

    /// Shuffled ids of the window's columns.
    pub fn ids(&self) -> &[u64] {
        &self.ids[..self.window_cols]
    }
}
