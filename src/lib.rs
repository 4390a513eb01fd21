//! Cumulus: object-storage-native IVF vector similarity search core.
//!
//! The corpus is clustered with k-means, reordered so every partition's
//! vectors are contiguous, and persisted as dense arrays. Queries rank
//! centroids, then scan only the `nprobe` most promising partitions —
//! either with the whole shuffled database resident, or streamed through
//! a bounded-memory window when the corpus exceeds RAM.

pub mod config;
pub mod context;
pub mod error;
pub mod index;
pub mod matrix;
pub mod metrics;
pub mod storage;
pub mod types;
