//! Persistent dense typed arrays with coalesced range reads.
//!
//! An array is a pair of objects under one uri prefix:
//!
//! - `<uri>/schema.json` — element type and shape (`[rows, cols]` for 2-D,
//!   `[len]` for 1-D), cell order is column-major.
//! - `<uri>/data.bin` — raw little-endian cells with no padding.
//!
//! 2-D reads address whole columns: because cells are column-major and
//! columns are full rows, a contiguous column interval maps to one
//! contiguous byte range. [`DenseArray::read_block`] turns a set of column
//! intervals into a single multi-range storage request.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

use crate::error::{CumulusError, Result};
use crate::matrix::ColMajorMatrix;
use crate::storage::ArrayStore;
use crate::types::{ArrayElement, ElementType};

/// On-disk array schema document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArraySchema {
    /// Cell element type.
    pub dtype: ElementType,
    /// `[rows, cols]` for 2-D arrays, `[len]` for 1-D arrays.
    pub shape: Vec<u64>,
}

impl ArraySchema {
    fn validate(&self) -> Result<()> {
        match self.shape.len() {
            1 | 2 => Ok(()),
            n => Err(CumulusError::MalformedSchema(format!(
                "expected 1 or 2 dimensions, got {n}"
            ))),
        }
    }
}

fn schema_key(uri: &str) -> String {
    format!("{uri}/schema.json")
}

fn data_key(uri: &str) -> String {
    format!("{uri}/data.bin")
}

/// Handle to a persistent dense array opened for reading.
#[derive(Debug, Clone)]
pub struct DenseArray {
    store: ArrayStore,
    uri: String,
    schema: ArraySchema,
}

impl DenseArray {
    /// Open an existing array and load its schema.
    pub async fn open(store: &ArrayStore, uri: &str) -> Result<Self> {
        let raw = store.get(&schema_key(uri)).await?;
        let schema: ArraySchema = serde_json::from_slice(&raw)?;
        schema.validate()?;
        debug!(uri, dtype = %schema.dtype, shape = ?schema.shape, "opened array");
        Ok(Self {
            store: store.clone(),
            uri: uri.to_string(),
            schema,
        })
    }

    /// Persist a 2-D column-major matrix as a new array.
    pub async fn create_matrix<S: ArrayElement>(
        store: &ArrayStore,
        uri: &str,
        matrix: &ColMajorMatrix<S>,
    ) -> Result<Self> {
        let schema = ArraySchema {
            dtype: S::DTYPE,
            shape: vec![matrix.num_rows() as u64, matrix.num_cols() as u64],
        };
        Self::create(store, uri, schema, matrix.data()).await
    }

    /// Persist a 1-D vector as a new array.
    pub async fn create_vector<S: ArrayElement>(
        store: &ArrayStore,
        uri: &str,
        values: &[S],
    ) -> Result<Self> {
        let schema = ArraySchema {
            dtype: S::DTYPE,
            shape: vec![values.len() as u64],
        };
        Self::create(store, uri, schema, values).await
    }

    async fn create<S: ArrayElement>(
        store: &ArrayStore,
        uri: &str,
        schema: ArraySchema,
        cells: &[S],
    ) -> Result<Self> {
        let mut data = Vec::with_capacity(cells.len() * S::BYTE_WIDTH);
        S::write_le(cells, &mut data);
        store.put(&data_key(uri), Bytes::from(data)).await?;
        store
            .put(
                &schema_key(uri),
                Bytes::from(serde_json::to_vec(&schema)?),
            )
            .await?;
        debug!(uri, dtype = %schema.dtype, shape = ?schema.shape, "created array");
        Ok(Self {
            store: store.clone(),
            uri: uri.to_string(),
            schema,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn schema(&self) -> &ArraySchema {
        &self.schema
    }

    /// Rows per column: `shape[0]` for 2-D arrays, `1` for 1-D arrays.
    pub fn num_rows(&self) -> usize {
        if self.schema.shape.len() == 2 {
            self.schema.shape[0] as usize
        } else {
            1
        }
    }

    /// Column count for 2-D arrays, element count for 1-D arrays.
    pub fn num_cols(&self) -> usize {
        *self.schema.shape.last().unwrap_or(&0) as usize
    }

    fn check_dtype(&self, expected: ElementType) -> Result<()> {
        if self.schema.dtype != expected {
            return Err(CumulusError::SchemaMismatch {
                expected,
                actual: self.schema.dtype,
            });
        }
        Ok(())
    }

    /// Read the union of the given column intervals into `buf`, in interval
    /// order, using one coalesced multi-range storage request.
    ///
    /// `col_ranges` must be disjoint, ascending half-open intervals. `buf`
    /// must hold exactly `num_rows() * total_cols` elements. For a 1-D array
    /// the intervals address elements directly.
    pub async fn read_block<S: ArrayElement>(
        &self,
        col_ranges: &[Range<usize>],
        buf: &mut [S],
    ) -> Result<()> {
        self.check_dtype(S::DTYPE)?;

        let rows = self.num_rows();
        let total_cols: usize = col_ranges.iter().map(|r| r.end - r.start).sum();
        if buf.len() != rows * total_cols {
            return Err(CumulusError::ShapeMismatch {
                expected: rows * total_cols,
                actual: buf.len(),
            });
        }

        let cell_bytes = rows * S::BYTE_WIDTH;
        let byte_ranges: Vec<Range<u64>> = col_ranges
            .iter()
            .filter(|r| r.end > r.start)
            .map(|r| (r.start * cell_bytes) as u64..(r.end * cell_bytes) as u64)
            .collect();
        if byte_ranges.is_empty() {
            return Ok(());
        }

        let parts = self
            .store
            .get_ranges(&data_key(&self.uri), &byte_ranges)
            .await?;

        let mut offset = 0;
        for part in parts {
            let n = part.len() / S::BYTE_WIDTH;
            S::read_le(&part, &mut buf[offset..offset + n]);
            offset += n;
        }
        debug_assert_eq!(offset, buf.len());
        Ok(())
    }

    /// Read the entire 2-D array into an owned column-major matrix.
    pub async fn read_matrix<S: ArrayElement>(&self) -> Result<ColMajorMatrix<S>> {
        self.check_dtype(S::DTYPE)?;
        if self.schema.shape.len() != 2 {
            return Err(CumulusError::MalformedSchema(format!(
                "expected a 2-D array at {}, got shape {:?}",
                self.uri, self.schema.shape
            )));
        }
        let rows = self.num_rows();
        let cols = self.num_cols();
        let mut matrix = ColMajorMatrix::<S>::new(rows, cols);
        let raw = self.store.get(&data_key(&self.uri)).await?;
        if raw.len() != rows * cols * S::BYTE_WIDTH {
            return Err(CumulusError::MalformedSchema(format!(
                "data object at {} holds {} bytes, schema implies {}",
                self.uri,
                raw.len(),
                rows * cols * S::BYTE_WIDTH
            )));
        }
        S::read_le(&raw, matrix.data_mut());
        Ok(matrix)
    }

    /// Read the entire 1-D array into an owned vector.
    pub async fn read_vector<S: ArrayElement>(&self) -> Result<Vec<S>> {
        self.check_dtype(S::DTYPE)?;
        if self.schema.shape.len() != 1 {
            return Err(CumulusError::MalformedSchema(format!(
                "expected a 1-D array at {}, got shape {:?}",
                self.uri, self.schema.shape
            )));
        }
        let len = self.num_cols();
        let raw = self.store.get(&data_key(&self.uri)).await?;
        if raw.len() != len * S::BYTE_WIDTH {
            return Err(CumulusError::MalformedSchema(format!(
                "data object at {} holds {} bytes, schema implies {}",
                self.uri,
                raw.len(),
                len * S::BYTE_WIDTH
            )));
        }
        let mut out = vec![S::default(); len];
        S::read_le(&raw, &mut out);
        Ok(out)
    }
}
