//! Full N x N distance and time matrices built from batched provider calls.
//!
//! The travel-time service caps the number of origin x destination elements
//! per call, so the location list is cut into square blocks of
//! `floor(sqrt(max_elements))` and every block pair is fetched separately,
//! through the shared [`MatrixCache`]. Anything that does not resolve is left
//! at [`UNREACHABLE`]; a failed block lowers precision but never aborts.

use std::ops::Range;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CachedBlock, MatrixCache};
use crate::error::{ConfigError, ValidationError};
use crate::traits::{Location, MatrixElement, TravelOptions, TravelTimeProvider};

/// Cost of an arc that could not be resolved.
pub const UNREACHABLE: i64 = 999_999;

/// Default element limit of a single distance-matrix call.
pub const DEFAULT_MAX_ELEMENTS: usize = 100;

/// Square matrix of non-negative integers, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    size: usize,
    values: Vec<i64>,
}

impl Matrix {
    /// All pairs unreachable except the zero diagonal.
    pub fn unreachable(size: usize) -> Self {
        let mut matrix = Self {
            size,
            values: vec![UNREACHABLE; size * size],
        };
        for i in 0..size {
            matrix.set(i, i, 0);
        }
        matrix
    }

    /// Builds a matrix from rows, rejecting anything that is not square.
    pub fn from_rows(name: &'static str, rows: Vec<Vec<i64>>) -> Result<Self, ValidationError> {
        let size = rows.len();
        let mut values = Vec::with_capacity(size * size);
        for row in rows {
            if row.len() != size {
                return Err(ValidationError::MatrixShape {
                    name,
                    rows: size,
                    cols: row.len(),
                    expected: size,
                });
            }
            values.extend(row);
        }
        Ok(Self { size, values })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Entry for the ordered pair (`from`, `to`). Both must be `< size`.
    pub fn get(&self, from: usize, to: usize) -> i64 {
        self.values[from * self.size + to]
    }

    fn set(&mut self, from: usize, to: usize, value: i64) {
        self.values[from * self.size + to] = value;
    }

    pub fn row(&self, from: usize) -> &[i64] {
        &self.values[from * self.size..(from + 1) * self.size]
    }

    pub fn to_rows(&self) -> Vec<Vec<i64>> {
        (0..self.size).map(|i| self.row(i).to_vec()).collect()
    }
}

/// Distance (meters) and travel time (seconds) over the same index set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelMatrices {
    pub distance: Matrix,
    pub time: Matrix,
}

impl TravelMatrices {
    pub fn size(&self) -> usize {
        self.distance.size()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixSettings {
    /// Element limit (origins x destinations) per provider call.
    pub max_elements_per_request: usize,
    pub options: TravelOptions,
}

impl Default for MatrixSettings {
    fn default() -> Self {
        Self {
            max_elements_per_request: DEFAULT_MAX_ELEMENTS,
            options: TravelOptions::default(),
        }
    }
}

/// Side length of the square blocks for a given element limit.
pub fn block_size(max_elements_per_request: usize) -> usize {
    max_elements_per_request.isqrt().max(1)
}

pub struct MatrixProvider<P> {
    provider: P,
    cache: Arc<MatrixCache>,
    settings: MatrixSettings,
}

impl<P: TravelTimeProvider> MatrixProvider<P> {
    pub fn new(provider: P, cache: Arc<MatrixCache>, settings: MatrixSettings) -> Result<Self, ConfigError> {
        if settings.max_elements_per_request == 0 {
            return Err(ConfigError::ZeroElementsPerRequest);
        }
        Ok(Self {
            provider,
            cache,
            settings,
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn cache(&self) -> &Arc<MatrixCache> {
        &self.cache
    }

    pub fn settings(&self) -> &MatrixSettings {
        &self.settings
    }

    /// Builds both matrices for `locations`, indexed in input order.
    pub fn build(&self, locations: &[Location]) -> Result<TravelMatrices, ValidationError> {
        let n = locations.len();
        if n == 0 {
            return Err(ValidationError::NoLocations);
        }

        let mut distance = Matrix::unreachable(n);
        let mut time = Matrix::unreachable(n);
        if n == 1 {
            return Ok(TravelMatrices { distance, time });
        }

        let size = block_size(self.settings.max_elements_per_request);
        let blocks = (0..n)
            .step_by(size)
            .map(|start| start..(start + size).min(n))
            .collect::<Vec<_>>();

        // A 1x1 diagonal block only holds a self-pair, already zero.
        let jobs = blocks
            .iter()
            .flat_map(|rows| blocks.iter().map(move |cols| (rows.clone(), cols.clone())))
            .filter(|(rows, cols)| !(rows == cols && rows.len() == 1))
            .collect::<Vec<_>>();

        info!(
            locations = n,
            block_size = size,
            blocks = jobs.len(),
            "building travel matrices"
        );

        let fetched = jobs
            .into_par_iter()
            .map(|(rows, cols)| {
                let block = self.fetch_block(&locations[rows.clone()], &locations[cols.clone()]);
                (rows, cols, block)
            })
            .collect::<Vec<_>>();

        let keys = locations.iter().map(Location::key).collect::<Vec<_>>();
        let mut failed_blocks = 0usize;
        let mut unresolved = 0usize;

        for (rows, cols, block) in fetched {
            let Some(block) = block else {
                failed_blocks += 1;
                unresolved += cells_off_diagonal(&rows, &cols);
                continue;
            };
            for i in rows.clone() {
                for j in cols.clone() {
                    if i == j {
                        continue;
                    }
                    match block.element(&keys[i], &keys[j]).and_then(MatrixElement::leg) {
                        Some((meters, seconds)) => {
                            distance.set(i, j, meters);
                            time.set(i, j, seconds);
                        }
                        None => unresolved += 1,
                    }
                }
            }
        }

        if unresolved > 0 {
            warn!(
                failed_blocks,
                unresolved, "some travel pairs are unresolved and marked unreachable"
            );
        }

        Ok(TravelMatrices { distance, time })
    }

    fn fetch_block(&self, origins: &[Location], destinations: &[Location]) -> Option<Arc<CachedBlock>> {
        let key = CacheKey::for_request(origins, destinations, &self.settings.options);
        if let Some(hit) = self.cache.get(&key) {
            debug!(key = key.value(), "distance matrix cache hit");
            return Some(hit);
        }

        debug!(
            origins = origins.len(),
            destinations = destinations.len(),
            "querying travel-time provider"
        );
        let response = self.provider.query(origins, destinations, &self.settings.options);
        if !response.is_ok() {
            warn!(
                status = ?response.status,
                message = response.error_message.as_deref().unwrap_or("unknown error"),
                "travel-time block failed"
            );
            return None;
        }

        Some(self.cache.insert(key, CachedBlock::new(origins, destinations, response)))
    }
}

fn cells_off_diagonal(rows: &Range<usize>, cols: &Range<usize>) -> usize {
    let overlap = rows.start.max(cols.start)..rows.end.min(cols.end);
    rows.len() * cols.len() - overlap.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_is_floor_of_square_root() {
        assert_eq!(block_size(1), 1);
        assert_eq!(block_size(4), 2);
        assert_eq!(block_size(99), 9);
        assert_eq!(block_size(100), 10);
        assert_eq!(block_size(625), 25);
    }

    #[test]
    fn unreachable_matrix_has_zero_diagonal() {
        let matrix = Matrix::unreachable(3);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 0 } else { UNREACHABLE };
                assert_eq!(matrix.get(i, j), expected);
            }
        }
    }

    #[test]
    fn from_rows_rejects_ragged_input() {
        let err = Matrix::from_rows("distance", vec![vec![0, 1], vec![1]]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MatrixShape {
                name: "distance",
                rows: 2,
                cols: 1,
                expected: 2,
            }
        );
    }

    #[test]
    fn off_diagonal_cell_count() {
        assert_eq!(cells_off_diagonal(&(0..3), &(0..3)), 6);
        assert_eq!(cells_off_diagonal(&(0..3), &(3..5)), 6);
    }
}
