//! Type-safe wrappers and core types for vector search functionality.
//!
//! Newtypes for dimensions and similarity scores plus the error type shared
//! by the graph, the graph artifact file and the centroid routine.

use serde::Serialize;
use thiserror::Error;

/// Standard vector dimension for block embeddings (all-MiniLM-L6-v2 model).
pub const VECTOR_DIMENSION_384: usize = 384;

/// Type-safe wrapper for similarity scores.
///
/// Scores are derived from cosine distance as `1 - distance`, so they live in
/// the range [-1.0, 1.0] where:
/// - 1.0 indicates identical direction
/// - 0.0 indicates orthogonal vectors
/// - -1.0 indicates opposite direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Score(f32);

impl Score {
    /// Creates a new `Score` with validation.
    ///
    /// Returns an error if the score is not in the range [-1.0, 1.0] or is NaN.
    pub fn new(value: f32) -> Result<Self, VectorError> {
        if value.is_nan() {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score cannot be NaN",
            });
        }
        if !(-1.0..=1.0).contains(&value) {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score must be in range [-1.0, 1.0]",
            });
        }
        Ok(Self(value))
    }

    /// Converts a raw cosine distance (range [0, 2]) into a score.
    ///
    /// Float error can push a distance slightly outside its range, so the
    /// result is clamped.
    #[must_use]
    pub fn from_distance(distance: f32) -> Self {
        if distance.is_nan() {
            return Self(-1.0);
        }
        Self((1.0 - distance).clamp(-1.0, 1.0))
    }

    /// Creates a score of 1.0 (identical direction).
    #[must_use]
    pub const fn one() -> Self {
        Self(1.0)
    }

    /// Returns the underlying f32 value.
    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions to prevent dimension
/// mismatches during operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Creates a standard 384-dimensional vector dimension.
    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error(
        "Vector for content {id} contains NaN or infinite values\nSuggestion: Check the embedding backend output"
    )]
    NonFiniteVector { id: u64 },

    #[error(
        "Graph capacity exceeded: capacity {capacity}, requested {requested}\nSuggestion: Raise store.capacity and reset the index"
    )]
    CapacityExceeded { capacity: usize, requested: usize },

    #[error("Invalid score value: {value}\nReason: {reason}")]
    InvalidScore { value: f32, reason: &'static str },

    #[error("Storage error: {0}\nSuggestion: Check disk space and file permissions")]
    Storage(#[from] std::io::Error),

    #[error(
        "Invalid graph file format: {0}\nSuggestion: The graph artifact may be corrupted. Reset the index and rebuild"
    )]
    InvalidFormat(String),

    #[error(
        "Invalid storage version: expected {expected}, got {actual}\nSuggestion: Migrate the storage format or use a compatible version"
    )]
    VersionMismatch { expected: u32, actual: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_validation() {
        let score = Score::new(0.5).unwrap();
        assert_eq!(score.get(), 0.5);

        assert!(Score::new(-1.0).is_ok());
        assert!(Score::new(1.0).is_ok());

        assert!(Score::new(-1.1).is_err());
        assert!(Score::new(1.1).is_err());
        assert!(Score::new(f32::NAN).is_err());
    }

    #[test]
    fn test_score_from_distance() {
        assert_eq!(Score::from_distance(0.0).get(), 1.0);
        assert_eq!(Score::from_distance(1.0).get(), 0.0);
        assert_eq!(Score::from_distance(2.0).get(), -1.0);

        // Rounding noise is clamped back into range
        assert_eq!(Score::from_distance(-1e-6).get(), 1.0);
        assert_eq!(Score::from_distance(2.000_001).get(), -1.0);
    }

    #[test]
    fn test_score_ordering() {
        let mut scores = vec![
            Score::new(0.2).unwrap(),
            Score::new(-0.5).unwrap(),
            Score::new(0.9).unwrap(),
        ];
        scores.sort_by(|a, b| b.cmp(a));

        let values: Vec<f32> = scores.iter().map(Score::get).collect();
        assert_eq!(values, vec![0.9, 0.2, -0.5]);
    }

    #[test]
    fn test_vector_dimension() {
        let dim = VectorDimension::new(384).unwrap();
        assert_eq!(dim.get(), 384);
        assert_eq!(VectorDimension::dimension_384(), dim);

        assert!(VectorDimension::new(0).is_err());

        assert!(dim.validate_vector(&vec![0.1; 384]).is_ok());
        match dim.validate_vector(&vec![0.1; 100]) {
            Err(VectorError::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 384);
                assert_eq!(actual, 100);
            }
            other => panic!("Expected DimensionMismatch, got {other:?}"),
        }
    }
}
