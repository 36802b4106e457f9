//! HNSW graph adapter.
//!
//! Wraps the `hnsw` crate behind a small API speaking this crate's types:
//! dense [`Label`]s out of insertion, `(Label, cosine distance)` pairs out of
//! search. Capacity and dimension are enforced here, before anything touches
//! the graph, so a rejected batch never leaves a partial insert behind.

use hnsw::{Hnsw, Params, Searcher};
use rand_pcg::Pcg64;
use space::Neighbor;
use tracing::debug;

use crate::types::Label;
use crate::vector::metric::{CosineDistance, decode_distance};
use crate::vector::storage::{GraphHeader, GraphSnapshot, encode_graph};
use crate::vector::types::{VectorDimension, VectorError};

/// Neighbors kept per node on upper layers.
const MAX_NEIGHBORS: usize = 32;

/// Neighbors kept per node on layer zero.
const MAX_NEIGHBORS_ZERO: usize = 2 * MAX_NEIGHBORS;

type CosineHnsw = Hnsw<CosineDistance, Vec<f32>, Pcg64, MAX_NEIGHBORS, MAX_NEIGHBORS_ZERO>;

/// Parameters fixed when a graph is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphParams {
    /// Maximum number of elements the graph accepts.
    pub capacity: usize,
    /// Candidate list size while linking new nodes.
    pub ef_construction: usize,
    /// Candidate list size while searching.
    pub ef_search: usize,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ef_construction: 150,
            ef_search: 32,
        }
    }
}

/// Approximate nearest-neighbor graph over cosine distance.
pub struct AnnGraph {
    hnsw: CosineHnsw,
    dimension: VectorDimension,
    params: GraphParams,
}

impl std::fmt::Debug for AnnGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnGraph")
            .field("len", &self.hnsw.len())
            .field("dimension", &self.dimension)
            .field("params", &self.params)
            .finish()
    }
}

impl AnnGraph {
    /// Creates an empty graph.
    ///
    /// The level generator is seeded with a fixed value, so two graphs fed
    /// the same vectors in the same order are identical.
    pub fn new(dimension: VectorDimension, params: GraphParams) -> Self {
        let hnsw = CosineHnsw::new_params(
            CosineDistance,
            Params::new().ef_construction(params.ef_construction),
        );
        Self {
            hnsw,
            dimension,
            params,
        }
    }

    /// Rebuilds a graph from a persisted snapshot.
    ///
    /// Vectors are re-inserted in label order, which reproduces every label.
    /// The effective capacity is the larger of the persisted and requested
    /// capacities so an existing graph always fits.
    pub fn from_snapshot(
        snapshot: GraphSnapshot,
        requested_capacity: usize,
        ef_search: usize,
    ) -> Result<Self, VectorError> {
        let GraphSnapshot { header, vectors } = snapshot;
        let capacity = header
            .capacity
            .max(requested_capacity)
            .max(vectors.len());

        let mut graph = Self::new(
            header.dimension,
            GraphParams {
                capacity,
                ef_construction: header.ef_construction,
                ef_search,
            },
        );

        let count = vectors.len();
        let labels = graph.insert_batch(vectors)?;
        debug_assert!(labels.iter().enumerate().all(|(i, l)| l.value() == i));
        debug!("Rebuilt ANN graph with {count} vectors");

        Ok(graph)
    }

    /// Inserts vectors and returns their labels in input order.
    ///
    /// The whole batch is validated first: a dimension mismatch or a batch
    /// that would exceed capacity rejects everything.
    pub fn insert_batch(&mut self, vectors: Vec<Vec<f32>>) -> Result<Vec<Label>, VectorError> {
        for vector in &vectors {
            self.dimension.validate_vector(vector)?;
        }

        let requested = self.hnsw.len() + vectors.len();
        if requested > self.params.capacity {
            return Err(VectorError::CapacityExceeded {
                capacity: self.params.capacity,
                requested,
            });
        }

        let mut searcher = Searcher::default();
        let labels = vectors
            .into_iter()
            .map(|vector| Label::new(self.hnsw.insert(vector, &mut searcher)))
            .collect();

        Ok(labels)
    }

    /// Finds up to `k` approximate nearest neighbors, closest first.
    ///
    /// Returns `(label, cosine distance)` pairs.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Label, f32)>, VectorError> {
        self.dimension.validate_vector(query)?;

        if k == 0 || self.hnsw.len() == 0 {
            return Ok(Vec::new());
        }

        // `nearest` copies into the whole buffer, so it must not outsize the graph
        let wanted = k.min(self.hnsw.len());
        let ef = self.params.ef_search.max(wanted);
        let mut searcher = Searcher::default();
        let mut neighbors = vec![
            Neighbor {
                index: !0,
                distance: !0,
            };
            wanted
        ];

        let query = query.to_vec();
        let found = self.hnsw.nearest(&query, ef, &mut searcher, &mut neighbors);

        Ok(found
            .iter()
            .map(|n| (Label::new(n.index), decode_distance(n.distance)))
            .collect())
    }

    /// Returns the vector stored under `label`.
    pub fn vector(&self, label: Label) -> Option<&[f32]> {
        if label.value() < self.hnsw.len() {
            Some(self.hnsw.feature(label.value()).as_slice())
        } else {
            None
        }
    }

    /// Number of elements in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hnsw.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hnsw.len() == 0
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.params.capacity
    }

    #[must_use]
    pub fn params(&self) -> GraphParams {
        self.params
    }

    /// Header describing this graph's construction parameters.
    #[must_use]
    pub fn header(&self) -> GraphHeader {
        GraphHeader {
            dimension: self.dimension,
            capacity: self.params.capacity,
            ef_construction: self.params.ef_construction,
        }
    }

    /// Serializes the graph into its artifact format.
    pub fn encode(&self) -> Result<Vec<u8>, VectorError> {
        encode_graph(
            &self.header(),
            (0..self.hnsw.len()).map(|i| self.hnsw.feature(i).as_slice()),
        )
    }
}
