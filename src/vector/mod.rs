//! Vector search building blocks for block retrieval.
//!
//! This module provides the approximate nearest-neighbor graph, its on-disk
//! artifact format, the cosine metric and the centroid routine used to turn
//! several blocks into one query.
//!
//! # Architecture
//! The graph is an HNSW index over cosine distance. Labels are dense graph
//! positions assigned at insertion. The graph persists as its vectors in label
//! order and is rebuilt deterministically on load, so labels survive a
//! save/load cycle unchanged.

mod centroid;
mod graph;
mod metric;
mod storage;
mod types;

// Re-export core types for public API
pub use centroid::centroid;
pub use graph::{AnnGraph, GraphParams};
pub use metric::{CosineDistance, cosine_distance, cosine_similarity, decode_distance};
pub use storage::{
    GRAPH_FORMAT_VERSION, GraphHeader, GraphSnapshot, decode_graph, encode_graph, read_graph_file,
};
pub use types::{Score, VECTOR_DIMENSION_384, VectorDimension, VectorError};
