//! Binary artifact format for the ANN graph.
//!
//! The graph is persisted as its feature vectors in label order. Labels are
//! graph positions, so re-inserting the vectors in file order into a graph
//! built with the same parameters reproduces every label and, because the
//! level generator is seeded, the same graph.
//!
//! # Storage Format
//!
//! - Header (24 bytes): magic, version, dimension, capacity, ef_construction, vector count
//! - Vectors: contiguous f32 arrays in little-endian format, label 0 first
//!
//! Reads go through a memory map so opening a large graph does not copy the
//! file before decoding.

use std::fs::File;
use std::path::Path;

use memmap2::MmapOptions;

use crate::vector::types::{VectorDimension, VectorError};

/// Current graph format version.
pub const GRAPH_FORMAT_VERSION: u32 = 1;

/// Size of the header in bytes.
const HEADER_SIZE: usize = 24;

/// Magic bytes to identify graph files.
const MAGIC_BYTES: &[u8; 4] = b"RGPH";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Construction parameters recorded in the graph header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphHeader {
    pub dimension: VectorDimension,
    pub capacity: usize,
    pub ef_construction: usize,
}

/// Decoded contents of a graph artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSnapshot {
    pub header: GraphHeader,
    pub vectors: Vec<Vec<f32>>,
}

/// Encodes a graph header and its label-ordered vectors.
pub fn encode_graph<'a, I>(header: &GraphHeader, vectors: I) -> Result<Vec<u8>, VectorError>
where
    I: ExactSizeIterator<Item = &'a [f32]>,
{
    let dimension = header.dimension.get();
    let count = vectors.len();
    let mut bytes = Vec::with_capacity(HEADER_SIZE + count * dimension * BYTES_PER_F32);

    bytes.extend_from_slice(MAGIC_BYTES);
    bytes.extend_from_slice(&GRAPH_FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&to_u32(dimension, "dimension")?.to_le_bytes());
    bytes.extend_from_slice(&to_u32(header.capacity, "capacity")?.to_le_bytes());
    bytes.extend_from_slice(&to_u32(header.ef_construction, "ef_construction")?.to_le_bytes());
    bytes.extend_from_slice(&to_u32(count, "vector count")?.to_le_bytes());

    for vector in vectors {
        header.dimension.validate_vector(vector)?;
        for &value in vector {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }

    Ok(bytes)
}

/// Decodes a graph artifact previously produced by [`encode_graph`].
pub fn decode_graph(bytes: &[u8]) -> Result<GraphSnapshot, VectorError> {
    if bytes.len() < HEADER_SIZE {
        return Err(VectorError::InvalidFormat(
            "File too small to contain header".to_string(),
        ));
    }

    if &bytes[0..4] != MAGIC_BYTES {
        return Err(VectorError::InvalidFormat(
            "Invalid magic bytes".to_string(),
        ));
    }

    let version = read_u32(bytes, 4);
    if version != GRAPH_FORMAT_VERSION {
        return Err(VectorError::VersionMismatch {
            expected: GRAPH_FORMAT_VERSION,
            actual: version,
        });
    }

    let dimension = VectorDimension::new(read_u32(bytes, 8) as usize)?;
    let capacity = read_u32(bytes, 12) as usize;
    let ef_construction = read_u32(bytes, 16) as usize;
    let count = read_u32(bytes, 20) as usize;

    let vector_size = dimension.get() * BYTES_PER_F32;
    let expected_len = HEADER_SIZE + count * vector_size;
    if bytes.len() != expected_len {
        return Err(VectorError::InvalidFormat(format!(
            "Expected {expected_len} bytes for {count} vectors, found {}",
            bytes.len()
        )));
    }

    let vectors = bytes[HEADER_SIZE..]
        .chunks_exact(vector_size)
        .map(|chunk| {
            chunk
                .chunks_exact(BYTES_PER_F32)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        })
        .collect();

    Ok(GraphSnapshot {
        header: GraphHeader {
            dimension,
            capacity,
            ef_construction,
        },
        vectors,
    })
}

/// Memory-maps and decodes a graph artifact from disk.
pub fn read_graph_file(path: &Path) -> Result<GraphSnapshot, VectorError> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(VectorError::InvalidFormat("Graph file is empty".to_string()));
    }
    // SAFETY: the file is only replaced by rename, never truncated in place,
    // so the mapping stays valid for the lifetime of this call.
    let mmap = unsafe { MmapOptions::new().map(&file)? };
    decode_graph(&mmap)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn to_u32(value: usize, field: &str) -> Result<u32, VectorError> {
    u32::try_from(value)
        .map_err(|_| VectorError::InvalidFormat(format!("{field} {value} does not fit in u32")))
}
