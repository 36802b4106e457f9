//! Cosine metric used by the ANN graph.
//!
//! The graph orders neighbors by an unsigned integer distance. Cosine distance
//! `1 - cos(a, b)` is a non-negative float, and the bit patterns of
//! non-negative IEEE-754 floats sort in the same order as the floats, so the
//! metric hands the graph `distance.to_bits()` and search results are decoded
//! back with [`decode_distance`] without losing precision.

use space::Metric;

/// Computes cosine similarity between two vectors.
///
/// # Returns
/// * Cosine similarity in range [-1, 1], where 1 is most similar. A zero
///   vector has similarity 0 with everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Cosine distance in [0, 2].
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - cosine_similarity(a, b)).clamp(0.0, 2.0)
}

/// Turns a graph distance unit back into the cosine distance it encodes.
pub fn decode_distance(unit: u32) -> f32 {
    f32::from_bits(unit)
}

/// Cosine distance metric over owned feature vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineDistance;

impl Metric<Vec<f32>> for CosineDistance {
    type Unit = u32;

    fn distance(&self, a: &Vec<f32>, b: &Vec<f32>) -> u32 {
        cosine_distance(a, b).to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let v1 = vec![1.0, 0.0, 0.0];
        let v2 = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&v1, &v2) - 1.0).abs() < 0.001);

        let v3 = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&v1, &v3) - 0.0).abs() < 0.001);

        let v4 = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&v1, &v4) - (-1.0)).abs() < 0.001);

        let zero = vec![0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&v1, &zero), 0.0);
    }

    #[test]
    fn test_metric_round_trips_distance() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 1.0];

        let unit = CosineDistance.distance(&a, &b);
        let expected = 1.0 - std::f32::consts::FRAC_1_SQRT_2;
        assert!((decode_distance(unit) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_metric_units_preserve_ordering() {
        let query = vec![1.0, 0.0];
        let near = vec![0.9, 0.1];
        let far = vec![0.0, 1.0];
        let opposite = vec![-1.0, 0.0];

        let d_self = CosineDistance.distance(&query, &query);
        let d_near = CosineDistance.distance(&query, &near);
        let d_far = CosineDistance.distance(&query, &far);
        let d_opposite = CosineDistance.distance(&query, &opposite);

        assert!(d_self <= d_near);
        assert!(d_near < d_far);
        assert!(d_far < d_opposite);
        assert!((decode_distance(d_opposite) - 2.0).abs() < 1e-6);
    }
}
