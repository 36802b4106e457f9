//! Combining several block vectors into one query vector.

/// Element-wise mean of `vectors`.
///
/// The first vector fixes the dimension; vectors of any other length are
/// left out of both the sum and the divisor. The result is the true mean of
/// the vectors that contributed, not their sum. Empty input yields an empty
/// vector.
pub fn centroid<V: AsRef<[f32]>>(vectors: &[V]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };

    let dimension = first.as_ref().len();
    let mut sum = vec![0.0f32; dimension];
    let mut contributing = 0usize;

    for vector in vectors.iter().map(AsRef::as_ref) {
        if vector.len() != dimension {
            continue;
        }
        for (acc, &value) in sum.iter_mut().zip(vector) {
            *acc += value;
        }
        contributing += 1;
    }

    let count = contributing as f32;
    for value in sum.iter_mut() {
        *value /= count;
    }

    sum
}
