/// Cosine similarity of two equal-length vectors.
///
/// Returns 0.0 when either vector has zero magnitude. Callers are expected
/// to check dimensions; extra trailing components of the longer vector are
/// ignored.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have the same dimension");

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    let denom = mag_a * mag_b;
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}
