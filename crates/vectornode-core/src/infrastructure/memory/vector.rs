//! Vector column codec and exact cosine ranking

use std::cmp::Ordering;

/// Encode as little-endian `f32` bytes
pub fn encode(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian `f32` bytes; a trailing partial value is ignored
pub fn decode(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine distance `1 - cos(a, b)`; a zero vector is maximally distant
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Rank candidates by ascending distance to `query`, ties by ascending id.
///
/// Candidates whose dimension differs from the query are skipped.
pub fn rank(query: &[f32], candidates: Vec<(String, Vec<u8>)>, k: usize) -> Vec<(String, f64)> {
    let mut scored: Vec<(String, f64)> = candidates
        .into_iter()
        .filter_map(|(id, blob)| {
            let vector = decode(&blob);
            (vector.len() == query.len()).then(|| (id, cosine_distance(query, &vector)))
        })
        .collect();

    scored.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(k);
    scored
}
