// src/memory/vector.rs — Placeholder embedding vectors
//
// Real semantic embeddings are a future extension. Until then every record
// carries a deterministic stand-in derived purely from its content, so the
// column layout and retrieval paths already match what embedding search
// will need.

/// Compute the placeholder vector for a piece of text.
///
/// The same content always yields the same vector; the dimensionality is
/// the store's configured value.
pub fn placeholder_vector(text: &str, dimensions: usize) -> Vec<f32> {
    let hash = content_hash(text);

    (0..dimensions)
        .map(|i| {
            let seed = hash as f64 * (i as f64 + 1.0);
            ((seed.sin() * 43758.5453123) % 1.0) as f32
        })
        .collect()
}

/// 32-bit rolling hash over UTF-16 code units.
fn content_hash(text: &str) -> i32 {
    let mut hash: i32 = 0;
    for unit in text.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(unit as i32);
    }
    hash
}
