use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Number of tokens per shingle.
const SHINGLE_SIZE: usize = 3;

/// Computes a 64-bit SimHash over 3-token shingles of the text.
///
/// Feature weights are shingle frequencies: a shingle appearing twice
/// pulls its bits twice as hard. Texts sharing most shingles land within
/// a few bits of each other.
pub fn simhash(text: &str) -> u64 {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return 0;
    }

    let mut weights: HashMap<u64, i64> = HashMap::new();
    if tokens.len() < SHINGLE_SIZE {
        *weights.entry(hash_shingle(&tokens)).or_insert(0) += 1;
    } else {
        for shingle in tokens.windows(SHINGLE_SIZE) {
            *weights.entry(hash_shingle(shingle)).or_insert(0) += 1;
        }
    }

    let mut vector = [0i64; 64];
    for (hash, weight) in weights {
        for (bit, slot) in vector.iter_mut().enumerate() {
            if hash >> bit & 1 == 1 {
                *slot += weight;
            } else {
                *slot -= weight;
            }
        }
    }

    let mut fingerprint = 0u64;
    for (bit, slot) in vector.iter().enumerate() {
        if *slot > 0 {
            fingerprint |= 1 << bit;
        }
    }
    fingerprint
}

fn hash_shingle(tokens: &[&str]) -> u64 {
    let mut hasher = DefaultHasher::new();
    tokens.hash(&mut hasher);
    hasher.finish()
}

/// Number of differing bits between two fingerprints.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Maximum hamming distance that still counts as a near-duplicate for the
/// given similarity ratio. 0.85 maps to 9 bits out of 64.
pub fn hamming_budget(similarity_threshold: f64) -> u32 {
    ((1.0 - similarity_threshold) * 64.0).floor() as u32
}
