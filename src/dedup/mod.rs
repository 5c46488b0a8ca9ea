//! Content deduplication: exact hashing plus SimHash near-duplicate
//! detection over normalised text.

mod simhash;

pub use simhash::{hamming_budget, hamming_distance, simhash};

use crate::config::DedupConfig;
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};

/// Exact and near-duplicate fingerprints of one page's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentFingerprint {
    /// SHA-256 of the normalised text
    pub exact: [u8; 32],

    /// 64-bit SimHash of the same text
    pub sim: u64,
}

impl ContentFingerprint {
    pub fn compute(normalized_text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalized_text.as_bytes());
        Self {
            exact: hasher.finalize().into(),
            sim: simhash(normalized_text),
        }
    }

    pub fn exact_hex(&self) -> String {
        hex::encode(self.exact)
    }
}

/// Outcome of observing one page's text.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    New,
    ExactDuplicate,
    NearDuplicate { of_url: String, similarity: f64 },
}

impl Verdict {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Verdict::New)
    }
}

/// A verdict together with the fingerprint that produced it, so callers
/// can persist the fingerprint without recomputing it.
#[derive(Debug, Clone)]
pub struct Observation {
    pub verdict: Verdict,
    pub fingerprint: ContentFingerprint,
}

/// In-memory duplicate detector with a bounded fingerprint store.
///
/// The store is capacity-bounded with oldest-first eviction, so
/// near-duplicate detection is best-effort on very large crawls. The
/// SimHash side is a flat list scanned linearly.
pub struct Deduplicator {
    min_chars: usize,
    max_distance: u32,
    capacity: usize,
    exact: HashSet<[u8; 32]>,
    // Insertion order of (exact, sim, url), shared by both stores for
    // eviction.
    entries: VecDeque<([u8; 32], u64, String)>,
}

impl Deduplicator {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            min_chars: config.min_chars,
            max_distance: hamming_budget(config.similarity_threshold),
            capacity: config.max_fingerprints.max(1),
            exact: HashSet::new(),
            entries: VecDeque::new(),
        }
    }

    /// Classifies a page's text and, when it is new, stores both
    /// fingerprints.
    ///
    /// Texts shorter than the configured minimum are classified `New`
    /// without being stored. On a near-duplicate, `of_url` is the earliest
    /// observed match.
    pub fn observe(&mut self, url: &str, text: &str) -> Observation {
        let normalized = normalize_text(text);
        let fingerprint = ContentFingerprint::compute(&normalized);

        if normalized.chars().count() < self.min_chars {
            return Observation {
                verdict: Verdict::New,
                fingerprint,
            };
        }

        if self.exact.contains(&fingerprint.exact) {
            return Observation {
                verdict: Verdict::ExactDuplicate,
                fingerprint,
            };
        }

        for (_, stored_sim, stored_url) in &self.entries {
            let distance = hamming_distance(fingerprint.sim, *stored_sim);
            if distance <= self.max_distance {
                return Observation {
                    verdict: Verdict::NearDuplicate {
                        of_url: stored_url.clone(),
                        similarity: 1.0 - f64::from(distance) / 64.0,
                    },
                    fingerprint,
                };
            }
        }

        self.insert(fingerprint, url);
        Observation {
            verdict: Verdict::New,
            fingerprint,
        }
    }

    fn insert(&mut self, fingerprint: ContentFingerprint, url: &str) {
        if self.entries.len() >= self.capacity {
            if let Some((old_exact, _, _)) = self.entries.pop_front() {
                self.exact.remove(&old_exact);
            }
        }
        self.exact.insert(fingerprint.exact);
        self.entries
            .push_back((fingerprint.exact, fingerprint.sim, url.to_string()));
    }

    /// Number of stored fingerprints.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Normalises text for fingerprinting: Unicode lowercase, whitespace
/// collapsed to single spaces, control characters stripped.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dedup() -> Deduplicator {
        Deduplicator::new(&DedupConfig {
            min_chars: 20,
            ..DedupConfig::default()
        })
    }

    fn long_text(tag: &str) -> String {
        format!(
            "{} the quick brown fox jumps over the lazy dog and keeps running through the \
             forest until it reaches the river where it finally rests",
            tag
        )
    }

    #[test]
    fn test_new_then_exact_duplicate() {
        let mut dedup = dedup();
        let text = long_text("a");

        assert_eq!(dedup.observe("https://a.com/1", &text).verdict, Verdict::New);
        assert_eq!(
            dedup.observe("https://a.com/2", &text).verdict,
            Verdict::ExactDuplicate
        );
    }

    #[test]
    fn test_whitespace_only_difference_is_exact_duplicate() {
        let mut dedup = dedup();
        let text = long_text("a");
        let spaced = text.replace(' ', "\n\t  ");

        assert_eq!(dedup.observe("https://a.com/1", &text).verdict, Verdict::New);
        assert_eq!(
            dedup.observe("https://a.com/2", &spaced).verdict,
            Verdict::ExactDuplicate
        );
    }

    #[test]
    fn test_case_difference_is_exact_duplicate() {
        let mut dedup = dedup();
        let text = long_text("a");

        dedup.observe("https://a.com/1", &text);
        assert_eq!(
            dedup.observe("https://a.com/2", &text.to_uppercase()).verdict,
            Verdict::ExactDuplicate
        );
    }

    #[test]
    fn test_near_duplicate_names_earliest_match() {
        let mut dedup = dedup();
        // One token changed out of 200: ~98% shared shingles, comfortably
        // above the 0.85 threshold.
        let base = (0..200).map(|i| format!("tok{}", i)).collect::<Vec<_>>().join(" ");
        let tweaked = base.replace("tok100", "changed");

        assert_eq!(dedup.observe("https://a.com/first", &base).verdict, Verdict::New);
        match dedup.observe("https://a.com/second", &tweaked).verdict {
            Verdict::NearDuplicate { of_url, similarity } => {
                assert_eq!(of_url, "https://a.com/first");
                assert!(similarity >= 0.85, "similarity {} below threshold", similarity);
            }
            other => panic!("expected NearDuplicate, got {:?}", other),
        }
    }

    #[test]
    fn test_unrelated_texts_are_both_new() {
        let mut dedup = dedup();
        let a = "rust is a systems programming language focused on safety speed and concurrency \
                 with zero cost abstractions everywhere";
        let b = "grandma's apple pie recipe calls for cinnamon butter flour sugar and a pinch \
                 of salt baked slowly until golden";

        assert_eq!(dedup.observe("https://a.com/", a).verdict, Verdict::New);
        assert_eq!(dedup.observe("https://b.com/", b).verdict, Verdict::New);
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn test_short_text_is_new_and_not_stored() {
        let mut dedup = dedup();
        assert_eq!(dedup.observe("https://a.com/1", "tiny").verdict, Verdict::New);
        assert_eq!(dedup.observe("https://a.com/2", "tiny").verdict, Verdict::New);
        assert!(dedup.is_empty());
    }

    #[test]
    fn test_capacity_eviction() {
        let mut dedup = Deduplicator::new(&DedupConfig {
            min_chars: 5,
            max_fingerprints: 2,
            similarity_threshold: 1.0,
            ..DedupConfig::default()
        });

        let texts = [
            "first completely distinct sentence about mountains and glaciers forever",
            "second completely distinct sentence about oceans and currents forever",
            "third completely distinct sentence about deserts and dunes forever",
        ];
        for (i, text) in texts.iter().enumerate() {
            assert_eq!(
                dedup.observe(&format!("https://a.com/{}", i), text).verdict,
                Verdict::New
            );
        }
        assert_eq!(dedup.len(), 2);

        // The first entry was evicted, so the same text is New again.
        assert_eq!(dedup.observe("https://a.com/again", texts[0]).verdict, Verdict::New);
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello\n\tWORLD  "), "hello world");
        assert_eq!(normalize_text("a\u{0000}b"), "a\u{0000}b".replace('\u{0000}', ""));
    }

    #[test]
    fn test_fingerprint_hex_length() {
        let fp = ContentFingerprint::compute("some text");
        assert_eq!(fp.exact_hex().len(), 64);
    }
}
