use super::ProbeError;
use similar::{Algorithm, TextDiff};
use std::time::Duration;

/// Bodies longer than this are truncated before diffing.
const MAX_COMPARED_CHARS: usize = 20_000;

/// Past this the diff gives up on a minimal edit script and the ratio becomes an
/// underestimate. Pages that far apart are well below any useful threshold anyway.
const DIFF_TIMEOUT: Duration = Duration::from_millis(200);

/// Similarity of two response bodies between 0.0 (nothing shared) and 1.0 (identical).
///
/// CPU bound for large bodies; async callers should use `ratio_off_thread`.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a = truncate_chars(a, MAX_COMPARED_CHARS);
    let b = truncate_chars(b, MAX_COMPARED_CHARS);
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .timeout(DIFF_TIMEOUT)
        .diff_chars(a, b);
    diff.ratio().into()
}

/// `ratio` on the blocking thread pool.
pub async fn ratio_off_thread(a: String, b: String) -> Result<f64, ProbeError> {
    tokio::task::spawn_blocking(move || ratio(&a, &b))
        .await
        .map_err(|e| ProbeError::Task(e.to_string()))
}

/// Case-insensitive count of `marker` in `body`.
pub fn marker_count(body: &str, marker: &str) -> usize {
    if marker.is_empty() {
        return 0;
    }
    body.to_lowercase().matches(&marker.to_lowercase()).count()
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Deterministic lowercase noise so two bodies share little beyond the alphabet.
    fn noise(seed: u64, len: usize) -> String {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (b'a' + ((state >> 33) % 26) as u8) as char
            })
            .collect()
    }

    #[test]
    fn test_identical_is_one() {
        assert_eq!(ratio("<p>Alice</p>", "<p>Alice</p>"), 1.0);
        assert_eq!(ratio("", ""), 1.0);
    }

    #[test]
    fn test_different_is_low() {
        let r = ratio("First name: Alice Smith", "Access denied. You are not allowed to view this record, please log in again.");
        assert!(r < 0.7, "ratio was {}", r);
        assert_eq!(ratio("abc", ""), 0.0);
    }

    #[test]
    fn test_large_unrelated_bodies_finish_quickly() {
        let a = noise(1, 20_000);
        let b = noise(2, 20_000);

        let start = Instant::now();
        let r = ratio(&a, &b);
        let elapsed = start.elapsed();

        assert!(r < 0.7, "ratio was {}", r);
        assert!(elapsed < Duration::from_secs(5), "diff took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_ratio_off_thread() {
        let r = ratio_off_thread("<p>Alice</p>".to_string(), "<p>Alice</p>".to_string())
            .await
            .unwrap();
        assert_eq!(r, 1.0);
    }

    #[test]
    fn test_marker_count() {
        assert_eq!(marker_count("First name: a<br>first NAME: b", "first name"), 2);
        assert_eq!(marker_count("nothing here", "first name"), 0);
        assert_eq!(marker_count("x", ""), 0);
    }
}
