//! Ratcliff/Obershelp sequence similarity over characters

/// Similarity of two strings in `[0, 1]`.
///
/// `2 * M / (|a| + |b|)` where `M` counts characters matched by repeatedly taking
/// the longest common substring and recursing on both sides of it. Either side
/// empty scores 0. The score is the larger of both argument orders, which makes
/// it symmetric regardless of how longest-substring ties fall.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let total = (a.len() + b.len()) as f64;
    let forward = matching_chars(&a, &b);
    let backward = matching_chars(&b, &a);

    (2.0 * forward.max(backward) as f64 / total).clamp(0.0, 1.0)
}

/// Number of characters matched by the Ratcliff/Obershelp decomposition
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (a_start, b_start, len) = longest_common_substring(a, b);
    if len == 0 {
        return 0;
    }

    len + matching_chars(&a[..a_start], &b[..b_start]) + matching_chars(&a[a_start + len..], &b[b_start + len..])
}

/// Leftmost longest common substring as `(start in a, start in b, length)`
fn longest_common_substring(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                cur[j + 1] = prev[j] + 1;
                if cur[j + 1] > best.2 {
                    best = (i + 1 - cur[j + 1], j + 1 - cur[j + 1], cur[j + 1]);
                }
            } else {
                cur[j + 1] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    best
}
