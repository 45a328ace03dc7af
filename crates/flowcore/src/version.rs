//! Ordering for node and flow version strings ("v0", "v1", "1.2.0", "v2-beta").

use std::cmp::Ordering;

pub const LATEST: &str = "latest";

/// An empty version or the literal `latest` asks for the highest known version.
pub fn is_latest(version: &str) -> bool {
    let version = version.trim();
    version.is_empty() || version.eq_ignore_ascii_case(LATEST)
}

/// Segment-wise comparison: numeric segments compare as numbers, anything
/// else compares lexicographically. A missing segment sorts first.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(l), Ok(r)) => l.cmp(&r),
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Ok(_)) => Ordering::Less,
            (Err(_), Err(_)) => l.cmp(r),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    left.len().cmp(&right.len())
}

fn segments(version: &str) -> Vec<&str> {
    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    trimmed
        .split(['.', '-'])
        .filter(|s| !s.is_empty())
        .collect()
}
