//! Numeric-aware version ordering
//!
//! Release strings such as `7.50`, `7.x-3.10` or `8.9.0-rc1` are split on
//! `.`, `-` and `+`. Numeric segments compare as integers so that `7.6` sorts
//! before `7.50`; other segments compare as text. A missing trailing segment
//! counts as `0`, which makes `1.0` and `1.0.0` the same release.

use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Number(u64),
    Text(&'a str),
}

impl Ord for Segment<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Segment::Number(a), Segment::Number(b)) => a.cmp(b),
            (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
            // "8.0" is newer than "8.0-rc1"
            (Segment::Number(_), Segment::Text(_)) => Ordering::Greater,
            (Segment::Text(_), Segment::Number(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for Segment<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn segments(version: &str) -> Vec<Segment<'_>> {
    version
        .trim()
        .trim_start_matches(['v', 'V'])
        .split(['.', '-', '+'])
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<u64>() {
            Ok(n) => Segment::Number(n),
            Err(_) => Segment::Text(s),
        })
        .collect()
}

/// Total ordering between two release strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);
    let len = left.len().max(right.len());

    for i in 0..len {
        let l = left.get(i).unwrap_or(&Segment::Number(0));
        let r = right.get(i).unwrap_or(&Segment::Number(0));
        match l.cmp(r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// True when both strings name the same release.
pub fn same_release(a: &str, b: &str) -> bool {
    compare(a, b) == Ordering::Equal
}

/// True when `candidate` is a strictly newer release than `current`.
pub fn is_newer(current: &str, candidate: &str) -> bool {
    compare(candidate, current) == Ordering::Greater
}
