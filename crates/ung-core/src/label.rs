//! Label set helpers.
//!
//! Every label set handled by the index is canonical: ascending and free of
//! duplicates. Containment then reduces to an ordered-subsequence walk.

use smallvec::SmallVec;

use crate::{LabelType, Scenario};

pub type LabelSet = SmallVec<[LabelType; 8]>;

/// Sorts and deduplicates `labels`.
pub fn canonicalize<I>(labels: I) -> LabelSet
where
    I: IntoIterator<Item = LabelType>,
{
    let mut set: LabelSet = labels.into_iter().collect();
    set.sort_unstable();
    set.dedup();
    set
}

pub fn is_canonical(labels: &[LabelType]) -> bool {
    labels.windows(2).all(|w| w[0] < w[1])
}

/// Returns true if every label of `sub` occurs in `sup`. Both must be canonical.
pub fn includes(sup: &[LabelType], sub: &[LabelType]) -> bool {
    if sub.len() > sup.len() {
        return false;
    }
    let mut it = sup.iter();
    'outer: for &needle in sub {
        for &hay in it.by_ref() {
            if hay == needle {
                continue 'outer;
            }
            if hay > needle {
                return false;
            }
        }
        return false;
    }
    true
}

/// Returns true if the canonical sets share at least one label.
pub fn intersects(a: &[LabelType], b: &[LabelType]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => return true,
        }
    }
    false
}

/// Filter predicate of a query scenario.
pub fn satisfies(scenario: Scenario, query: &[LabelType], candidate: &[LabelType]) -> bool {
    match scenario {
        Scenario::Equality => query == candidate,
        Scenario::Containment => includes(candidate, query),
        Scenario::Overlap => intersects(candidate, query),
        Scenario::NoFilter => true,
    }
}

/// Parses a comma separated label line such as `3,1,7`.
pub fn parse_label_line(line: &str) -> Option<LabelSet> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Some(LabelSet::new());
    }
    let mut labels = LabelSet::new();
    for token in trimmed.split(',') {
        labels.push(token.trim().parse().ok()?);
    }
    Some(canonicalize(labels))
}
