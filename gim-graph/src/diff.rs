use std::collections::BTreeSet;

/// Elements added and removed between two snapshots, in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changes<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> Default for Changes<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<T> Changes<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

/// `a \ b`: elements of `a` missing from `b`.
pub fn difference<T: Ord + Clone>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> Vec<T> {
    a.difference(b).cloned().collect()
}

/// `added = after \ before`, `removed = before \ after`.
///
/// `diff(after, before).added` is the same list as `diff(before, after).removed`.
pub fn diff<T: Ord + Clone>(before: &BTreeSet<T>, after: &BTreeSet<T>) -> Changes<T> {
    Changes {
        added: difference(after, before),
        removed: difference(before, after),
    }
}
