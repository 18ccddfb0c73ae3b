//! Binary indexed tree (Fenwick tree) over signed integer deltas.
//!
//! One tree backs each open text-edit session: index `i` holds the net
//! insert/delete length that later-committed edits injected at client
//! position `i`, so a stale position can be rebased with one prefix sum
//! instead of rematerialising the document.
//!
//! `update` and `query` are O(log n); the tree grows on demand when an
//! index past the current bound is touched.

/// Fenwick tree with point update and prefix sum.
///
/// Indices are non-negative; deltas may be negative.
#[derive(Debug, Clone, Default)]
pub struct Bit {
    /// Raw per-index values, kept for rebuilds on growth.
    values: Vec<i64>,
    /// 1-indexed Fenwick array; `tree[0]` is unused.
    tree: Vec<i64>,
}

impl Bit {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree sized for indices `0..n` up front.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            values: vec![0; n],
            tree: vec![0; n + 1],
        }
    }

    /// Number of indices currently covered.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no index has ever been touched.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Add `delta` to the value at `idx`, growing the tree if needed.
    pub fn update(&mut self, idx: usize, delta: i64) {
        if idx >= self.values.len() {
            self.grow(idx + 1);
        }
        self.values[idx] += delta;

        let mut i = idx + 1;
        while i < self.tree.len() {
            self.tree[i] += delta;
            i += i & i.wrapping_neg();
        }
    }

    /// Prefix sum over indices `0..=r`.
    ///
    /// Indices past the tree bound contribute zero, so querying beyond the
    /// touched range returns the total.
    pub fn query(&self, r: usize) -> i64 {
        let mut i = (r + 1).min(self.values.len());
        let mut sum = 0;
        while i > 0 {
            sum += self.tree[i];
            i -= i & i.wrapping_neg();
        }
        sum
    }

    /// Sum over the inclusive index range `l..=r`.
    pub fn range_query(&self, l: usize, r: usize) -> i64 {
        if l == 0 {
            self.query(r)
        } else {
            self.query(r) - self.query(l - 1)
        }
    }

    /// Grow to cover at least `min_len` indices.
    ///
    /// Fenwick internal nodes span index ranges, so appending zeros is not
    /// enough; the tree is rebuilt from the raw values. Doubling keeps the
    /// amortized update cost logarithmic.
    fn grow(&mut self, min_len: usize) {
        let new_len = min_len.max(self.values.len() * 2).max(8);
        self.values.resize(new_len, 0);
        self.tree = vec![0; new_len + 1];
        for i in 1..=new_len {
            self.tree[i] += self.values[i - 1];
            let parent = i + (i & i.wrapping_neg());
            if parent <= new_len {
                let child = self.tree[i];
                self.tree[parent] += child;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tree_queries_zero() {
        let bit = Bit::new();
        assert_eq!(bit.query(0), 0);
        assert_eq!(bit.query(100), 0);
        assert!(bit.is_empty());
    }

    #[test]
    fn test_point_update_prefix_sum() {
        let mut bit = Bit::with_capacity(8);
        bit.update(0, 3);
        bit.update(2, 5);
        bit.update(5, -2);

        assert_eq!(bit.query(0), 3);
        assert_eq!(bit.query(1), 3);
        assert_eq!(bit.query(2), 8);
        assert_eq!(bit.query(4), 8);
        assert_eq!(bit.query(5), 6);
        assert_eq!(bit.query(7), 6);
    }

    #[test]
    fn test_repeated_updates_accumulate() {
        let mut bit = Bit::new();
        bit.update(0, 1);
        bit.update(0, 1);
        assert_eq!(bit.query(0), 2);
    }

    #[test]
    fn test_negative_deltas() {
        let mut bit = Bit::new();
        bit.update(3, -4);
        bit.update(1, 1);
        assert_eq!(bit.query(0), 0);
        assert_eq!(bit.query(1), 1);
        assert_eq!(bit.query(3), -3);
    }

    #[test]
    fn test_range_query() {
        let mut bit = Bit::with_capacity(10);
        for i in 0..10 {
            bit.update(i, (i as i64) + 1);
        }
        // values are 1..=10
        assert_eq!(bit.range_query(0, 9), 55);
        assert_eq!(bit.range_query(3, 5), 4 + 5 + 6);
        assert_eq!(bit.range_query(9, 9), 10);
    }

    #[test]
    fn test_grows_on_demand() {
        let mut bit = Bit::new();
        bit.update(1000, 7);
        assert!(bit.len() > 1000);
        assert_eq!(bit.query(999), 0);
        assert_eq!(bit.query(1000), 7);

        // Earlier values survive the rebuild.
        bit.update(2, 3);
        bit.update(5000, 1);
        assert_eq!(bit.query(1000), 10);
        assert_eq!(bit.query(5000), 11);
    }

    #[test]
    fn test_update_then_inverse_restores() {
        let mut bit = Bit::new();
        bit.update(4, 9);
        bit.update(4, -9);
        for r in 0..16 {
            assert_eq!(bit.query(r), 0);
        }
    }

    #[test]
    fn test_query_past_bound_returns_total() {
        let mut bit = Bit::new();
        bit.update(2, 5);
        assert_eq!(bit.query(usize::MAX - 1), 5);
    }
}
