//! Property-based tests for coverage store merging.
//!
//! Stores are generated from a fixed pool of classes, each with its own
//! counter layout, so any two generated stores are merge-compatible. The
//! properties checked are commutativity, associativity, the empty store as
//! neutral element, and that merging a store with itself doubles hit counts.

use jarcov_core::store::{ClassRecord, CoverageStore};
use proptest::prelude::*;

/// Number of distinct classes a generated store can contain.
const CLASS_POOL: usize = 6;

proptest::proptest! {
    /// Property: `a.merge(b) == b.merge(a)`.
    #[test]
    fn prop_merge_is_commutative(a in any_store(), b in any_store()) {
        let left = merged(&a, &b);
        let right = merged(&b, &a);
        prop_assert_eq!(left, right);
    }

    /// Property: `(a.merge(b)).merge(c) == a.merge(b.merge(c))`.
    #[test]
    fn prop_merge_is_associative(a in any_store(), b in any_store(), c in any_store()) {
        let left = merged(&merged(&a, &b), &c);
        let right = merged(&a, &merged(&b, &c));
        prop_assert_eq!(left, right);
    }

    /// Property: the empty store is neutral on both sides.
    #[test]
    fn prop_empty_store_is_neutral(a in any_store()) {
        let empty = CoverageStore::new();
        prop_assert_eq!(merged(&empty, &a), a.clone());
        prop_assert_eq!(merged(&a, &empty), a);
    }

    /// Property: self-merge doubles every hit count and keeps branch flags.
    #[test]
    fn prop_self_merge_doubles_hits(a in any_store()) {
        let doubled = merged(&a, &a);

        prop_assert_eq!(doubled.len(), a.len());
        prop_assert_eq!(doubled.lines_covered(), a.lines_covered());
        prop_assert_eq!(doubled.branches_covered(), a.branches_covered());
        for original in a.classes() {
            let record = doubled.get(&original.name).unwrap();
            for (before, after) in original.lines.iter().zip(&record.lines) {
                prop_assert_eq!(after.hits, before.hits * 2);
            }
            prop_assert_eq!(&record.branches, &original.branches);
        }
    }

    /// Property: merging never changes the set of instrumented lines.
    #[test]
    fn prop_merge_preserves_layout(a in any_store(), b in any_store()) {
        let result = merged(&a, &b);
        for record in result.classes() {
            let from_a = a.get(&record.name).map(|r| r.lines.len());
            let from_b = b.get(&record.name).map(|r| r.lines.len());
            let expected = from_a.or(from_b).unwrap();
            prop_assert_eq!(record.lines.len(), expected);
        }
        prop_assert_eq!(
            result.total_lines(),
            result.classes().map(|r| r.lines.len()).sum::<usize>()
        );
    }
}

fn merged(a: &CoverageStore, b: &CoverageStore) -> CoverageStore {
    let mut out = a.clone();
    out.merge(b).expect("generated stores are layout-compatible");
    out
}

/// Strategy for a record of pool class `index`, with random counters.
fn any_record(index: usize) -> BoxedStrategy<ClassRecord> {
    let line_count = index + 1;
    let arm_count = index * 2;
    (
        prop::collection::vec(0u64..10_000, line_count),
        prop::collection::vec(any::<bool>(), arm_count),
        prop::option::of(prop::sample::select(vec!["Alpha.java", "Beta.java", "Gamma.as"])),
    )
        .prop_map(move |(hits, taken, source)| {
            let mut record = ClassRecord::new(format!("com.acme.C{index}"))
                .with_lines((0..line_count as u32).map(|l| l * 10 + 1))
                .with_branches((0..arm_count as u32).map(|a| ((a / 2) * 10 + 1, a % 2)));
            for (counter, h) in record.lines.iter_mut().zip(hits) {
                counter.hits = h;
            }
            for (counter, t) in record.branches.iter_mut().zip(taken) {
                counter.taken = t;
            }
            record.source_file = source.map(str::to_string);
            record
        })
        .boxed()
}

/// Strategy for a store holding any subset of the class pool.
fn any_store() -> BoxedStrategy<CoverageStore> {
    (0..CLASS_POOL)
        .map(|index| prop::option::of(any_record(index)))
        .collect::<Vec<_>>()
        .prop_map(|records| records.into_iter().flatten().collect())
        .boxed()
}
