use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;

fn validate_tree<V>(t: &Tree<V>) {
    let issues = t.verify_integrity();
    assert!(issues.is_empty(), "integrity violations: {issues:#?}");
    assert_eq!(t.leaves_in_subtree(), t.len());
}

#[derive(Clone, Debug)]
enum Op {
    Insert(Vec<u8>, u64),
    Delete(Vec<u8>),
    DeletePrefix(Vec<u8>),
    Get(Vec<u8>),
    Snapshot,
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    // A tiny alphabet forces shared prefixes, splits and merges. 0x00 and
    // 0xff check that ordering is plain unsigned byte order.
    prop::collection::vec(prop::sample::select(vec![b'a', b'b', 0x00, 0xff]), 0..=6)
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let op = prop_oneof![
        50 => (key.clone(), any::<u64>()).prop_map(|(k, v)| Op::Insert(k, v)),
        20 => key.clone().prop_map(Op::Delete),
        4 => prop::collection::vec(prop::sample::select(vec![b'a', b'b', 0x00, 0xff]), 1..=3)
            .prop_map(Op::DeletePrefix),
        20 => key.clone().prop_map(Op::Get),
        6 => Just(Op::Snapshot),
    ];
    prop::collection::vec(op, 0..=300)
}

fn model_entries(m: &BTreeMap<Vec<u8>, u64>) -> Vec<(Vec<u8>, u64)> {
    m.iter().map(|(k, v)| (k.clone(), *v)).collect()
}

fn tree_entries<'a>(it: impl Iterator<Item = (&'a [u8], &'a u64)>) -> Vec<(Vec<u8>, u64)> {
    it.map(|(k, v)| (k.to_vec(), *v)).collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(ops in ops_strategy()) {
        let mut t: Tree<u64> = Tree::new();
        let mut m: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
        let mut snapshots: Vec<(Tree<u64>, BTreeMap<Vec<u8>, u64>)> = Vec::new();

        for op in ops {
            match op {
                Op::Insert(key, value) => {
                    let (next, old_t) = t.insert(&key, value);
                    let old_m = m.insert(key, value);
                    prop_assert_eq!(old_t, old_m);
                    t = next;
                }
                Op::Delete(key) => {
                    let (next, old_t) = t.delete(&key);
                    let old_m = m.remove(key.as_slice());
                    prop_assert_eq!(old_t, old_m);
                    t = next;
                }
                Op::DeletePrefix(prefix) => {
                    let (next, removed) = t.delete_prefix(&prefix);
                    let before = m.len();
                    m.retain(|k, _| !k.starts_with(&prefix));
                    prop_assert_eq!(removed, before - m.len());
                    t = next;
                }
                Op::Get(key) => {
                    prop_assert_eq!(t.get(&key).copied(), m.get(key.as_slice()).copied());
                }
                Op::Snapshot => {
                    snapshots.push((t.clone(), m.clone()));
                }
            }

            prop_assert_eq!(t.len(), m.len());
        }

        validate_tree(&t);
        prop_assert_eq!(tree_entries(t.iter()), model_entries(&m));

        // Older snapshots never see later writes.
        for (snap, model) in &snapshots {
            validate_tree(snap);
            prop_assert_eq!(tree_entries(snap.iter()), model_entries(model));
        }
    }

    #[test]
    fn prop_ordered_queries(
        entries in prop::collection::btree_map(key_strategy(), any::<u64>(), 0..=40),
        probe in key_strategy(),
    ) {
        let t: Tree<u64> = entries.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
        validate_tree(&t);

        // Reverse iteration.
        let mut expected = model_entries(&entries);
        expected.reverse();
        prop_assert_eq!(tree_entries(t.reverse_iter()), expected);

        // Lower bound.
        let mut lb = t.lower_bound_iter();
        lb.seek_lower_bound(&probe);
        let expected: Vec<_> = entries
            .range(probe.clone()..)
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        prop_assert_eq!(tree_entries(lb), expected);

        // Reverse lower bound.
        let mut rlb = t.reverse_iter();
        rlb.seek_reverse_lower_bound(&probe);
        let expected: Vec<_> = entries
            .range(..=probe.clone())
            .rev()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        prop_assert_eq!(tree_entries(rlb), expected);

        // Prefix iteration in both directions.
        let expected: Vec<_> = entries
            .iter()
            .filter(|(k, _)| k.starts_with(&probe))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        prop_assert_eq!(tree_entries(t.iter_prefix(&probe)), expected.clone());
        let mut rev = t.reverse_iter();
        rev.seek_prefix(&probe);
        let mut got = tree_entries(rev);
        got.reverse();
        prop_assert_eq!(got, expected);

        // Prefix matches along the probe.
        let expected: Vec<_> = entries
            .iter()
            .filter(|(k, _)| probe.starts_with(k))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        prop_assert_eq!(tree_entries(t.find_matching_prefixes(&probe).into_iter()), expected.clone());
        prop_assert_eq!(
            t.longest_prefix(&probe).map(|(k, v)| (k.to_vec(), *v)),
            expected.last().cloned()
        );

        // Rank.
        for (rank, (k, v)) in entries.iter().enumerate() {
            prop_assert_eq!(t.get_at_index(rank), Some((k.as_slice(), v)));
        }
        prop_assert_eq!(t.get_at_index(entries.len()), None);

        prop_assert_eq!(t.minimum().map(|(k, _)| k.to_vec()), entries.keys().next().cloned());
        prop_assert_eq!(t.maximum().map(|(k, _)| k.to_vec()), entries.keys().next_back().cloned());
    }

    #[test]
    fn prop_transaction_matches_single_ops(
        ops in prop::collection::vec((key_strategy(), any::<bool>()), 0..=60),
    ) {
        // One transaction versus a chain of single-op snapshots.
        let mut txn = Tree::new().txn();
        let mut chained: Tree<u64> = Tree::new();
        for (i, (key, insert)) in ops.into_iter().enumerate() {
            if insert {
                prop_assert_eq!(txn.insert(&key, i as u64), chained.insert(&key, i as u64).1);
                chained = chained.insert(&key, i as u64).0;
            } else {
                prop_assert_eq!(txn.delete(&key), chained.delete(&key).1);
                chained = chained.delete(&key).0;
            }
        }
        let batched = txn.commit();
        validate_tree(&batched);
        prop_assert_eq!(tree_entries(batched.iter()), tree_entries(chained.iter()));
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

fn small_key_set() -> Vec<Vec<u8>> {
    vec![
        b"".to_vec(),
        b"a".to_vec(),
        b"b".to_vec(),
        b"aa".to_vec(),
        b"ab".to_vec(),
        b"ba".to_vec(),
    ]
}

#[test]
fn exhaustive_insert_order_small_set() {
    let keys = small_key_set();

    for_each_permutation(&keys, |perm| {
        let mut t: Tree<u64> = Tree::new();
        let mut m: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

        for (i, k) in perm.into_iter().enumerate() {
            let v = i as u64;
            let (next, old) = t.insert(&k, v);
            assert_eq!(old, m.insert(k, v));
            validate_tree(&next);
            t = next;
        }

        assert_eq!(tree_entries(t.iter()), model_entries(&m));
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    let keys = small_key_set();

    // Insert in a fixed order, then remove in all permutations.
    let base_map: BTreeMap<Vec<u8>, u64> = keys.iter().cloned().zip(0..).collect();
    let base_tree: Tree<u64> = base_map.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
    validate_tree(&base_tree);

    for_each_permutation(&keys, |perm| {
        let mut t = base_tree.clone();
        let mut m = base_map.clone();

        for k in perm {
            let (next, old) = t.delete(&k);
            assert_eq!(old, m.remove(k.as_slice()));
            assert_eq!(next.len(), m.len());
            validate_tree(&next);
            t = next;
        }
        assert!(t.is_empty());
        assert!(t.root().edges().is_empty());
        assert!(!t.root().is_leaf());

        // Removing from a clone never disturbs the base.
        assert_eq!(base_tree.len(), keys.len());
    });
}

#[test]
fn exhaustive_delete_prefix_small_set() {
    let keys = small_key_set();
    let base: Tree<u64> = keys.iter().map(|k| (k.as_slice(), 0)).collect();

    let prefixes: [&[u8]; 6] = [b"", b"a", b"aa", b"b", b"c", b"ab"];
    for prefix in prefixes {
        let (t, removed) = base.delete_prefix(prefix);
        let expected = keys.iter().filter(|k| k.starts_with(prefix)).count();
        assert_eq!(removed, expected, "prefix {prefix:?}");
        assert_eq!(t.len(), keys.len() - expected);
        validate_tree(&t);
        assert!(t.iter().all(|(k, _)| !k.starts_with(prefix)));
    }
    validate_tree(&base);
}
