#![cfg(test)]

// RecencyTable property tests: a newest-first Vec model, run with both a
// random and an all-colliding hasher.

use crate::recency_table::{Handle, RecencyTable};
use proptest::prelude::*;
use std::collections::HashMap;
use std::hash::Hasher;

#[derive(Clone, Debug)]
enum Op {
    Push(usize, i32),
    Remove(usize),
    PopOldest,
    Find(usize),
    Contains(String),
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=8).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let op = prop_oneof![
            (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Push(i, v)),
            idx.clone().prop_map(Op::Remove),
            Just(Op::PopOldest),
            idx.clone().prop_map(Op::Find),
            "[a-z]{0,5}".prop_map(Op::Contains),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

// The model is a Vec ordered newest-first; the table must agree with it on
// membership, values, recency order, and the end pointers after every op.
fn run_against_model<S: std::hash::BuildHasher>(
    mut sut: RecencyTable<String, i32, S>,
    pool: Vec<String>,
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let mut model: Vec<(String, i32)> = Vec::new();
    let mut live: HashMap<String, Handle> = HashMap::new();
    let mut stale: Vec<Handle> = Vec::new();

    for op in ops {
        match op {
            Op::Push(i, v) => {
                let k = pool[i].clone();
                let already = model.iter().any(|(mk, _)| *mk == k);
                match sut.push_front(k.clone(), v) {
                    Ok(h) => {
                        prop_assert!(!already, "push must fail on duplicate");
                        live.insert(k.clone(), h);
                        model.insert(0, (k, v));
                    }
                    Err(dup) => {
                        prop_assert!(already, "duplicate only when key exists");
                        prop_assert_eq!(dup.key, k);
                        prop_assert_eq!(dup.value, v);
                    }
                }
            }
            Op::Remove(i) => {
                let k = &pool[i];
                if let Some(h) = live.remove(k) {
                    let (kk, vv) = sut.remove(h).expect("live handle removable");
                    let pos = model.iter().position(|(mk, _)| mk == k).expect("in model");
                    let (mk, mv) = model.remove(pos);
                    prop_assert_eq!(kk, mk);
                    prop_assert_eq!(vv, mv);
                    stale.push(h);
                } else {
                    prop_assert!(sut.find(k.as_str()).is_none());
                }
            }
            Op::PopOldest => {
                let got = sut.pop_oldest();
                let want = model.pop();
                prop_assert_eq!(&got, &want);
                if let Some((k, _)) = got {
                    let h = live.remove(&k).expect("tracked");
                    stale.push(h);
                }
            }
            Op::Find(i) => {
                let k = &pool[i];
                prop_assert_eq!(sut.find(k.as_str()), live.get(k).copied());
            }
            Op::Contains(s) => {
                let has_model = model.iter().any(|(mk, _)| *mk == s);
                prop_assert_eq!(sut.contains_key(s.as_str()), has_model);
            }
        }

        let order: Vec<(String, i32)> = sut.iter().map(|(_, k, v)| (k.clone(), *v)).collect();
        prop_assert_eq!(&order, &model);
        prop_assert_eq!(
            sut.newest().and_then(|h| h.key(&sut)).cloned(),
            model.first().map(|(k, _)| k.clone())
        );
        prop_assert_eq!(
            sut.oldest().and_then(|h| h.key(&sut)).cloned(),
            model.last().map(|(k, _)| k.clone())
        );
        for &h in &stale {
            if !live.values().any(|&lh| lh == h) {
                prop_assert!(h.value(&sut).is_none());
            }
        }
        prop_assert_eq!(sut.len(), model.len());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_recency_model((pool, ops) in arb_scenario()) {
        run_against_model(RecencyTable::new(), pool, ops)?;
    }
}

#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl std::hash::BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

// Same model under worst-case collisions.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_recency_model_with_collisions((pool, ops) in arb_scenario()) {
        run_against_model(RecencyTable::with_hasher(ConstBuildHasher), pool, ops)?;
    }
}
