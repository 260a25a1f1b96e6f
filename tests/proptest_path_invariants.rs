//! Property-based invariant tests for path tracking under arbitrary mutation.
//!
//! 1. After any sequence of array mutations, every element is reachable
//!    exactly at `list[i]`, and its descendants at `list[i].<key>`.
//! 2. Elements removed from the array keep no paths.
//! 3. A value shared between several properties is reachable at exactly the
//!    properties currently holding it.

use pathflux::{Component, Observed, Value};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ListOp {
    Push,
    Pop,
    Shift,
    Unshift,
    Reverse,
    SortDescending,
    Splice { start: usize, delete: usize, insert: usize },
    SetIndex(usize),
}

fn list_op_strategy() -> impl Strategy<Value = ListOp> {
    prop_oneof![
        Just(ListOp::Push),
        Just(ListOp::Pop),
        Just(ListOp::Shift),
        Just(ListOp::Unshift),
        Just(ListOp::Reverse),
        Just(ListOp::SortDescending),
        (0usize..8, 0usize..4, 0usize..3)
            .prop_map(|(start, delete, insert)| ListOp::Splice { start, delete, insert }),
        (0usize..8).prop_map(ListOp::SetIndex),
    ]
}

fn paths(value: &Observed) -> BTreeSet<String> {
    value.paths().iter().map(|entry| entry.path.clone()).collect()
}

fn observed(value: &Value) -> Observed {
    value
        .as_observed()
        .cloned()
        .unwrap_or_else(|| panic!("expected an observed value, got {value:?}"))
}

fn id_of(value: &Value) -> f64 {
    value
        .as_observed()
        .and_then(|item| item.peek("id").as_f64())
        .unwrap_or_default()
}

struct Items {
    next_id: u32,
    created: Vec<Observed>,
}

impl Items {
    fn fresh(&mut self) -> serde_json::Value {
        self.next_id += 1;
        json!({"id": self.next_id, "meta": {"tag": self.next_id}})
    }
}

fn apply(list: &Observed, op: &ListOp, items: &mut Items) {
    match op {
        ListOp::Push => {
            list.push(items.fresh()).unwrap();
        }
        ListOp::Pop => {
            list.pop().unwrap();
        }
        ListOp::Shift => {
            list.shift().unwrap();
        }
        ListOp::Unshift => {
            list.unshift(items.fresh()).unwrap();
        }
        ListOp::Reverse => list.reverse().unwrap(),
        ListOp::SortDescending => list
            .sort_by(|a, b| id_of(b).total_cmp(&id_of(a)))
            .unwrap(),
        ListOp::Splice {
            start,
            delete,
            insert,
        } => {
            let inserted: Vec<Value> = (0..*insert).map(|_| Value::from(items.fresh())).collect();
            list.splice(*start, *delete, inserted).unwrap();
        }
        ListOp::SetIndex(index) => {
            // Only in bounds, padding is covered elsewhere.
            if *index < list.items().len() {
                list.set(*index, items.fresh()).unwrap();
            }
        }
    }
    for item in list.items() {
        if let Some(item) = item.as_observed() {
            if !items.created.iter().any(|seen| seen.ptr_eq(item)) {
                items.created.push(item.clone());
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 1 + 2. Array elements track their index; removed elements are severed
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn array_elements_track_their_index(ops in proptest::collection::vec(list_op_strategy(), 1..24)) {
        let page = Component::new("page");
        let data = page.init_data(json!({"list": []})).unwrap();
        let list = observed(&data.peek("list"));
        let mut items = Items { next_id: 0, created: Vec::new() };

        for op in &ops {
            apply(&list, op, &mut items);

            let current = list.items();
            for (index, item) in current.iter().enumerate() {
                let item = observed(item);
                let expected = format!("list[{index}]");
                prop_assert_eq!(paths(&item), BTreeSet::from([expected.clone()]), "after {:?}", op);
                let meta = observed(&item.peek("meta"));
                prop_assert_eq!(paths(&meta), BTreeSet::from([format!("{expected}.meta")]));
            }

            for item in &items.created {
                let present = current
                    .iter()
                    .filter_map(Value::as_observed)
                    .any(|live| live.ptr_eq(item));
                if !present {
                    prop_assert!(paths(item).is_empty(), "removed item kept {:?}", paths(item));
                    prop_assert!(paths(&observed(&item.peek("meta"))).is_empty());
                }
            }
        }
        page.destroy();
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Shared values are reachable exactly where they are held
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn shared_value_paths_follow_assignments(
        assignments in proptest::collection::vec((0usize..4, any::<bool>()), 1..32)
    ) {
        const KEYS: [&str; 4] = ["k0", "k1", "k2", "k3"];
        let page = Component::new("page");
        let data = page
            .init_data(json!({"k0": null, "k1": null, "k2": null, "k3": null}))
            .unwrap();
        let shared = observed(&data.set("k0", json!({"inner": {"leaf": 0}})).unwrap());
        let inner = observed(&shared.peek("inner"));
        let mut holders = [true, false, false, false];

        for (step, (slot, share)) in assignments.into_iter().enumerate() {
            if share {
                data.set(KEYS[slot], shared.clone()).unwrap();
            } else {
                data.set(KEYS[slot], json!({"fresh": step})).unwrap();
            }
            holders[slot] = share;

            let expected: BTreeSet<String> = KEYS
                .iter()
                .zip(holders)
                .filter(|(_, held)| *held)
                .map(|(key, _)| key.to_string())
                .collect();
            let expected_inner: BTreeSet<String> =
                expected.iter().map(|key| format!("{key}.inner")).collect();
            prop_assert_eq!(paths(&shared), expected);
            prop_assert_eq!(paths(&inner), expected_inner);
        }
        page.destroy();
    }
}
