//! Deep traversal for `deep` watchers.
//!
//! Walking a value reads every nested property through the reactive getter,
//! so the evaluating watcher ends up subscribed to all of them. Each observer
//! is visited once, which also makes shared or cyclic structures safe.

use crate::dep::DepId;
use crate::hash::FastHashSet;
use crate::value::Value;

/// Touch every reactive property reachable from `value`.
pub fn traverse(value: &Value) {
    let mut seen = FastHashSet::default();
    walk(value, &mut seen);
}

fn walk(value: &Value, seen: &mut FastHashSet<DepId>) {
    let Value::Observed(ob) = value else {
        return;
    };
    if !seen.insert(ob.dep().id()) {
        cov_mark::hit!(traverse_visited_once);
        return;
    }

    if ob.is_array() {
        for item in ob.items() {
            walk(&item, seen);
        }
    } else {
        for key in ob.keys() {
            walk(&ob.get(key), seen);
        }
    }
}
