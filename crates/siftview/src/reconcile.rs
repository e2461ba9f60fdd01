//! Minimal remove/insert edit scripts between two orderings.
//!
//! [`plan`] turns the current derived list into the new candidate list using
//! only the two primitive edits views publish. Each edit is expressed against
//! the list as it stands after all previous edits, so applying them in order
//! and notifying after each one keeps listeners consistent.
//!
//! The plan is minimal: records absent from the new list are removed once,
//! records new to it are inserted once, and of the records present in both
//! only those outside the longest already-ordered run are moved (one remove
//! plus one insert each).

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// One primitive edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edit {
    /// Remove the element currently at `index`.
    Remove { index: usize },
    /// Insert `new[index]` at `index`.
    Insert { index: usize },
}

/// Computes the edit script turning `old` into `new`.
///
/// Both slices must be free of duplicates.
///
/// # Panics
///
/// Panics if an element of the stable run is found away from its target
/// index during the walk. That cannot happen for duplicate-free input and
/// indicates corrupted bookkeeping.
pub(crate) fn plan<K: Copy + Eq + Hash>(old: &[K], new: &[K]) -> Vec<Edit> {
    let target: HashMap<K, usize> = new.iter().enumerate().map(|(i, k)| (*k, i)).collect();
    let mut working: Vec<K> = old.to_vec();
    let mut edits = Vec::new();

    // Drop everything that no longer belongs, highest index first.
    for j in (0..working.len()).rev() {
        if !target.contains_key(&working[j]) {
            working.remove(j);
            edits.push(Edit::Remove { index: j });
        }
    }

    let stable = longest_ordered_run(&working, &target);

    for (i, key) in new.iter().enumerate() {
        // Misplaced records sitting in the way are taken out now and
        // reinserted when their own target index comes up.
        while i < working.len() && working[i] != *key && !stable.contains(&working[i]) {
            working.remove(i);
            edits.push(Edit::Remove { index: i });
        }

        if working.get(i) == Some(key) {
            continue;
        }

        if let Some(offset) = working[i.min(working.len())..].iter().position(|k| k == key) {
            let j = i + offset;
            assert!(
                !stable.contains(key),
                "reconciliation found an in-order record at {j}, expected at {i}"
            );
            working.remove(j);
            edits.push(Edit::Remove { index: j });
        }

        working.insert(i, *key);
        edits.push(Edit::Insert { index: i });
    }

    for j in (new.len()..working.len()).rev() {
        working.remove(j);
        edits.push(Edit::Remove { index: j });
    }

    debug_assert!(working == new);
    edits
}

/// Members of `seq` forming the longest run whose target indices increase.
fn longest_ordered_run<K: Copy + Eq + Hash>(seq: &[K], target: &HashMap<K, usize>) -> HashSet<K> {
    let positions: Vec<usize> = seq.iter().map(|k| target[k]).collect();

    // Patience sorting: tails[l] is the index in `positions` of the smallest
    // tail of an increasing run of length l + 1.
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; positions.len()];
    for (idx, &pos) in positions.iter().enumerate() {
        let slot = tails.partition_point(|&t| positions[t] < pos);
        if slot > 0 {
            previous[idx] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(idx);
        } else {
            tails[slot] = idx;
        }
    }

    let mut run = HashSet::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(idx) = cursor {
        run.insert(seq[idx]);
        cursor = previous[idx];
    }
    run
}
