//! Concurrent mutation of a container and its records while views observe it.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use common::{Item, Replica, same_records};
use siftview::{Container, Predicate, RecordList, SortSpec, ViewEngine};

#[test]
fn test_concurrent_mutators_leave_views_consistent() {
    let list = Arc::new(RecordList::<Item>::new());
    let view = ViewEngine::<Item>::new();
    view.set_sort(SortSpec::by_field("rank"));
    view.set_filter(Predicate::starts_with("title", "keep"));
    let replica = Arc::new(Replica::default());
    view.subscribe(replica.clone());
    view.attach_container(list.clone());

    let chained = ViewEngine::<Item>::new();
    chained.chain_from(&view);

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let list = list.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    let title = if i % 3 == 0 { "drop" } else { "keep" };
                    let item = Item::with_rank(title, (i * 7 + t) % 11);
                    if i % 2 == 0 {
                        list.insert(0, item.clone());
                    } else {
                        list.push(item.clone());
                    }
                    if i % 5 == 0 {
                        list.remove_record(&item);
                    }
                }
            })
        })
        .collect();

    let stop = Arc::new(AtomicBool::new(false));
    let retitler = {
        let list = list.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut n = 0i64;
            while !stop.load(Ordering::Relaxed) {
                if let Some(item) = list.get(n as usize % list.len().max(1)) {
                    item.rerank(n % 17);
                }
                n += 1;
            }
        })
    };

    let reader = {
        let view = view.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                let items = view.items();
                assert!(items.iter().all(|r| r.title().starts_with("keep")));
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    retitler.join().unwrap();
    reader.join().unwrap();

    // Quiescent: settle any order drift from in-flight content changes.
    view.set_sort(SortSpec::by_field("rank"));

    let items = view.items();
    assert!(same_records(&replica.records(), &items));
    assert!(same_records(&chained.items(), &items));
    assert_eq!(view.master_len(), list.len());
    assert!(items.windows(2).all(|w| w[0].rank() <= w[1].rank()));
    assert_eq!(
        items.len(),
        list.records().iter().filter(|r| r.title().starts_with("keep")).count()
    );
}

#[test]
fn test_batches_from_several_threads() {
    let view = ViewEngine::<Item>::new();
    view.set_sort(SortSpec::by_field("title"));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let view = view.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let _batch = view.change_scope();
                    let item = Item::new(&format!("{t}-{i:02}"));
                    view.notify_inserted(view.master_len(), item);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(view.change_level(), 0);
    assert_eq!(view.len(), 100);
    let titles: Vec<_> = view.items().iter().map(|r| r.title()).collect();
    let mut sorted = titles.clone();
    sorted.sort();
    assert_eq!(titles, sorted);
}
