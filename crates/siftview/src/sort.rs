//! Sort specifications for views.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::record::{Record, Value};

/// Type alias for a sort key extraction function.
pub type KeyFn<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;

/// A key-extraction function plus a direction.
///
/// A view without a sort spec preserves the relative order of its source.
pub struct SortSpec<T> {
    key: KeyFn<T>,
    reverse: bool,
}

impl<T> SortSpec<T> {
    /// Creates an ascending sort on the given key.
    pub fn new<F>(key: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        Self {
            key: Arc::new(key),
            reverse: false,
        }
    }

    /// Sets the direction.
    pub fn reversed(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Returns true if the sort is descending.
    pub fn is_reversed(&self) -> bool {
        self.reverse
    }

    /// Extracts the sort key of a record.
    pub fn key(&self, record: &T) -> Value {
        (self.key)(record)
    }

    /// Compares two already extracted keys, honoring the direction.
    pub fn compare_keys(&self, a: &Value, b: &Value) -> Ordering {
        let ord = a.cmp(b);
        if self.reverse {
            ord.reverse()
        } else {
            ord
        }
    }

    /// Compares two records, honoring the direction.
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.compare_keys(&self.key(a), &self.key(b))
    }

    /// Positions `0..len` of a sorted sequence whose keys equal `key`.
    ///
    /// `get(i)` returns the record at position `i`. When no key is equal the
    /// range is empty and starts where `key` belongs.
    pub(crate) fn equal_range<'a>(&self, len: usize, key: &Value, get: impl Fn(usize) -> &'a T) -> Range<usize>
    where
        T: 'a,
    {
        let compare = |i: usize| self.compare_keys(&self.key(get(i)), key);
        let start = partition_point(0, len, |i| compare(i) == Ordering::Less);
        let end = partition_point(start, len, |i| compare(i) != Ordering::Greater);
        start..end
    }
}

/// First index in `lo..hi` for which `pred` is false; `pred` must hold for a
/// prefix of the range only.
fn partition_point(mut lo: usize, mut hi: usize, pred: impl Fn(usize) -> bool) -> usize {
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

impl<T: Record> SortSpec<T> {
    /// Sorts on the value of a named record field; missing fields sort first
    /// (ascending) as [`Value::Null`].
    pub fn by_field(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(move |record: &T| record.field(&name).unwrap_or(Value::Null))
    }
}

impl<T> Clone for SortSpec<T> {
    fn clone(&self) -> Self {
        Self {
            key: Arc::clone(&self.key),
            reverse: self.reverse,
        }
    }
}

impl<T> fmt::Debug for SortSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortSpec")
            .field("reverse", &self.reverse)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Record for Named {
        fn field(&self, name: &str) -> Option<Value> {
            (name == "title").then(|| Value::from(self.0))
        }
    }

    #[test]
    fn test_compare_honors_direction() {
        let ascending = SortSpec::<Named>::by_field("title");
        assert_eq!(ascending.compare(&Named("A"), &Named("B")), Ordering::Less);

        let descending = SortSpec::<Named>::by_field("title").reversed(true);
        assert!(descending.is_reversed());
        assert_eq!(descending.compare(&Named("A"), &Named("B")), Ordering::Greater);
    }

    #[test]
    fn test_missing_field_sorts_as_null() {
        let spec = SortSpec::<Named>::by_field("created");
        assert_eq!(spec.key(&Named("A")), Value::Null);
    }

    #[test]
    fn test_equal_range() {
        let spec = SortSpec::<Named>::by_field("title");
        let sorted = [Named("A"), Named("B"), Named("B"), Named("C")];
        let range = |title: &'static str| spec.equal_range(sorted.len(), &Value::from(title), |i| &sorted[i]);
        assert_eq!(range("B"), 1..3);
        assert_eq!(range("0"), 0..0);
        assert_eq!(range("BB"), 3..3);
        assert_eq!(range("Z"), 4..4);

        let reverse = SortSpec::<Named>::by_field("title").reversed(true);
        let sorted = [Named("C"), Named("B"), Named("A")];
        assert_eq!(reverse.equal_range(sorted.len(), &Value::from("B"), |i| &sorted[i]), 1..2);
        assert_eq!(reverse.equal_range(sorted.len(), &Value::from("BB"), |i| &sorted[i]), 1..1);
    }
}
