//! Composable record predicates.
//!
//! A [`Predicate`] decides view membership. Predicates are pure: they hold no
//! per-record state and may be evaluated concurrently from several threads.
//! Replacing the predicate of a live view re-evaluates every record.
//!
//! # Example
//!
//! ```
//! use siftview::{Predicate, Value};
//!
//! // Everything whose title does not start with "D" and whose kind is "image".
//! let filter: Predicate<()> = Predicate::and(vec![
//!     Predicate::starts_with("title", "D").negate(),
//!     Predicate::eq("kind", "image"),
//! ]);
//! # let _ = filter;
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::Datelike;

use crate::record::{Record, Value};

/// Type alias for a custom predicate function.
pub type PredicateFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A boolean test over one record.
pub enum Predicate<T> {
    /// Matches everything (`true`) or nothing (`false`).
    Const(bool),
    /// Matches when every child matches. An empty list matches everything.
    And(Vec<Predicate<T>>),
    /// Matches when any child matches. An empty list matches nothing.
    Or(Vec<Predicate<T>>),
    /// Matches when the child does not.
    Not(Box<Predicate<T>>),
    /// Field `key` exists and equals `value`.
    Eq { key: String, value: Value },
    /// Negation of [`Predicate::Eq`]; a missing field is "not equal".
    NotEq { key: String, value: Value },
    /// Text field `key` starts with `prefix`.
    StartsWith { key: String, prefix: String },
    /// Case-insensitive substring search over the display form of `keys`.
    /// Empty `text` matches everything.
    TextSearch { keys: Vec<String>, text: String },
    /// Date field `key` matches every given part.
    PartialDate {
        key: String,
        year: Option<i32>,
        month: Option<u32>,
        day: Option<u32>,
    },
    /// Arbitrary test supplied by the caller.
    Custom(PredicateFn<T>),
}

impl<T> Predicate<T> {
    /// A predicate matching every record.
    pub fn all() -> Self {
        Predicate::Const(true)
    }

    /// A predicate matching no record.
    pub fn none() -> Self {
        Predicate::Const(false)
    }

    /// Conjunction of `children`.
    pub fn and(children: Vec<Predicate<T>>) -> Self {
        Predicate::And(children)
    }

    /// Disjunction of `children`.
    pub fn or(children: Vec<Predicate<T>>) -> Self {
        Predicate::Or(children)
    }

    /// Negation of this predicate.
    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Field equality.
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Field inequality.
    pub fn not_eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::NotEq {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Text prefix test.
    pub fn starts_with(key: impl Into<String>, prefix: impl Into<String>) -> Self {
        Predicate::StartsWith {
            key: key.into(),
            prefix: prefix.into(),
        }
    }

    /// Case-insensitive substring search across several fields.
    pub fn text_search<K, S>(keys: K, text: impl Into<String>) -> Self
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Predicate::TextSearch {
            keys: keys.into_iter().map(Into::into).collect(),
            text: text.into(),
        }
    }

    /// Date-part test; `None` parts are ignored.
    pub fn partial_date(
        key: impl Into<String>,
        year: Option<i32>,
        month: Option<u32>,
        day: Option<u32>,
    ) -> Self {
        Predicate::PartialDate {
            key: key.into(),
            year,
            month,
            day,
        }
    }

    /// Custom test.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Predicate::Custom(Arc::new(f))
    }
}

impl<T: Record> Predicate<T> {
    /// Tests a record.
    pub fn matches(&self, record: &T) -> bool {
        match self {
            Predicate::Const(default) => *default,
            Predicate::And(children) => children.iter().all(|p| p.matches(record)),
            Predicate::Or(children) => children.iter().any(|p| p.matches(record)),
            Predicate::Not(child) => !child.matches(record),
            Predicate::Eq { key, value } => record.field(key).is_some_and(|v| v == *value),
            Predicate::NotEq { key, value } => !record.field(key).is_some_and(|v| v == *value),
            Predicate::StartsWith { key, prefix } => record
                .field(key)
                .is_some_and(|v| v.as_str().is_some_and(|s| s.starts_with(prefix.as_str()))),
            Predicate::TextSearch { keys, text } => {
                if text.is_empty() {
                    return true;
                }
                let needle = text.to_lowercase();
                keys.iter().any(|key| {
                    record
                        .field(key)
                        .is_some_and(|v| v.to_string().to_lowercase().contains(&needle))
                })
            }
            Predicate::PartialDate {
                key,
                year,
                month,
                day,
            } => record.field(key).and_then(|v| v.as_date()).is_some_and(|date| {
                year.is_none_or(|y| date.year() == y)
                    && month.is_none_or(|m| date.month() == m)
                    && day.is_none_or(|d| date.day() == d)
            }),
            Predicate::Custom(f) => f(record),
        }
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        match self {
            Predicate::Const(b) => Predicate::Const(*b),
            Predicate::And(children) => Predicate::And(children.clone()),
            Predicate::Or(children) => Predicate::Or(children.clone()),
            Predicate::Not(child) => Predicate::Not(child.clone()),
            Predicate::Eq { key, value } => Predicate::Eq {
                key: key.clone(),
                value: value.clone(),
            },
            Predicate::NotEq { key, value } => Predicate::NotEq {
                key: key.clone(),
                value: value.clone(),
            },
            Predicate::StartsWith { key, prefix } => Predicate::StartsWith {
                key: key.clone(),
                prefix: prefix.clone(),
            },
            Predicate::TextSearch { keys, text } => Predicate::TextSearch {
                keys: keys.clone(),
                text: text.clone(),
            },
            Predicate::PartialDate {
                key,
                year,
                month,
                day,
            } => Predicate::PartialDate {
                key: key.clone(),
                year: *year,
                month: *month,
                day: *day,
            },
            Predicate::Custom(f) => Predicate::Custom(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Const(b) => f.debug_tuple("Const").field(b).finish(),
            Predicate::And(children) => f.debug_tuple("And").field(children).finish(),
            Predicate::Or(children) => f.debug_tuple("Or").field(children).finish(),
            Predicate::Not(child) => f.debug_tuple("Not").field(child).finish(),
            Predicate::Eq { key, value } => f
                .debug_struct("Eq")
                .field("key", key)
                .field("value", value)
                .finish(),
            Predicate::NotEq { key, value } => f
                .debug_struct("NotEq")
                .field("key", key)
                .field("value", value)
                .finish(),
            Predicate::StartsWith { key, prefix } => f
                .debug_struct("StartsWith")
                .field("key", key)
                .field("prefix", prefix)
                .finish(),
            Predicate::TextSearch { keys, text } => f
                .debug_struct("TextSearch")
                .field("keys", keys)
                .field("text", text)
                .finish(),
            Predicate::PartialDate {
                key,
                year,
                month,
                day,
            } => f
                .debug_struct("PartialDate")
                .field("key", key)
                .field("year", year)
                .field("month", month)
                .field("day", day)
                .finish(),
            Predicate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    struct Item {
        title: &'static str,
        kind: &'static str,
        created: NaiveDate,
    }

    impl Record for Item {
        fn field(&self, name: &str) -> Option<Value> {
            match name {
                "title" => Some(Value::from(self.title)),
                "kind" => Some(Value::from(self.kind)),
                "created" => Some(Value::from(self.created)),
                _ => None,
            }
        }
    }

    fn item(title: &'static str) -> Item {
        Item {
            title,
            kind: "image",
            created: NaiveDate::from_ymd_opt(2019, 6, 14).unwrap(),
        }
    }

    #[test]
    fn test_const_and_empty_combinators() {
        let record = item("ABC");
        assert!(Predicate::<Item>::all().matches(&record));
        assert!(!Predicate::<Item>::none().matches(&record));
        assert!(Predicate::<Item>::and(vec![]).matches(&record));
        assert!(!Predicate::<Item>::or(vec![]).matches(&record));
    }

    #[test]
    fn test_eq_and_not_eq() {
        let record = item("ABC");
        assert!(Predicate::eq("kind", "image").matches(&record));
        assert!(!Predicate::eq("kind", "line").matches(&record));
        assert!(Predicate::not_eq("kind", "line").matches(&record));
        // Missing fields are never equal.
        assert!(!Predicate::eq("missing", "image").matches(&record));
        assert!(Predicate::not_eq("missing", "image").matches(&record));
    }

    #[test]
    fn test_starts_with_and_not() {
        assert!(Predicate::starts_with("title", "D").matches(&item("DEF")));
        assert!(!Predicate::starts_with("title", "D").matches(&item("ABC")));
        assert!(Predicate::starts_with("title", "D")
            .negate()
            .matches(&item("ABC")));
        // Non-text fields never match a prefix.
        assert!(!Predicate::starts_with("created", "2019").matches(&item("ABC")));
    }

    #[test]
    fn test_text_search_is_case_insensitive() {
        let record = item("Spectrum Image");
        assert!(Predicate::text_search(["title"], "spectrum").matches(&record));
        assert!(Predicate::text_search(["kind", "title"], "IMAGE").matches(&record));
        assert!(!Predicate::text_search(["kind"], "spectrum").matches(&record));
        assert!(Predicate::text_search(Vec::<String>::new(), "").matches(&record));
    }

    #[test]
    fn test_partial_date() {
        let record = item("ABC");
        assert!(Predicate::partial_date("created", Some(2019), None, None).matches(&record));
        assert!(Predicate::partial_date("created", Some(2019), Some(6), Some(14)).matches(&record));
        assert!(!Predicate::partial_date("created", Some(2019), Some(7), None).matches(&record));
        assert!(Predicate::partial_date("created", None, None, Some(14)).matches(&record));
        assert!(!Predicate::partial_date("title", Some(2019), None, None).matches(&record));
    }

    #[test]
    fn test_custom_and_nesting() {
        let filter = Predicate::or(vec![
            Predicate::custom(|r: &Item| r.title.len() > 5),
            Predicate::and(vec![
                Predicate::eq("kind", "image"),
                Predicate::starts_with("title", "G"),
            ]),
        ]);
        assert!(filter.matches(&item("GHI")));
        assert!(filter.matches(&item("Longer title")));
        assert!(!filter.matches(&item("ABC")));
    }

    #[test]
    fn test_clone_is_deep_and_independent() {
        let original = Predicate::<Item>::and(vec![Predicate::starts_with("title", "D")]);
        let mut copy = original.clone();
        if let Predicate::And(children) = &mut copy {
            children.push(Predicate::none());
        }
        assert!(original.matches(&item("DEF")));
        assert!(!copy.matches(&item("DEF")));
        assert!(format!("{original:?}").contains("StartsWith"));
    }
}
