//! The record contract and the dynamic values records expose.
//!
//! A view never inspects record content directly. It asks predicates to test
//! a record, asks a sort key function for a [`Value`], and listens to the
//! record's content-changed signal. Records are shared as `Arc<T>` and are
//! compared by identity (the `Arc` allocation), never by content.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use siftview_core::Signal;

/// A domain object that can be shown in a view.
///
/// Both methods are optional. Records that only participate in custom
/// predicates and custom sort keys need not implement either.
///
/// # Example
///
/// ```
/// use parking_lot::RwLock;
/// use siftview::{Record, Value};
/// use siftview_core::Signal;
///
/// struct Acquisition {
///     title: RwLock<String>,
///     changed: Signal<()>,
/// }
///
/// impl Record for Acquisition {
///     fn field(&self, name: &str) -> Option<Value> {
///         match name {
///             "title" => Some(Value::from(self.title.read().as_str())),
///             _ => None,
///         }
///     }
///
///     fn content_changed(&self) -> Option<&Signal<()>> {
///         Some(&self.changed)
///     }
/// }
/// ```
pub trait Record: Send + Sync + 'static {
    /// Returns the value of a named field, or `None` if the record has no
    /// such field.
    fn field(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Returns the signal the record emits after its content changed.
    ///
    /// Container-bound sources connect to it and forward each emission to
    /// the view as an update.
    fn content_changed(&self) -> Option<&Signal<()>> {
        None
    }
}

/// Identity of a shared record: the address of its allocation.
///
/// Only meaningful while the record is alive; views keep every record they
/// track alive, so keys never collide within one view.
pub(crate) fn record_key<T>(record: &Arc<T>) -> usize {
    Arc::as_ptr(record) as *const () as usize
}

/// A dynamically typed, totally ordered field value.
///
/// Ordering across kinds is `Null < Bool < numbers < Text < Date`. Integers
/// and floats compare exactly by numeric value with each other.
#[derive(Debug, Clone)]
pub enum Value {
    /// No value.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating point number.
    Float(f64),
    /// A text value.
    Text(String),
    /// A calendar date and time.
    Date(NaiveDateTime),
}

impl Value {
    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as a string slice, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as a date, if it is one.
    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Date(_) => 4,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => compare_floats(*a, *b),
            (Value::Int(a), Value::Float(b)) => compare_int_float(*a, *b),
            (Value::Float(a), Value::Int(b)) => compare_int_float(*b, *a).reverse(),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}

/// Numeric order with `-0.0 == 0.0`. NaN sorts below every number when
/// negative and above every number when positive.
fn compare_floats(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}

/// Compares an integer with a float exactly, without rounding the integer.
fn compare_int_float(i: i64, f: f64) -> Ordering {
    // 2^63 is exactly representable; every float in [-2^63, 2^63) truncates
    // to an i64 without loss.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return if f.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if f >= LIMIT {
        return Ordering::Less;
    }
    if f < -LIMIT {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    i.cmp(&(whole as i64))
        .then_with(|| 0.0f64.partial_cmp(&(f - whole)).unwrap_or(Ordering::Equal))
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{d}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value.and_time(chrono::NaiveTime::MIN))
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(value: Option<V>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
