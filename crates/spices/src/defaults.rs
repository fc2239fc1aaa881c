//! External key-value stores that spices persist into.

mod file;
mod memory;

pub use file::{FileDefaults, FileDefaultsBuilder};
pub use memory::MemoryDefaults;

use serde::{Deserialize, Serialize};

use crate::errors::SpicesError;
use crate::observe::Subscription;
use crate::spice::SpiceEnum;

/// A scalar as persisted by a [`Defaults`] backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultsValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<bool> for DefaultsValue {
    fn from(value: bool) -> Self {
        DefaultsValue::Bool(value)
    }
}

impl From<i64> for DefaultsValue {
    fn from(value: i64) -> Self {
        DefaultsValue::Integer(value)
    }
}

impl From<f64> for DefaultsValue {
    fn from(value: f64) -> Self {
        DefaultsValue::Float(value)
    }
}

impl From<String> for DefaultsValue {
    fn from(value: String) -> Self {
        DefaultsValue::String(value)
    }
}

impl From<&str> for DefaultsValue {
    fn from(value: &str) -> Self {
        DefaultsValue::String(value.to_owned())
    }
}

/// Shared key-value store, possibly mutated by other parties.
pub trait Defaults {
    fn value(&self, key: &str) -> Option<DefaultsValue>;

    fn set_value(&self, key: &str, value: DefaultsValue) -> Result<(), SpicesError>;

    fn remove_value(&self, key: &str) -> Result<(), SpicesError>;

    /// `callback` runs after every mutation of the store, whoever made it.
    fn observe(&self, callback: Box<dyn Fn()>) -> Subscription;
}

/// Values that map onto a single [`DefaultsValue`] variant.
pub trait DefaultsScalar: Sized {
    fn to_defaults(&self) -> DefaultsValue;
    fn from_defaults(value: &DefaultsValue) -> Option<Self>;
}

impl DefaultsScalar for bool {
    fn to_defaults(&self) -> DefaultsValue {
        DefaultsValue::Bool(*self)
    }

    fn from_defaults(value: &DefaultsValue) -> Option<Self> {
        match value {
            DefaultsValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl DefaultsScalar for String {
    fn to_defaults(&self) -> DefaultsValue {
        DefaultsValue::String(self.clone())
    }

    fn from_defaults(value: &DefaultsValue) -> Option<Self> {
        match value {
            DefaultsValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Typed view of one persisted key.
pub struct Codec<V> {
    encode: fn(&V) -> DefaultsValue,
    decode: fn(&DefaultsValue) -> Option<V>,
}

impl<V> Clone for Codec<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Codec<V> {}

impl<V: DefaultsScalar> Codec<V> {
    pub fn scalar() -> Self {
        Self {
            encode: V::to_defaults,
            decode: V::from_defaults,
        }
    }
}

impl<V: SpiceEnum> Codec<V> {
    /// Stores the raw text of the enum case.
    pub fn raw_enum() -> Self {
        Self {
            encode: encode_raw::<V>,
            decode: decode_raw::<V>,
        }
    }
}

impl<V> Codec<V> {
    pub fn encode(&self, value: &V) -> DefaultsValue {
        (self.encode)(value)
    }

    pub fn decode(&self, value: &DefaultsValue) -> Option<V> {
        (self.decode)(value)
    }

    /// `None` when the key is absent or holds something that is not a `V`.
    pub fn read(&self, defaults: &dyn Defaults, key: &str) -> Option<V> {
        let stored = defaults.value(key)?;
        let decoded = self.decode(&stored);
        if decoded.is_none() {
            tracing::trace!(key, ?stored, "ignoring undecodable stored value");
        }
        decoded
    }
}

fn encode_raw<E: SpiceEnum>(value: &E) -> DefaultsValue {
    DefaultsValue::String(value.as_ref().to_owned())
}

fn decode_raw<E: SpiceEnum>(value: &DefaultsValue) -> Option<E> {
    match value {
        DefaultsValue::String(raw) => raw.parse().ok(),
        _ => None,
    }
}
