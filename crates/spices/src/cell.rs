//! Storage cells: the value slot behind every declaration.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use futures::future::LocalBoxFuture;
use tracing::{error, trace};

use crate::defaults::{Codec, Defaults};
use crate::errors::SpicesError;
use crate::observe::{ChangeStream, Publisher, Subscription};
use crate::store::StoreInner;

/// Handler of a button.
pub type ButtonHandler = dyn Fn() -> anyhow::Result<()>;

/// Handler of an async button.
pub type AsyncButtonHandler = dyn Fn() -> LocalBoxFuture<'static, anyhow::Result<()>>;

/// Something that must be attached to its store before use.
pub(crate) trait Bindable {
    fn bind(&self, identifier: &str, store: &Rc<StoreInner>);
}

struct Binding {
    key: String,
    defaults: Rc<dyn Defaults>,
    store: Weak<StoreInner>,
}

struct DurableInner<V> {
    default: V,
    codec: Codec<V>,
    explicit_key: Option<String>,
    value: RefCell<V>,
    binding: RefCell<Option<Binding>>,
    changes: Publisher<V>,
    defaults_subscription: RefCell<Option<Subscription>>,
}

/// A value persisted under one key of a [`Defaults`] store.
///
/// Until bound the cell reports its default and cannot be written.
pub struct DurableCell<V> {
    inner: Rc<DurableInner<V>>,
}

impl<V> Clone for DurableCell<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Clone + PartialEq + 'static> DurableCell<V> {
    pub fn new(default: V, codec: Codec<V>, explicit_key: Option<String>) -> Self {
        Self {
            inner: Rc::new(DurableInner {
                value: RefCell::new(default.clone()),
                default,
                codec,
                explicit_key,
                binding: RefCell::new(None),
                changes: Publisher::new(),
                defaults_subscription: RefCell::new(None),
            }),
        }
    }

    pub fn value(&self) -> V {
        self.inner.value.borrow().clone()
    }

    pub fn default_value(&self) -> &V {
        &self.inner.default
    }

    pub fn is_bound(&self) -> bool {
        self.inner.binding.borrow().is_some()
    }

    /// Persisted key. Panics when the cell is not bound to a store.
    pub fn key(&self) -> String {
        self.bound("read the key of").0
    }

    /// Persists `value`, then publishes it if it differs from the current one.
    ///
    /// A failed write is logged and the value is still updated in memory.
    pub fn set(&self, value: V) {
        if let Err(err) = self.try_set(value.clone()) {
            error!(key = %self.key(), error = %err, "failed to persist spice");
            self.update_backing(value);
        }
    }

    /// Like [`set`](Self::set) but leaves the value untouched when the write fails.
    pub fn try_set(&self, value: V) -> Result<(), SpicesError> {
        let (key, defaults) = self.bound("write");
        trace!(key = %key, "writing spice");
        defaults.set_value(&key, self.inner.codec.encode(&value))?;
        self.update_backing(value);
        Ok(())
    }

    pub fn subscribe(&self) -> ChangeStream<V> {
        self.inner.changes.subscribe()
    }

    pub fn observe(&self, callback: impl Fn(&V) + 'static) -> Subscription {
        self.inner.changes.observe(callback)
    }

    /// Whether the store holds something under the key that does not decode.
    pub fn has_undecodable_value(&self) -> bool {
        let binding = self.inner.binding.borrow();
        let Some(binding) = binding.as_ref() else {
            return false;
        };
        match binding.defaults.value(&binding.key) {
            Some(stored) => self.inner.codec.decode(&stored).is_none(),
            None => false,
        }
    }

    /// Re-reads the persisted value, falling back to the default.
    fn reload(&self) {
        let stored = {
            let binding = self.inner.binding.borrow();
            match binding.as_ref() {
                Some(binding) => self.inner.codec.read(binding.defaults.as_ref(), &binding.key),
                None => return,
            }
        };
        self.update_backing(stored.unwrap_or_else(|| self.inner.default.clone()));
    }

    fn update_backing(&self, value: V) {
        if *self.inner.value.borrow() == value {
            return;
        }
        let owner = self
            .inner
            .binding
            .borrow()
            .as_ref()
            .and_then(|binding| binding.store.upgrade());
        if let Some(store) = owner {
            store.publish_will_change();
        }
        self.inner.value.replace(value.clone());
        self.inner.changes.publish(&value);
    }

    fn bound(&self, action: &str) -> (String, Rc<dyn Defaults>) {
        match self.inner.binding.borrow().as_ref() {
            Some(binding) => (binding.key.clone(), binding.defaults.clone()),
            None => panic!("cannot {action} a spice that is not bound to a store"),
        }
    }
}

impl<V: Clone + PartialEq + 'static> Bindable for DurableCell<V> {
    fn bind(&self, identifier: &str, store: &Rc<StoreInner>) {
        let key = match &self.inner.explicit_key {
            Some(key) => key.clone(),
            None => store.key_for(identifier),
        };
        let defaults = store.defaults();
        tracing::debug!(key = %key, "binding spice");

        let cell = Rc::downgrade(&self.inner);
        let subscription = defaults.observe(Box::new(move || {
            if let Some(inner) = cell.upgrade() {
                DurableCell { inner }.reload();
            }
        }));

        *self.inner.binding.borrow_mut() = Some(Binding {
            key,
            defaults,
            store: Rc::downgrade(store),
        });
        *self.inner.defaults_subscription.borrow_mut() = Some(subscription);
        self.reload();
    }
}

/// Holds the handler of a button. There is no way to replace it.
pub struct ActionCell<H: ?Sized> {
    handler: Rc<H>,
}

impl<H: ?Sized> Clone for ActionCell<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<H: ?Sized> ActionCell<H> {
    pub fn new(handler: Rc<H>) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> Rc<H> {
        self.handler.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_cell_reports_default() {
        let cell = DurableCell::new(true, Codec::scalar(), None);
        assert!(!cell.is_bound());
        assert!(cell.value());
        assert!(!cell.has_undecodable_value());
    }

    #[test]
    #[should_panic(expected = "not bound")]
    fn writing_unbound_cell_panics() {
        let cell = DurableCell::new(false, Codec::scalar(), None);
        cell.set(true);
    }

    #[test]
    #[should_panic(expected = "not bound")]
    fn keying_unbound_cell_panics() {
        let cell = DurableCell::new(String::new(), Codec::scalar(), None);
        let _ = cell.key();
    }

    #[test]
    fn action_cell_exposes_handler() {
        let handler: Rc<ButtonHandler> = Rc::new(|| -> anyhow::Result<()> { Ok(()) });
        let cell = ActionCell::new(handler);
        assert!((*cell.handler())().is_ok());
    }
}
