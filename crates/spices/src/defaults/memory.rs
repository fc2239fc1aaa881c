use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::defaults::{Defaults, DefaultsValue};
use crate::errors::SpicesError;
use crate::observe::{Publisher, Subscription};

/// Volatile [`Defaults`] for tests and previews.
#[derive(Default)]
pub struct MemoryDefaults {
    values: RefCell<BTreeMap<String, DefaultsValue>>,
    changes: Publisher<()>,
}

impl MemoryDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<DefaultsValue>,
    {
        Self {
            values: RefCell::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            changes: Publisher::new(),
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, DefaultsValue> {
        self.values.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }
}

impl Defaults for MemoryDefaults {
    fn value(&self, key: &str) -> Option<DefaultsValue> {
        self.values.borrow().get(key).cloned()
    }

    fn set_value(&self, key: &str, value: DefaultsValue) -> Result<(), SpicesError> {
        let previous = self.values.borrow_mut().insert(key.to_owned(), value.clone());
        if previous.as_ref() != Some(&value) {
            self.changes.publish(&());
        }
        Ok(())
    }

    fn remove_value(&self, key: &str) -> Result<(), SpicesError> {
        let removed = self.values.borrow_mut().remove(key);
        if removed.is_some() {
            self.changes.publish(&());
        }
        Ok(())
    }

    fn observe(&self, callback: Box<dyn Fn()>) -> Subscription {
        self.changes.observe(move |_| callback())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn notifies_only_on_effective_mutation() {
        let defaults = MemoryDefaults::new();
        let calls = Rc::new(Cell::new(0));
        let sink = calls.clone();
        let _subscription = defaults.observe(Box::new(move || sink.set(sink.get() + 1)));

        defaults.set_value("a", true.into()).unwrap();
        defaults.set_value("a", true.into()).unwrap();
        defaults.remove_value("missing").unwrap();
        defaults.remove_value("a").unwrap();

        assert_eq!(calls.get(), 2);
        assert!(defaults.is_empty());
    }

    #[test]
    fn observers_can_read_during_notification() {
        let defaults = Rc::new(MemoryDefaults::new());
        let seen = Rc::new(RefCell::new(None));
        let reader = Rc::downgrade(&defaults);
        let sink = seen.clone();
        let _subscription = defaults.observe(Box::new(move || {
            if let Some(defaults) = reader.upgrade() {
                *sink.borrow_mut() = defaults.value("k");
            }
        }));

        defaults.set_value("k", "v".into()).unwrap();
        assert_eq!(*seen.borrow(), Some(DefaultsValue::String("v".into())));
    }
}
