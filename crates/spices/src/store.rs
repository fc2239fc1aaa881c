//! Stores own declarations, nest into each other and bind their spices on
//! first use.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use tracing::debug;
use uuid::Uuid;

use crate::cell::{ActionCell, AsyncButtonHandler, Bindable, ButtonHandler};
use crate::defaults::{Codec, Defaults, MemoryDefaults};
use crate::key_path::KeyPath;
use crate::menu::picker::PickerSource;
use crate::menu::AsyncRunState;
use crate::name::Name;
use crate::observe::{ChangeStream, Publisher, Subscription};
use crate::section::{ChildPresentation, SpiceSection, ViewPresentation};
use crate::spice::{ActionBuilder, ChildBuilder, Spice, SpiceBuilder, SpiceEnum, ViewBuilder};

/// Preparation state of a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preparation {
    Unprepared,
    Preparing,
    Prepared,
}

pub(crate) enum Declared {
    Toggle(Spice<bool>),
    TextField(Spice<String>),
    Picker(Rc<dyn PickerSource>),
    Button(ActionCell<ButtonHandler>),
    AsyncButton(ActionCell<AsyncButtonHandler>, Rc<AsyncRunState>),
    Child(SpiceStore, ChildPresentation),
    View(Rc<dyn Any>, ViewPresentation),
}

pub(crate) struct Declaration {
    pub(crate) id: Uuid,
    pub(crate) identifier: String,
    pub(crate) name: Rc<Name>,
    pub(crate) requires_restart: bool,
    pub(crate) section: SpiceSection,
    pub(crate) kind: Declared,
}

pub(crate) struct StoreInner {
    id: Uuid,
    name: Name,
    property_name: RefCell<Option<String>>,
    defaults: RefCell<Option<Rc<dyn Defaults>>>,
    fallback_defaults: RefCell<Option<Rc<dyn Defaults>>>,
    state: Cell<Preparation>,
    parent: RefCell<Weak<StoreInner>>,
    declared_in: RefCell<Weak<StoreInner>>,
    pub(crate) declarations: RefCell<Vec<Rc<Declaration>>>,
    will_change: Publisher<()>,
}

impl StoreInner {
    pub(crate) fn parent(&self) -> Option<Rc<StoreInner>> {
        self.parent.borrow().upgrade()
    }

    /// Own defaults, else the parent's, else a private in-memory store.
    pub(crate) fn defaults(&self) -> Rc<dyn Defaults> {
        if let Some(defaults) = self.defaults.borrow().as_ref() {
            return defaults.clone();
        }
        if let Some(parent) = self.parent() {
            return parent.defaults();
        }
        if let Some(defaults) = self.fallback_defaults.borrow().as_ref() {
            return defaults.clone();
        }
        debug!(store = self.name.as_str(), "no defaults configured, using in-memory defaults");
        let defaults: Rc<dyn Defaults> = Rc::new(MemoryDefaults::new());
        *self.fallback_defaults.borrow_mut() = Some(defaults.clone());
        defaults
    }

    pub(crate) fn path(&self) -> KeyPath {
        match (self.parent(), self.property_name.borrow().as_ref()) {
            (Some(parent), Some(property)) => parent.path().child(property.clone()),
            _ => KeyPath::default(),
        }
    }

    pub(crate) fn key_for(&self, identifier: &str) -> String {
        self.path().child(identifier).to_string()
    }

    pub(crate) fn publish_will_change(&self) {
        self.will_change.publish(&());
        if let Some(parent) = self.parent() {
            parent.publish_will_change();
        }
    }

    pub(crate) fn prepare_if_needed(self: &Rc<Self>) {
        match self.state.get() {
            Preparation::Preparing => return,
            Preparation::Prepared => {
                self.prepare_owner();
                return;
            }
            Preparation::Unprepared => {}
        }
        self.state.set(Preparation::Preparing);
        self.prepare_owner();
        debug!(store = self.name.as_str(), path = %self.path(), "preparing spice store");

        let declarations: Vec<Rc<Declaration>> = self.declarations.borrow().clone();
        self.validate_children(&declarations);
        let mut index = 0;
        while let Some(declaration) = self.declaration_at(index) {
            if index >= declarations.len() {
                self.validate_children(std::slice::from_ref(&declaration));
            }
            self.bind_declaration(&declaration);
            index += 1;
        }

        self.state.set(Preparation::Prepared);
    }

    /// A store declared as a child is prepared through the store declaring
    /// it, so that it is adopted before its spices compute their keys.
    fn prepare_owner(self: &Rc<Self>) {
        if self.parent().is_some() {
            return;
        }
        let owner = self.declared_in.borrow().upgrade();
        if let Some(owner) = owner {
            if !Rc::ptr_eq(&owner, self) && owner.state.get() == Preparation::Unprepared {
                owner.prepare_if_needed();
            }
        }
    }

    fn declaration_at(&self, index: usize) -> Option<Rc<Declaration>> {
        self.declarations.borrow().get(index).cloned()
    }

    pub(crate) fn register(self: &Rc<Self>, declaration: Declaration) {
        if let Declared::Child(child, _) = &declaration.kind {
            let unclaimed = child.inner.declared_in.borrow().upgrade().is_none();
            if unclaimed {
                *child.inner.declared_in.borrow_mut() = Rc::downgrade(self);
            }
        }
        let declaration = Rc::new(declaration);
        self.declarations.borrow_mut().push(declaration.clone());
        if self.state.get() == Preparation::Prepared {
            self.validate_children(std::slice::from_ref(&declaration));
            self.bind_declaration(&declaration);
        }
    }

    /// Panics unless every child store can be adopted by `self`.
    fn validate_children(self: &Rc<Self>, declarations: &[Rc<Declaration>]) {
        let mut seen: Vec<&Rc<StoreInner>> = Vec::new();
        for declaration in declarations {
            let Declared::Child(child, _) = &declaration.kind else {
                continue;
            };
            let child = &child.inner;
            if Rc::ptr_eq(child, self) {
                panic!(
                    "spice store `{}` cannot adopt itself as `{}`",
                    self.name.as_str(),
                    declaration.identifier
                );
            }
            if self.has_ancestor(child) {
                panic!(
                    "spice store `{}` cannot adopt its own ancestor as `{}`",
                    self.name.as_str(),
                    declaration.identifier
                );
            }
            if let Some(parent) = child.parent() {
                panic!(
                    "spice store declared as `{}` already has a parent `{}`; a store can only have one parent",
                    declaration.identifier,
                    parent.name.as_str()
                );
            }
            if seen.iter().any(|other| Rc::ptr_eq(other, child)) {
                panic!(
                    "spice store declared as `{}` is declared twice in `{}`",
                    declaration.identifier,
                    self.name.as_str()
                );
            }
            seen.push(child);
        }
    }

    fn has_ancestor(&self, candidate: &Rc<StoreInner>) -> bool {
        let mut current = self.parent();
        while let Some(store) = current {
            if Rc::ptr_eq(&store, candidate) {
                return true;
            }
            current = store.parent();
        }
        false
    }

    fn bind_declaration(self: &Rc<Self>, declaration: &Declaration) {
        declaration.name.resolve(&declaration.identifier);
        match &declaration.kind {
            Declared::Toggle(spice) => spice.bind(&declaration.identifier, self),
            Declared::TextField(spice) => spice.bind(&declaration.identifier, self),
            Declared::Picker(source) => source.bind(&declaration.identifier, self),
            Declared::Child(child, _) => self.adopt(&child.inner, declaration),
            Declared::Button(_) | Declared::AsyncButton(..) | Declared::View(..) => {}
        }
    }

    fn adopt(self: &Rc<Self>, child: &Rc<StoreInner>, declaration: &Declaration) {
        *child.parent.borrow_mut() = Rc::downgrade(self);
        *child.property_name.borrow_mut() = Some(declaration.identifier.clone());
        child.name.resolve_verbatim(declaration.name.as_str());
        if child.state.get() == Preparation::Prepared {
            debug!(child = %declaration.identifier, "adopting a prepared spice store, rebinding its spices");
            child.rebind();
        } else {
            child.prepare_if_needed();
        }
    }

    /// Binds the spices of this store and its prepared children again, under
    /// the current key path and defaults.
    fn rebind(self: &Rc<Self>) {
        if self.parent().is_some() {
            self.fallback_defaults.borrow_mut().take();
        }
        let declarations: Vec<Rc<Declaration>> = self.declarations.borrow().clone();
        for declaration in &declarations {
            match &declaration.kind {
                Declared::Toggle(spice) => spice.bind(&declaration.identifier, self),
                Declared::TextField(spice) => spice.bind(&declaration.identifier, self),
                Declared::Picker(source) => source.bind(&declaration.identifier, self),
                Declared::Child(child, _) if child.inner.state.get() == Preparation::Prepared => {
                    child.inner.rebind()
                }
                Declared::Child(..)
                | Declared::Button(_)
                | Declared::AsyncButton(..)
                | Declared::View(..) => {}
            }
        }
    }
}

/// Builder for [`SpiceStore`].
#[derive(Default)]
pub struct SpiceStoreBuilder {
    name: Option<String>,
    defaults: Option<Rc<dyn Defaults>>,
}

impl SpiceStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Title of a top-level store. Nested stores take the name of their declaration.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Where spices of this store and its children persist.
    pub fn with_defaults(mut self, defaults: Rc<dyn Defaults>) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn build(self) -> SpiceStore {
        SpiceStore {
            inner: Rc::new(StoreInner {
                id: Uuid::new_v4(),
                name: Name::new(self.name),
                property_name: RefCell::new(None),
                defaults: RefCell::new(self.defaults),
                fallback_defaults: RefCell::new(None),
                state: Cell::new(Preparation::Unprepared),
                parent: RefCell::new(Weak::new()),
                declared_in: RefCell::new(Weak::new()),
                declarations: RefCell::new(Vec::new()),
                will_change: Publisher::new(),
            }),
        }
    }
}

/// A container of declared spices and nested stores.
///
/// Cloning yields another handle to the same store.
///
/// ```
/// use std::rc::Rc;
/// use spices::{MemoryDefaults, SpiceStore};
///
/// let store = SpiceStore::with_defaults(Rc::new(MemoryDefaults::new()));
/// let logging = store.toggle("enableLogging", false).build();
/// logging.set(true);
/// assert!(logging.get());
/// assert_eq!(logging.key(), "enableLogging");
/// ```
#[derive(Clone)]
pub struct SpiceStore {
    pub(crate) inner: Rc<StoreInner>,
}

impl SpiceStore {
    pub fn builder() -> SpiceStoreBuilder {
        SpiceStoreBuilder::new()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_defaults(defaults: Rc<dyn Defaults>) -> Self {
        Self::builder().with_defaults(defaults).build()
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> String {
        self.inner.name.as_str().to_owned()
    }

    pub fn parent(&self) -> Option<SpiceStore> {
        self.inner.parent().map(|inner| SpiceStore { inner })
    }

    pub fn preparation(&self) -> Preparation {
        self.inner.state.get()
    }

    pub fn defaults(&self) -> Rc<dyn Defaults> {
        self.inner.defaults()
    }

    /// Identifiers from the root store down to this store.
    pub fn path(&self) -> KeyPath {
        self.inner.path()
    }

    pub fn key_for(&self, identifier: &str) -> String {
        self.inner.key_for(identifier)
    }

    /// Binds every declared spice and adopts every child store, once.
    ///
    /// Panics if a child store already has a parent or is this store itself.
    pub fn prepare_if_needed(&self) {
        self.inner.prepare_if_needed();
    }

    /// Notifies observers of this store and of all its ancestors.
    pub fn publish_will_change(&self) {
        self.inner.publish_will_change();
    }

    /// `callback` runs before any spice in this store or below it changes.
    pub fn observe_will_change(&self, callback: impl Fn() + 'static) -> Subscription {
        self.inner.will_change.observe(move |_| callback())
    }

    pub fn will_change_stream(&self) -> ChangeStream<()> {
        self.inner.will_change.subscribe()
    }

    pub fn toggle(&self, identifier: &str, default: bool) -> SpiceBuilder<'_, bool> {
        SpiceBuilder::new(self, identifier, default, Codec::scalar(), Declared::Toggle)
    }

    pub fn text(&self, identifier: &str, default: impl Into<String>) -> SpiceBuilder<'_, String> {
        SpiceBuilder::new(
            self,
            identifier,
            default.into(),
            Codec::scalar(),
            Declared::TextField,
        )
    }

    pub fn picker<E: SpiceEnum>(&self, identifier: &str, default: E) -> SpiceBuilder<'_, E> {
        SpiceBuilder::new(
            self,
            identifier,
            default,
            Codec::raw_enum(),
            declare_picker::<E>,
        )
    }

    pub fn button<F>(&self, identifier: &str, handler: F) -> ActionBuilder<'_, ButtonHandler>
    where
        F: Fn() -> anyhow::Result<()> + 'static,
    {
        ActionBuilder::button(self, identifier, handler)
    }

    pub fn async_button<F, Fut>(
        &self,
        identifier: &str,
        handler: F,
    ) -> ActionBuilder<'_, AsyncButtonHandler>
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        ActionBuilder::async_button(self, identifier, handler)
    }

    /// Nests `child` under this store. It is adopted when this store is prepared.
    pub fn child(&self, identifier: &str, child: &SpiceStore) -> ChildBuilder<'_> {
        ChildBuilder::new(self, identifier, child)
    }

    pub fn view<T: 'static>(&self, identifier: &str, payload: T) -> ViewBuilder<'_, T> {
        ViewBuilder::new(self, identifier, payload)
    }
}

fn declare_picker<E: SpiceEnum>(spice: Spice<E>) -> Declared {
    Declared::Picker(Rc::new(spice))
}

impl Default for SpiceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for SpiceStore {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for SpiceStore {}

impl fmt::Debug for SpiceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpiceStore")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name.as_str())
            .field("preparation", &self.inner.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::DefaultsValue;
    use crate::errors::SpicesError;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    /// Counts how often spices attach to it.
    #[derive(Default)]
    struct CountingDefaults {
        inner: MemoryDefaults,
        observers: Cell<usize>,
    }

    impl Defaults for CountingDefaults {
        fn value(&self, key: &str) -> Option<DefaultsValue> {
            self.inner.value(key)
        }

        fn set_value(&self, key: &str, value: DefaultsValue) -> Result<(), SpicesError> {
            self.inner.set_value(key, value)
        }

        fn remove_value(&self, key: &str) -> Result<(), SpicesError> {
            self.inner.remove_value(key)
        }

        fn observe(&self, callback: Box<dyn Fn()>) -> Subscription {
            self.observers.set(self.observers.get() + 1);
            self.inner.observe(callback)
        }
    }

    fn memory() -> Rc<MemoryDefaults> {
        Rc::new(MemoryDefaults::new())
    }

    #[test]
    fn nested_keys_follow_declaration_identifiers() {
        let root = SpiceStore::with_defaults(memory());
        let a = SpiceStore::new();
        let b = SpiceStore::new();
        let p = b.toggle("p", false).build();
        root.child("a", &a).build();
        a.child("b", &b).build();

        assert_eq!(p.key(), "a.b.p");
        assert_eq!(b.path().to_string(), "a.b");
        assert_eq!(b.name(), "B");
        assert_eq!(b.parent(), Some(a.clone()));
    }

    #[test]
    fn children_use_the_parent_defaults() {
        let defaults = memory();
        let root = SpiceStore::with_defaults(defaults.clone());
        let network = SpiceStore::new();
        let staging = network.toggle("useStaging", false).build();
        root.child("network", &network).build();

        staging.set(true);
        assert_eq!(
            defaults.value("network.useStaging"),
            Some(DefaultsValue::Bool(true))
        );
    }

    #[test]
    fn empty_defaults_yield_declared_defaults() {
        let store = SpiceStore::with_defaults(memory());
        let logging = store.toggle("enableLogging", true).build();
        let host = store.text("host", "localhost").build();
        assert!(logging.get());
        assert_eq!(host.get(), "localhost");
    }

    #[test]
    fn written_values_are_visible_to_a_fresh_store() {
        let defaults = memory();
        let first = SpiceStore::with_defaults(defaults.clone());
        first.text("host", "localhost").build().set("example.com".into());

        let second = SpiceStore::with_defaults(defaults);
        let host = second.text("host", "localhost").build();
        assert_eq!(host.get(), "example.com");
    }

    #[test]
    fn identical_write_is_not_published_twice() {
        let store = SpiceStore::with_defaults(memory());
        let logging = store.toggle("enableLogging", false).build();
        store.prepare_if_needed();
        let mut changes = logging.subscribe();

        logging.set(true);
        logging.set(true);

        assert_eq!(changes.drain(), vec![true]);
    }

    #[test]
    fn fresh_subscriber_gets_no_initial_event() {
        let store = SpiceStore::with_defaults(memory());
        let logging = store.toggle("enableLogging", false).build();
        logging.set(true);
        let mut changes = logging.subscribe();
        assert_eq!(changes.try_next_change(), None);
    }

    #[test]
    fn external_mutation_is_republished_once() {
        let defaults = memory();
        let store = SpiceStore::with_defaults(defaults.clone());
        let logging = store.toggle("enableLogging", false).build();
        store.prepare_if_needed();
        let mut changes = logging.subscribe();

        defaults.set_value("enableLogging", true.into()).unwrap();
        defaults.set_value("unrelated", 1i64.into()).unwrap();

        assert_eq!(changes.drain(), vec![true]);
        assert!(logging.get());

        defaults.remove_value("enableLogging").unwrap();
        assert!(!logging.get());
    }

    #[test]
    fn preparation_binds_exactly_once() {
        let defaults = Rc::new(CountingDefaults::default());
        let store = SpiceStore::with_defaults(defaults.clone());
        let logging = store.toggle("enableLogging", false).build();
        let host = store.text("host", "").build();

        assert_eq!(store.preparation(), Preparation::Unprepared);
        let _ = logging.get();
        let _ = host.get();
        store.prepare_if_needed();
        let _ = store.items();

        assert_eq!(store.preparation(), Preparation::Prepared);
        assert_eq!(defaults.observers.get(), 2);
    }

    #[test]
    fn declarations_after_preparation_bind_immediately() {
        let defaults = memory();
        defaults.set_value("late", true.into()).unwrap();
        let store = SpiceStore::with_defaults(defaults);
        store.prepare_if_needed();

        let late = store.toggle("late", false).build();
        assert!(late.cell().is_bound());
        assert!(late.get());
    }

    #[test]
    fn second_parent_is_rejected() {
        let first = SpiceStore::builder().with_name("First").build();
        let second = SpiceStore::builder().with_name("Second").build();
        let child = SpiceStore::new();
        first.child("child", &child).build();
        second.child("child", &child).build();
        first.prepare_if_needed();

        let result = catch_unwind(AssertUnwindSafe(|| second.prepare_if_needed()));

        assert!(result.is_err());
        assert_eq!(child.parent(), Some(first));
    }

    #[test]
    fn using_a_nested_spice_first_prepares_from_the_root() {
        let defaults = memory();
        defaults.set_value("network.useStaging", true.into()).unwrap();
        let root = SpiceStore::with_defaults(defaults);
        let network = SpiceStore::new();
        let staging = network.toggle("useStaging", false).build();
        root.child("network", &network).build();

        assert!(staging.get());
        assert_eq!(root.preparation(), Preparation::Prepared);
        assert_eq!(network.parent(), Some(root));
    }

    #[test]
    #[should_panic(expected = "own ancestor")]
    fn stores_cannot_adopt_each_other() {
        let a = SpiceStore::new();
        let b = SpiceStore::new();
        a.child("b", &b).build();
        b.child("a", &a).build();
        a.prepare_if_needed();
    }

    #[test]
    #[should_panic(expected = "cannot adopt itself")]
    fn store_cannot_adopt_itself() {
        let store = SpiceStore::new();
        store.child("me", &store).build();
        store.prepare_if_needed();
    }

    #[test]
    #[should_panic(expected = "declared twice")]
    fn child_cannot_be_declared_twice() {
        let store = SpiceStore::new();
        let child = SpiceStore::new();
        store.child("one", &child).build();
        store.child("two", &child).build();
        store.prepare_if_needed();
    }

    #[test]
    fn will_change_reaches_the_root_from_three_levels_down() {
        let root = SpiceStore::with_defaults(memory());
        let middle = SpiceStore::new();
        let leaf = SpiceStore::new();
        let flag = leaf.toggle("flag", false).build();
        root.child("middle", &middle).build();
        middle.child("leaf", &leaf).build();
        root.prepare_if_needed();

        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let _subscription = root.observe_will_change(move || counter.set(counter.get() + 1));
        let mut middle_changes = middle.will_change_stream();

        flag.set(true);
        flag.set(true);

        assert_eq!(calls.get(), 1);
        assert_eq!(middle_changes.drain().len(), 1);
        assert_eq!(flag.key(), "middle.leaf.flag");
    }

    #[test]
    fn will_change_fires_before_the_value_is_replaced() {
        let store = SpiceStore::with_defaults(memory());
        let flag = store.toggle("flag", false).build();
        store.prepare_if_needed();

        let seen = Rc::new(Cell::new(None));
        let sink = seen.clone();
        let reader = flag.clone();
        let _subscription = store.observe_will_change(move || sink.set(Some(reader.get())));

        flag.set(true);
        assert_eq!(seen.get(), Some(false));
    }

    #[test]
    fn stores_without_defaults_fall_back_to_memory() {
        let store = SpiceStore::new();
        let flag = store.toggle("flag", false).build();
        flag.set(true);
        assert!(flag.get());
        assert_eq!(store.defaults().value("flag"), Some(DefaultsValue::Bool(true)));
    }

    #[test]
    fn adopting_a_prepared_store_rebinds_its_spices() {
        let defaults = memory();
        let root = SpiceStore::with_defaults(defaults.clone());
        let root_flag = root.toggle("flag", false).build();
        let network = SpiceStore::new();
        let net_flag = network.toggle("flag", false).build();
        let _ = network.items();
        assert_eq!(net_flag.key(), "flag");

        root.child("network", &network).build();
        net_flag.set(true);

        assert_eq!(net_flag.key(), "network.flag");
        assert_eq!(root_flag.key(), "flag");
        assert!(!root_flag.get());
        assert_eq!(defaults.value("network.flag"), Some(DefaultsValue::Bool(true)));
        assert_eq!(defaults.value("flag"), None);
        assert_eq!(network.parent(), Some(root));
    }

    #[test]
    fn prepared_root_rebinds_a_prepared_subtree_declared_late() {
        let defaults = memory();
        defaults.set_value("debug.network.useStaging", true.into()).unwrap();
        let root = SpiceStore::with_defaults(defaults.clone());
        root.prepare_if_needed();
        let debug = SpiceStore::new();
        let network = SpiceStore::new();
        let staging = network.toggle("useStaging", false).build();
        debug.child("network", &network).build();
        debug.prepare_if_needed();
        assert!(!staging.get());

        let mut changes = staging.subscribe();
        root.child("debug", &debug).build();

        assert_eq!(staging.key(), "debug.network.useStaging");
        assert!(staging.get());
        assert_eq!(changes.drain(), vec![true]);
        staging.set(false);
        assert_eq!(
            defaults.value("debug.network.useStaging"),
            Some(DefaultsValue::Bool(false))
        );
    }
}
