//! Typed handles returned by declarations, and the builders producing them.

use std::any::Any;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::cell::{ActionCell, AsyncButtonHandler, Bindable, ButtonHandler, DurableCell};
use crate::defaults::Codec;
use crate::menu::AsyncRunState;
use crate::name::{camel_case_to_natural_text, strip_backing_prefix, Name};
use crate::observe::{ChangeStream, Subscription};
use crate::section::{ChildPresentation, SpiceSection, ViewPresentation};
use crate::store::{Declaration, Declared, SpiceStore, StoreInner};

/// An enum usable in a picker.
///
/// The raw text from `AsRef<str>` is what gets persisted and what `FromStr`
/// has to accept back.
///
/// ```
/// use strum::{AsRefStr, EnumIter, EnumString};
///
/// #[derive(Clone, PartialEq, EnumIter, AsRefStr, EnumString)]
/// #[strum(serialize_all = "lowercase")]
/// enum Environment {
///     Production,
///     Staging,
/// }
///
/// impl spices::SpiceEnum for Environment {}
/// ```
pub trait SpiceEnum: IntoEnumIterator + AsRef<str> + FromStr + Clone + PartialEq + 'static {
    /// Title shown for this case.
    fn spice_title(&self) -> String {
        camel_case_to_natural_text(self.as_ref())
    }
}

/// A persisted setting declared on a [`SpiceStore`].
///
/// Reading or writing prepares the owning store first.
pub struct Spice<V> {
    pub(crate) cell: DurableCell<V>,
    store: Weak<StoreInner>,
    name: Rc<Name>,
    requires_restart: bool,
}

impl<V> Clone for Spice<V> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            store: self.store.clone(),
            name: self.name.clone(),
            requires_restart: self.requires_restart,
        }
    }
}

impl<V: Clone + PartialEq + 'static> Spice<V> {
    pub fn get(&self) -> V {
        self.prepare_store();
        self.cell.value()
    }

    pub fn set(&self, value: V) {
        self.prepare_store();
        self.cell.set(value);
    }

    pub fn try_set(&self, value: V) -> Result<(), crate::SpicesError> {
        self.prepare_store();
        self.cell.try_set(value)
    }

    pub fn key(&self) -> String {
        self.prepare_store();
        self.cell.key()
    }

    pub fn default_value(&self) -> &V {
        self.cell.default_value()
    }

    /// Changes published from now on. Call [`SpiceStore::prepare_if_needed`]
    /// first if the loaded value must not show up as a change.
    pub fn subscribe(&self) -> ChangeStream<V> {
        self.cell.subscribe()
    }

    pub fn observe(&self, callback: impl Fn(&V) + 'static) -> Subscription {
        self.cell.observe(callback)
    }

    pub fn name(&self) -> String {
        self.prepare_store();
        self.name.as_str().to_owned()
    }

    pub fn requires_restart(&self) -> bool {
        self.requires_restart
    }

    pub fn cell(&self) -> &DurableCell<V> {
        &self.cell
    }

    fn prepare_store(&self) {
        if let Some(store) = self.store.upgrade() {
            store.prepare_if_needed();
        }
    }
}

impl<V: Clone + PartialEq + 'static> Bindable for Spice<V> {
    fn bind(&self, identifier: &str, store: &Rc<StoreInner>) {
        self.cell.bind(identifier, store);
    }
}

/// A button declared on a [`SpiceStore`].
pub struct Action<H: ?Sized> {
    cell: ActionCell<H>,
    store: Weak<StoreInner>,
    name: Rc<Name>,
}

impl<H: ?Sized> Clone for Action<H> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            store: self.store.clone(),
            name: self.name.clone(),
        }
    }
}

impl<H: ?Sized> Action<H> {
    pub fn name(&self) -> String {
        if let Some(store) = self.store.upgrade() {
            store.prepare_if_needed();
        }
        self.name.as_str().to_owned()
    }
}

impl Action<ButtonHandler> {
    pub fn call(&self) -> anyhow::Result<()> {
        (*self.cell.handler())()
    }
}

impl Action<AsyncButtonHandler> {
    pub fn call(&self) -> LocalBoxFuture<'static, anyhow::Result<()>> {
        (*self.cell.handler())()
    }
}

/// Declaration fields shared by every builder.
struct Common<'s> {
    store: &'s SpiceStore,
    identifier: String,
    name: Option<String>,
    requires_restart: bool,
    section: SpiceSection,
}

impl<'s> Common<'s> {
    fn new(store: &'s SpiceStore, identifier: &str) -> Self {
        Self {
            store,
            identifier: strip_backing_prefix(identifier).to_owned(),
            name: None,
            requires_restart: false,
            section: SpiceSection::default(),
        }
    }

    fn register(self, name: Rc<Name>, kind: Declared) {
        self.store.inner.register(Declaration {
            id: Uuid::new_v4(),
            identifier: self.identifier,
            name,
            requires_restart: self.requires_restart,
            section: self.section,
            kind,
        });
    }
}

macro_rules! common_setters {
    () => {
        /// Display name instead of the one derived from the identifier.
        pub fn with_name(mut self, name: impl Into<String>) -> Self {
            self.common.name = Some(name.into());
            self
        }

        pub fn with_requires_restart(mut self, requires_restart: bool) -> Self {
            self.common.requires_restart = requires_restart;
            self
        }

        pub fn with_section(mut self, section: SpiceSection) -> Self {
            self.common.section = section;
            self
        }
    };
}

/// Declares a persisted setting. Nothing is registered until [`build`](Self::build).
#[must_use = "a spice is only declared once `build()` is called"]
pub struct SpiceBuilder<'s, V> {
    common: Common<'s>,
    default: V,
    codec: Codec<V>,
    key: Option<String>,
    declare: fn(Spice<V>) -> Declared,
}

impl<'s, V: Clone + PartialEq + 'static> SpiceBuilder<'s, V> {
    pub(crate) fn new(
        store: &'s SpiceStore,
        identifier: &str,
        default: V,
        codec: Codec<V>,
        declare: fn(Spice<V>) -> Declared,
    ) -> Self {
        Self {
            common: Common::new(store, identifier),
            default,
            codec,
            key: None,
            declare,
        }
    }

    common_setters!();

    /// Persist under `key` verbatim instead of the hierarchical key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn build(self) -> Spice<V> {
        let name = Rc::new(Name::new(self.common.name.clone()));
        let spice = Spice {
            cell: DurableCell::new(self.default, self.codec, self.key),
            store: Rc::downgrade(&self.common.store.inner),
            name: name.clone(),
            requires_restart: self.common.requires_restart,
        };
        self.common.register(name, (self.declare)(spice.clone()));
        spice
    }
}

/// Declares a button or async button.
#[must_use = "an action is only declared once `build()` is called"]
pub struct ActionBuilder<'s, H: ?Sized> {
    common: Common<'s>,
    handler: Rc<H>,
    declare: fn(ActionCell<H>) -> Declared,
}

impl<'s, H: ?Sized> ActionBuilder<'s, H> {
    common_setters!();

    pub fn build(self) -> Action<H> {
        let name = Rc::new(Name::new(self.common.name.clone()));
        let cell = ActionCell::new(self.handler);
        let store = Rc::downgrade(&self.common.store.inner);
        self.common.register(name.clone(), (self.declare)(cell.clone()));
        Action { cell, store, name }
    }
}

impl<'s> ActionBuilder<'s, ButtonHandler> {
    pub(crate) fn button<F>(store: &'s SpiceStore, identifier: &str, handler: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + 'static,
    {
        Self {
            common: Common::new(store, identifier),
            handler: Rc::new(handler),
            declare: Declared::Button,
        }
    }
}

impl<'s> ActionBuilder<'s, AsyncButtonHandler> {
    pub(crate) fn async_button<F, Fut>(store: &'s SpiceStore, identifier: &str, handler: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let handler: Rc<AsyncButtonHandler> =
            Rc::new(move || -> LocalBoxFuture<'static, anyhow::Result<()>> { handler().boxed_local() });
        Self {
            common: Common::new(store, identifier),
            handler,
            declare: declare_async_button,
        }
    }
}

fn declare_async_button(cell: ActionCell<AsyncButtonHandler>) -> Declared {
    Declared::AsyncButton(cell, Rc::new(AsyncRunState::default()))
}

/// Declares a nested store.
#[must_use = "a child store is only adopted once `build()` is called"]
pub struct ChildBuilder<'s> {
    common: Common<'s>,
    child: SpiceStore,
    presentation: ChildPresentation,
}

impl<'s> ChildBuilder<'s> {
    pub(crate) fn new(store: &'s SpiceStore, identifier: &str, child: &SpiceStore) -> Self {
        Self {
            common: Common::new(store, identifier),
            child: child.clone(),
            presentation: ChildPresentation::default(),
        }
    }

    common_setters!();

    pub fn with_presentation(mut self, presentation: ChildPresentation) -> Self {
        self.presentation = presentation;
        self
    }

    pub fn build(self) -> SpiceStore {
        let name = Rc::new(Name::new(self.common.name.clone()));
        let child = self.child.clone();
        self.common
            .register(name, Declared::Child(self.child, self.presentation));
        child
    }
}

/// Declares an embedded view carrying an opaque payload.
#[must_use = "a view is only declared once `build()` is called"]
pub struct ViewBuilder<'s, T> {
    common: Common<'s>,
    payload: Rc<T>,
    presentation: ViewPresentation,
}

impl<'s, T: 'static> ViewBuilder<'s, T> {
    pub(crate) fn new(store: &'s SpiceStore, identifier: &str, payload: T) -> Self {
        Self {
            common: Common::new(store, identifier),
            payload: Rc::new(payload),
            presentation: ViewPresentation::default(),
        }
    }

    common_setters!();

    pub fn with_presentation(mut self, presentation: ViewPresentation) -> Self {
        self.presentation = presentation;
        self
    }

    pub fn build(self) -> Rc<T> {
        let name = Rc::new(Name::new(self.common.name.clone()));
        let payload: Rc<dyn Any> = self.payload.clone();
        self.common
            .register(name, Declared::View(payload, self.presentation));
        self.payload
    }
}
