//! The menu model handed to a presentation layer.
//!
//! [`SpiceStore::items`] and [`SpiceStore::sections`] turn the declarations of
//! a store into [`MenuItem`]s. Items are rebuilt on every call but keep the id
//! assigned at declaration.

use std::any::Any;
use std::rc::Rc;

use tracing::warn;
use uuid::Uuid;

use crate::cell::{ActionCell, AsyncButtonHandler, ButtonHandler};
use crate::errors::SpicesError;
use crate::name::Name;
use crate::observe::{ChangeStream, Subscription};
use crate::section::{ChildPresentation, SpiceSection, ViewPresentation};
use crate::spice::Spice;
use crate::store::{Declaration, Declared, SpiceStore};

macro_rules! item_accessors {
    () => {
        pub fn id(&self) -> uuid::Uuid {
            self.meta.id
        }

        pub fn name(&self) -> &str {
            self.meta.name.as_str()
        }

        pub fn requires_restart(&self) -> bool {
            self.meta.requires_restart
        }

        pub fn section(&self) -> &crate::section::SpiceSection {
            &self.meta.section
        }
    };
}

mod interaction;
pub(crate) mod picker;

pub use interaction::{GateGuard, InteractionGate};
pub(crate) use interaction::AsyncRunState;
pub use picker::{PickerItem, PickerOption, UNSUPPORTED_OPTION_ID, UNSUPPORTED_OPTION_TITLE};

#[derive(Clone)]
pub(crate) struct ItemMeta {
    id: Uuid,
    name: Rc<Name>,
    requires_restart: bool,
    section: SpiceSection,
}

impl ItemMeta {
    fn of(declaration: &Declaration) -> Self {
        Self {
            id: declaration.id,
            name: declaration.name.clone(),
            requires_restart: declaration.requires_restart,
            section: declaration.section.clone(),
        }
    }
}

/// One entry of a store's menu.
#[derive(Clone)]
pub enum MenuItem {
    Toggle(ToggleItem),
    Picker(PickerItem),
    TextField(TextFieldItem),
    Button(ButtonItem),
    AsyncButton(AsyncButtonItem),
    ChildStore(ChildStoreItem),
    View(ViewItem),
}

impl MenuItem {
    fn from_declaration(declaration: &Declaration) -> Self {
        let meta = ItemMeta::of(declaration);
        match &declaration.kind {
            Declared::Toggle(spice) => MenuItem::Toggle(ToggleItem {
                meta,
                spice: spice.clone(),
            }),
            Declared::TextField(spice) => MenuItem::TextField(TextFieldItem {
                meta,
                spice: spice.clone(),
            }),
            Declared::Picker(source) => MenuItem::Picker(PickerItem {
                meta,
                source: source.clone(),
            }),
            Declared::Button(cell) => MenuItem::Button(ButtonItem {
                meta,
                cell: cell.clone(),
            }),
            Declared::AsyncButton(cell, state) => MenuItem::AsyncButton(AsyncButtonItem {
                meta,
                cell: cell.clone(),
                state: state.clone(),
            }),
            Declared::Child(store, presentation) => MenuItem::ChildStore(ChildStoreItem {
                meta,
                store: store.clone(),
                presentation: presentation.clone(),
            }),
            Declared::View(payload, presentation) => MenuItem::View(ViewItem {
                meta,
                payload: payload.clone(),
                presentation: *presentation,
            }),
        }
    }

    fn meta(&self) -> &ItemMeta {
        match self {
            MenuItem::Toggle(item) => &item.meta,
            MenuItem::Picker(item) => &item.meta,
            MenuItem::TextField(item) => &item.meta,
            MenuItem::Button(item) => &item.meta,
            MenuItem::AsyncButton(item) => &item.meta,
            MenuItem::ChildStore(item) => &item.meta,
            MenuItem::View(item) => &item.meta,
        }
    }

    pub fn id(&self) -> Uuid {
        self.meta().id
    }

    pub fn name(&self) -> &str {
        self.meta().name.as_str()
    }

    pub fn requires_restart(&self) -> bool {
        self.meta().requires_restart
    }

    pub fn section(&self) -> &SpiceSection {
        &self.meta().section
    }
}

#[derive(Clone)]
pub struct ToggleItem {
    meta: ItemMeta,
    spice: Spice<bool>,
}

impl ToggleItem {
    item_accessors!();

    pub fn value(&self) -> bool {
        self.spice.get()
    }

    pub fn set(&self, value: bool) {
        self.spice.set(value);
    }

    pub fn try_set(&self, value: bool) -> Result<(), SpicesError> {
        self.spice.try_set(value)
    }

    pub fn subscribe(&self) -> ChangeStream<bool> {
        self.spice.subscribe()
    }

    pub fn observe(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.spice.observe(callback)
    }
}

#[derive(Clone)]
pub struct TextFieldItem {
    meta: ItemMeta,
    spice: Spice<String>,
}

impl TextFieldItem {
    item_accessors!();

    pub fn value(&self) -> String {
        self.spice.get()
    }

    pub fn set(&self, value: impl Into<String>) {
        self.spice.set(value.into());
    }

    pub fn try_set(&self, value: impl Into<String>) -> Result<(), SpicesError> {
        self.spice.try_set(value.into())
    }

    pub fn subscribe(&self) -> ChangeStream<String> {
        self.spice.subscribe()
    }

    pub fn observe(&self, callback: impl Fn(&String) + 'static) -> Subscription {
        self.spice.observe(callback)
    }
}

#[derive(Clone)]
pub struct ButtonItem {
    meta: ItemMeta,
    cell: ActionCell<ButtonHandler>,
}

impl ButtonItem {
    item_accessors!();

    /// Runs the handler. A failure is logged and handed back to the caller.
    pub fn invoke(&self) -> Result<(), SpicesError> {
        (*self.cell.handler())().map_err(|source| action_failed(self.name(), source))
    }
}

#[derive(Clone)]
pub struct AsyncButtonItem {
    meta: ItemMeta,
    cell: ActionCell<AsyncButtonHandler>,
    state: Rc<AsyncRunState>,
}

impl AsyncButtonItem {
    item_accessors!();

    /// Runs the handler with `gate` disabled until it finishes or the returned
    /// future is dropped.
    pub async fn invoke(&self, gate: &InteractionGate) -> Result<(), SpicesError> {
        let _gate = gate.acquire();
        let _running = self.state.start();
        self.state.set_last_error(None);

        let handler = self.cell.handler();
        match (*handler)().await {
            Ok(()) => Ok(()),
            Err(source) => {
                let err = action_failed(self.name(), source);
                self.state.set_last_error(Some(err.to_string()));
                Err(err)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Message of the failure of the most recent run, if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.state.last_error()
    }
}

fn action_failed(name: &str, source: anyhow::Error) -> SpicesError {
    warn!(action = name, error = %source, "spice action failed");
    SpicesError::Action {
        name: name.to_owned(),
        source,
    }
}

#[derive(Clone)]
pub struct ChildStoreItem {
    meta: ItemMeta,
    store: SpiceStore,
    presentation: ChildPresentation,
}

impl ChildStoreItem {
    item_accessors!();

    pub fn store(&self) -> &SpiceStore {
        &self.store
    }

    pub fn presentation(&self) -> &ChildPresentation {
        &self.presentation
    }

    pub fn items(&self) -> Vec<MenuItem> {
        self.store.items()
    }

    pub fn sections(&self) -> Vec<MenuItemSection> {
        self.store.sections()
    }
}

#[derive(Clone)]
pub struct ViewItem {
    meta: ItemMeta,
    payload: Rc<dyn Any>,
    presentation: ViewPresentation,
}

impl ViewItem {
    item_accessors!();

    pub fn presentation(&self) -> ViewPresentation {
        self.presentation
    }

    pub fn payload(&self) -> Rc<dyn Any> {
        self.payload.clone()
    }

    pub fn downcast<T: 'static>(&self) -> Option<Rc<T>> {
        self.payload.clone().downcast::<T>().ok()
    }
}

/// Items sharing a [`SpiceSection`].
#[derive(Clone)]
pub struct MenuItemSection {
    pub section: SpiceSection,
    pub items: Vec<MenuItem>,
}

impl MenuItemSection {
    pub fn id(&self) -> &str {
        &self.section.id
    }

    pub fn header(&self) -> Option<&str> {
        self.section.header.as_deref()
    }

    pub fn footer(&self) -> Option<&str> {
        self.section.footer.as_deref()
    }
}

impl SpiceStore {
    /// Menu items in declaration order. Prepares the store if needed.
    pub fn items(&self) -> Vec<MenuItem> {
        self.prepare_if_needed();
        let declarations = self.inner.declarations.borrow().clone();
        declarations
            .iter()
            .map(|declaration| MenuItem::from_declaration(declaration))
            .collect()
    }

    /// Items grouped by section, sections ordered by first appearance.
    ///
    /// Header and footer come from the first declaration of a section.
    pub fn sections(&self) -> Vec<MenuItemSection> {
        let mut sections: Vec<MenuItemSection> = Vec::new();
        for item in self.items() {
            match sections.iter_mut().find(|s| s.section.id == item.section().id) {
                Some(section) => section.items.push(item),
                None => sections.push(MenuItemSection {
                    section: item.section().clone(),
                    items: vec![item],
                }),
            }
        }
        sections
    }
}
