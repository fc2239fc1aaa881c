//! Declarative debug settings.
//!
//! A [`SpiceStore`] holds declared spices (toggles, pickers, text fields,
//! buttons, nested stores and embedded views). The first time any of them is
//! used the store is prepared: every spice gets a key derived from its place in
//! the store hierarchy and loads its value from the store's [`Defaults`].
//! Writes persist immediately and are published to observers of the spice and
//! of every store above it. [`SpiceStore::items`] describes the resulting menu.

pub mod cell;
pub mod defaults;
pub mod errors;
pub mod key_path;
pub mod menu;
pub mod name;
pub mod observe;
pub mod section;
pub mod spice;
pub mod store;

pub use cell::{ActionCell, AsyncButtonHandler, ButtonHandler, DurableCell};
pub use defaults::{
    Codec, Defaults, DefaultsScalar, DefaultsValue, FileDefaults, FileDefaultsBuilder,
    MemoryDefaults,
};
pub use errors::SpicesError;
pub use key_path::KeyPath;
pub use menu::{
    AsyncButtonItem, ButtonItem, ChildStoreItem, GateGuard, InteractionGate, MenuItem,
    MenuItemSection, PickerItem, PickerOption, TextFieldItem, ToggleItem, ViewItem,
};
pub use name::Name;
pub use observe::{ChangeStream, Publisher, Subscription};
pub use section::{ChildPresentation, SpiceSection, ViewPresentation};
pub use spice::{Action, ActionBuilder, ChildBuilder, Spice, SpiceBuilder, SpiceEnum, ViewBuilder};
pub use store::{Preparation, SpiceStore, SpiceStoreBuilder};
