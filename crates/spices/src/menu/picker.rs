use std::rc::Rc;

use crate::cell::Bindable;
use crate::menu::ItemMeta;
use crate::observe::Subscription;
use crate::spice::{Spice, SpiceEnum};

/// Id of the option standing in for a stored value no case matches.
pub const UNSUPPORTED_OPTION_ID: &str = "__spices_unsupported";
pub const UNSUPPORTED_OPTION_TITLE: &str = "<unsupported>";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PickerOption {
    pub id: String,
    pub title: String,
}

impl PickerOption {
    pub fn unsupported() -> Self {
        Self {
            id: UNSUPPORTED_OPTION_ID.to_owned(),
            title: UNSUPPORTED_OPTION_TITLE.to_owned(),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        self.id == UNSUPPORTED_OPTION_ID
    }
}

/// Type-erased enum spice behind a [`PickerItem`].
pub(crate) trait PickerSource: Bindable {
    fn known_options(&self) -> Vec<PickerOption>;
    fn selected_id(&self) -> String;
    fn holds_unsupported_value(&self) -> bool;
    fn select_id(&self, id: &str) -> bool;
    fn observe_changes(&self, callback: Box<dyn Fn()>) -> Subscription;
}

impl<E: SpiceEnum> PickerSource for Spice<E> {
    fn known_options(&self) -> Vec<PickerOption> {
        E::iter()
            .map(|case| PickerOption {
                id: case.as_ref().to_owned(),
                title: case.spice_title(),
            })
            .collect()
    }

    fn selected_id(&self) -> String {
        self.get().as_ref().to_owned()
    }

    fn holds_unsupported_value(&self) -> bool {
        self.cell.has_undecodable_value()
    }

    fn select_id(&self, id: &str) -> bool {
        match E::iter().find(|case| case.as_ref() == id) {
            Some(case) => {
                self.set(case);
                true
            }
            None => false,
        }
    }

    fn observe_changes(&self, callback: Box<dyn Fn()>) -> Subscription {
        self.observe(move |_| callback())
    }
}

/// Menu entry choosing one case of an enum.
#[derive(Clone)]
pub struct PickerItem {
    pub(crate) meta: ItemMeta,
    pub(crate) source: Rc<dyn PickerSource>,
}

impl PickerItem {
    item_accessors!();

    /// All cases in declaration order, preceded by the unsupported option
    /// when the stored value matches none of them.
    pub fn options(&self) -> Vec<PickerOption> {
        let mut options = self.source.known_options();
        if self.source.holds_unsupported_value() {
            options.insert(0, PickerOption::unsupported());
        }
        options
    }

    pub fn selection(&self) -> PickerOption {
        if self.source.holds_unsupported_value() {
            return PickerOption::unsupported();
        }
        let id = self.source.selected_id();
        self.source
            .known_options()
            .into_iter()
            .find(|option| option.id == id)
            .unwrap_or_else(|| PickerOption {
                title: id.clone(),
                id,
            })
    }

    /// Returns false for the unsupported option or an unknown id.
    pub fn select(&self, option: &PickerOption) -> bool {
        self.select_id(&option.id)
    }

    pub fn select_id(&self, id: &str) -> bool {
        self.source.select_id(id)
    }

    pub fn observe(&self, callback: impl Fn() + 'static) -> Subscription {
        self.source.observe_changes(Box::new(callback))
    }
}
