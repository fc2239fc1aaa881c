//! End-to-end behaviour of a debug menu declared on nested stores:
//! - keys follow the store hierarchy
//! - pre-seeded values win over declared defaults
//! - menu items write through and surface action failures

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use spices::{
    ChildPresentation, Defaults, DefaultsValue, InteractionGate, MemoryDefaults, MenuItem, Spice,
    SpiceEnum, SpiceSection, SpiceStore,
};
use strum::{AsRefStr, EnumIter, EnumString};

#[derive(Clone, Debug, PartialEq, EnumIter, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
enum ServiceEnvironment {
    Production,
    Staging,
}

impl SpiceEnum for ServiceEnvironment {}

struct FeatureFlags {
    store: SpiceStore,
    new_onboarding: Spice<bool>,
}

impl FeatureFlags {
    fn new() -> Self {
        let store = SpiceStore::new();
        let new_onboarding = store.toggle("newOnboarding", false).build();
        Self {
            store,
            new_onboarding,
        }
    }
}

struct AppSpices {
    store: SpiceStore,
    environment: Spice<ServiceEnvironment>,
    enable_logging: Spice<bool>,
    feature_flags: FeatureFlags,
    cache_cleared: Rc<Cell<usize>>,
}

impl AppSpices {
    fn new(defaults: Rc<dyn Defaults>) -> Self {
        let store = SpiceStore::builder()
            .with_name("Debug Menu")
            .with_defaults(defaults)
            .build();
        let environment = store
            .picker("environment", ServiceEnvironment::Production)
            .with_requires_restart(true)
            .build();
        let enable_logging = store.toggle("enableLogging", false).build();

        let cache_cleared = Rc::new(Cell::new(0));
        let counter = cache_cleared.clone();
        store
            .button("clearCache", move || {
                counter.set(counter.get() + 1);
                Ok(())
            })
            .with_section(SpiceSection::new("maintenance").with_header("Maintenance"))
            .build();

        let feature_flags = FeatureFlags::new();
        store.child("featureFlags", &feature_flags.store).build();

        Self {
            store,
            environment,
            enable_logging,
            feature_flags,
            cache_cleared,
        }
    }
}

#[test]
fn toggle_persists_under_its_identifier() {
    let defaults = Rc::new(MemoryDefaults::new());
    let spices = AppSpices::new(defaults.clone());

    assert!(!spices.enable_logging.get());
    let mut changes = spices.enable_logging.subscribe();
    spices.enable_logging.set(true);

    assert_eq!(defaults.value("enableLogging"), Some(DefaultsValue::Bool(true)));
    assert_eq!(changes.drain(), vec![true]);
    assert_eq!(spices.enable_logging.name(), "Enable Logging");
}

#[test]
fn pre_seeded_enum_value_wins_over_default() {
    let defaults = Rc::new(MemoryDefaults::with_values([("environment", "staging")]));
    let spices = AppSpices::new(defaults);

    assert_eq!(spices.environment.get(), ServiceEnvironment::Staging);
    assert!(spices.environment.requires_restart());
}

#[test]
fn nested_store_keys_include_the_child_identifier() {
    let defaults = Rc::new(MemoryDefaults::new());
    let spices = AppSpices::new(defaults.clone());

    spices.feature_flags.new_onboarding.set(true);

    assert_eq!(
        spices.feature_flags.new_onboarding.key(),
        "featureFlags.newOnboarding"
    );
    assert_eq!(
        defaults.value("featureFlags.newOnboarding"),
        Some(DefaultsValue::Bool(true))
    );
    assert_eq!(spices.feature_flags.store.name(), "Feature Flags");
}

#[test]
fn root_observers_see_nested_changes() {
    let spices = AppSpices::new(Rc::new(MemoryDefaults::new()));
    spices.store.prepare_if_needed();
    let mut root_changes = spices.store.will_change_stream();

    spices.feature_flags.new_onboarding.set(true);
    spices.enable_logging.set(true);
    spices.enable_logging.set(true);

    assert_eq!(root_changes.drain().len(), 2);
}

#[test]
fn sectioned_menu_reflects_the_declarations() {
    let spices = AppSpices::new(Rc::new(MemoryDefaults::new()));

    let sections = spices.store.sections();
    let layout: Vec<(String, Option<String>, Vec<String>)> = sections
        .iter()
        .map(|section| {
            (
                section.id().to_owned(),
                section.header().map(str::to_owned),
                section.items.iter().map(|item| item.name().to_owned()).collect(),
            )
        })
        .collect();

    assert_eq!(
        layout,
        vec![
            (
                "default".to_owned(),
                None,
                vec![
                    "Environment".to_owned(),
                    "Enable Logging".to_owned(),
                    "Feature Flags".to_owned()
                ]
            ),
            (
                "maintenance".to_owned(),
                Some("Maintenance".to_owned()),
                vec!["Clear Cache".to_owned()]
            ),
        ]
    );
}

#[test]
fn menu_items_drive_the_spices() {
    let spices = AppSpices::new(Rc::new(MemoryDefaults::new()));

    for item in spices.store.items() {
        match item {
            MenuItem::Picker(picker) => assert!(picker.select_id("staging")),
            MenuItem::Toggle(toggle) => toggle.set(true),
            MenuItem::Button(button) => button.invoke().unwrap(),
            MenuItem::ChildStore(child) => {
                assert_eq!(child.presentation(), &ChildPresentation::Push);
                for nested in child.items() {
                    if let MenuItem::Toggle(toggle) = nested {
                        toggle.set(true);
                    }
                }
            }
            _ => {}
        }
    }

    assert_eq!(spices.environment.get(), ServiceEnvironment::Staging);
    assert!(spices.enable_logging.get());
    assert!(spices.feature_flags.new_onboarding.get());
    assert_eq!(spices.cache_cleared.get(), 1);
}

#[tokio::test]
async fn delayed_async_failure_is_reported_and_persists_nothing() {
    let defaults = Rc::new(MemoryDefaults::new());
    let store = SpiceStore::with_defaults(defaults.clone());
    store
        .async_button("syncRemoteConfig", || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            anyhow::bail!("server unreachable")
        })
        .build();
    let MenuItem::AsyncButton(item) = store.items().remove(0) else {
        panic!("expected an async button");
    };
    let gate = InteractionGate::new();

    let run = item.invoke(&gate);
    futures::pin_mut!(run);
    assert!(futures::poll!(&mut run).is_pending());
    assert!(!gate.is_enabled());
    assert!(item.is_running());

    let err = run.await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "action `Sync Remote Config` failed: server unreachable"
    );
    assert_eq!(item.last_error(), Some(err.to_string()));
    assert!(gate.is_enabled());
    assert!(!item.is_running());
    assert!(defaults.snapshot().is_empty());
}
