//! Builds a two-level debug menu on file-backed defaults and prints it.
//!
//! `RUST_LOG=spices=debug cargo run -p spices --example debug_menu`

use std::rc::Rc;
use std::time::Duration;

use spices::{
    ChildPresentation, FileDefaults, InteractionGate, MenuItem, MenuItemSection, SpiceEnum,
    SpiceSection, SpiceStore,
};
use strum::{AsRefStr, EnumIter, EnumString};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Clone, Debug, PartialEq, EnumIter, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
enum ServiceEnvironment {
    Production,
    Staging,
    Development,
}

impl SpiceEnum for ServiceEnvironment {}

fn print_sections(sections: &[MenuItemSection], depth: usize) {
    let indent = "  ".repeat(depth);
    for section in sections {
        if let Some(header) = section.header() {
            println!("{indent}[{header}]");
        }
        for item in &section.items {
            let restart = if item.requires_restart() { " (restart)" } else { "" };
            match item {
                MenuItem::Toggle(toggle) => {
                    println!("{indent}- {}: {}{restart}", toggle.name(), toggle.value())
                }
                MenuItem::Picker(picker) => {
                    println!("{indent}- {}: {}{restart}", picker.name(), picker.selection().title)
                }
                MenuItem::TextField(text) => {
                    println!("{indent}- {}: {:?}{restart}", text.name(), text.value())
                }
                MenuItem::Button(button) => println!("{indent}- [{}]", button.name()),
                MenuItem::AsyncButton(button) => println!("{indent}- [{}...]", button.name()),
                MenuItem::ChildStore(child) => {
                    println!("{indent}> {}", child.name());
                    print_sections(&child.sections(), depth + 1);
                }
                MenuItem::View(view) => println!("{indent}- <{}>", view.name()),
            }
        }
        if let Some(footer) = section.footer() {
            println!("{indent}  {footer}");
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = std::env::temp_dir().join("spices-demo").join("defaults.ron");
    let defaults = Rc::new(FileDefaults::builder().with_path(&path).build()?);

    let root = SpiceStore::builder()
        .with_name("Debug Menu")
        .with_defaults(defaults.clone())
        .build();
    let environment = root
        .picker("environment", ServiceEnvironment::Production)
        .with_requires_restart(true)
        .build();
    let enable_logging = root.toggle("enableLogging", false).build();

    let network = SpiceStore::new();
    network.text("apiURL", "https://api.example.com").build();
    network.toggle("ignoreNextHTTPRequest", false).build();
    root.child("network", &network)
        .with_presentation(ChildPresentation::Inline {
            header: Some("Network".into()),
            footer: None,
        })
        .build();

    root.async_button("syncRemoteConfig", || async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    })
    .with_section(SpiceSection::new("actions").with_header("Actions"))
    .build();

    println!("defaults file: {}", path.display());
    print_sections(&root.sections(), 0);

    let _logging_changes = enable_logging.observe(|enabled| println!("logging enabled: {enabled}"));
    enable_logging.set(!enable_logging.get());
    println!("environment: {:?}", environment.get());

    let gate = InteractionGate::new();
    for item in root.items() {
        if let MenuItem::AsyncButton(button) = item {
            button.invoke(&gate).await?;
            println!("{} finished", button.name());
        }
    }

    Ok(())
}
