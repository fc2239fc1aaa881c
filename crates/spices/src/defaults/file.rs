use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use fs2::FileExt;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use ron::ser::PrettyConfig;
use tracing::{debug, warn};

use crate::defaults::{Defaults, DefaultsValue};
use crate::errors::SpicesError;
use crate::observe::{Publisher, Subscription};

type Values = BTreeMap<String, DefaultsValue>;

/// Builder for [`FileDefaults`].
#[derive(Debug, Default)]
pub struct FileDefaultsBuilder {
    path: Option<PathBuf>,
}

impl FileDefaultsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Opens the file, creating its directory when missing.
    ///
    /// A missing, unreadable or malformed file starts out empty.
    pub fn build(self) -> Result<FileDefaults, SpicesError> {
        let path = match self.path {
            Some(path) => path,
            None => FileDefaults::default_path()
                .ok_or(SpicesError::Invalid("no configuration directory available"))?,
        };

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }

        let values = match read_values(&path) {
            Ok(values) => values,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable defaults file");
                Values::new()
            }
        };
        debug!(path = %path.display(), keys = values.len(), "opened defaults file");

        Ok(FileDefaults {
            path,
            values: RefCell::new(values),
            changes: Publisher::new(),
            watch: RefCell::new(None),
        })
    }
}

struct FileWatch {
    _watcher: RecommendedWatcher,
    events: mpsc::Receiver<notify::Result<notify::Event>>,
}

/// [`Defaults`] persisted as a RON map in a single file.
///
/// Every write is flushed immediately. Under an advisory lock the file is
/// re-read, the changed key is applied, and the result is written to a
/// temporary file which is renamed into place. Other edits are picked up by
/// [`reload`], by the next write, or by [`poll_external_changes`] once
/// [`watch`] is active.
///
/// [`reload`]: FileDefaults::reload
/// [`poll_external_changes`]: FileDefaults::poll_external_changes
/// [`watch`]: FileDefaults::watch
pub struct FileDefaults {
    path: PathBuf,
    values: RefCell<Values>,
    changes: Publisher<()>,
    watch: RefCell<Option<FileWatch>>,
}

impl FileDefaults {
    pub fn builder() -> FileDefaultsBuilder {
        FileDefaultsBuilder::new()
    }

    /// `<config dir>/spices/defaults.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("spices").join("defaults.ron"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> BTreeMap<String, DefaultsValue> {
        self.values.borrow().clone()
    }

    /// Re-reads the file. Observers are notified when the content changed.
    ///
    /// On a read or parse error the current values are kept.
    pub fn reload(&self) -> Result<bool, SpicesError> {
        let values = read_values(&self.path)?;
        if *self.values.borrow() == values {
            return Ok(false);
        }
        debug!(path = %self.path.display(), "defaults file changed on disk");
        *self.values.borrow_mut() = values;
        self.changes.publish(&());
        Ok(true)
    }

    /// Starts watching the file for edits by other parties.
    ///
    /// Events are only queued; call [`poll_external_changes`](Self::poll_external_changes)
    /// to apply them.
    pub fn watch(&self) -> Result<(), SpicesError> {
        if self.watch.borrow().is_some() {
            return Ok(());
        }
        let (sender, events) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(sender)?;
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        debug!(path = %self.path.display(), "watching defaults file");
        *self.watch.borrow_mut() = Some(FileWatch {
            _watcher: watcher,
            events,
        });
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.watch.borrow().is_some()
    }

    /// Applies queued file events. Returns whether the values changed.
    pub fn poll_external_changes(&self) -> Result<bool, SpicesError> {
        let touched = {
            let watch = self.watch.borrow();
            let Some(watch) = watch.as_ref() else {
                return Ok(false);
            };
            let mut touched = false;
            for event in watch.events.try_iter() {
                match event {
                    Ok(event) => touched |= event.paths.iter().any(|p| self.is_own_file(p)),
                    Err(err) => warn!(error = %err, "defaults file watcher error"),
                }
            }
            touched
        };
        if touched {
            self.reload()
        } else {
            Ok(false)
        }
    }

    fn is_own_file(&self, path: &Path) -> bool {
        path.file_name().is_some() && path.file_name() == self.path.file_name()
    }

    fn ensure_dir(&self) -> Result<(), SpicesError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }

    fn write_values(&self, values: &Values) -> Result<(), SpicesError> {
        let text = ron::ser::to_string_pretty(values, PrettyConfig::default())?;
        let tmp = self.path.with_extension("ron.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Runs `f` while holding an exclusive advisory lock.
    ///
    /// The lock lives on a sidecar file because the target is replaced by rename.
    fn with_lock<F, R>(&self, f: F) -> Result<R, SpicesError>
    where
        F: FnOnce() -> Result<R, SpicesError>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.path.with_extension("ron.lock"))?;
        file.lock_exclusive()?;
        let res = f();
        file.unlock()?;
        res
    }

    /// Applies a single-key change on top of what is on disk right now.
    ///
    /// Keys written by other processes since the last read survive, and show
    /// up in this instance's values afterwards.
    fn mutate(&self, apply: impl FnOnce(&mut Values) -> bool) -> Result<(), SpicesError> {
        self.ensure_dir()?;
        let merged = self.with_lock(|| {
            let mut values = match read_values(&self.path) {
                Ok(values) => values,
                Err(SpicesError::RonParse(err)) => {
                    warn!(path = %self.path.display(), error = %err, "overwriting malformed defaults file");
                    self.values.borrow().clone()
                }
                Err(err) => return Err(err),
            };
            if apply(&mut values) {
                self.write_values(&values)?;
            }
            Ok(values)
        })?;
        if *self.values.borrow() == merged {
            return Ok(());
        }
        *self.values.borrow_mut() = merged;
        self.changes.publish(&());
        Ok(())
    }
}

impl Defaults for FileDefaults {
    fn value(&self, key: &str) -> Option<DefaultsValue> {
        self.values.borrow().get(key).cloned()
    }

    fn set_value(&self, key: &str, value: DefaultsValue) -> Result<(), SpicesError> {
        self.mutate(|values| {
            if values.get(key) == Some(&value) {
                return false;
            }
            values.insert(key.to_owned(), value);
            true
        })
    }

    fn remove_value(&self, key: &str) -> Result<(), SpicesError> {
        self.mutate(|values| values.remove(key).is_some())
    }

    fn observe(&self, callback: Box<dyn Fn()>) -> Subscription {
        self.changes.observe(move |_| callback())
    }
}

fn read_values(path: &Path) -> Result<Values, SpicesError> {
    if !path.exists() {
        return Ok(Values::new());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Values::new());
    }
    Ok(ron::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_starts_empty_and_is_created_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("defaults.ron");
        let defaults = FileDefaults::builder().with_path(&path).build().unwrap();

        assert!(defaults.snapshot().is_empty());
        assert!(!path.exists());

        defaults.set_value("debug.enableLogging", true.into()).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("ron.tmp").exists());
    }

    #[test]
    fn identical_write_does_not_notify() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = FileDefaults::builder()
            .with_path(dir.path().join("defaults.ron"))
            .build()
            .unwrap();
        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let sink = calls.clone();
        let _subscription = defaults.observe(Box::new(move || sink.set(sink.get() + 1)));

        defaults.set_value("k", 1i64.into()).unwrap();
        defaults.set_value("k", 1i64.into()).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn reload_keeps_values_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defaults.ron");
        let defaults = FileDefaults::builder().with_path(&path).build().unwrap();
        defaults.set_value("k", "v".into()).unwrap();

        fs::write(&path, "{ not ron").unwrap();
        assert!(defaults.reload().is_err());
        assert_eq!(defaults.value("k"), Some(DefaultsValue::String("v".into())));
    }

    #[test]
    fn write_merges_keys_stored_by_another_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defaults.ron");
        let other = FileDefaults::builder().with_path(&path).build().unwrap();
        let mine = FileDefaults::builder().with_path(&path).build().unwrap();
        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let sink = calls.clone();
        let _subscription = mine.observe(Box::new(move || sink.set(sink.get() + 1)));

        other.set_value("otherKey", true.into()).unwrap();
        mine.set_value("myKey", true.into()).unwrap();

        assert_eq!(read_values(&path).unwrap().len(), 2);
        assert_eq!(mine.value("otherKey"), Some(DefaultsValue::Bool(true)));
        assert_eq!(calls.get(), 1);
        assert!(!path.with_extension("ron.tmp").exists());
    }

    #[test]
    fn removing_a_key_keeps_keys_stored_by_another_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defaults.ron");
        let mine = FileDefaults::builder().with_path(&path).build().unwrap();
        mine.set_value("myKey", 1i64.into()).unwrap();
        let other = FileDefaults::builder().with_path(&path).build().unwrap();
        other.set_value("otherKey", 2i64.into()).unwrap();

        mine.remove_value("myKey").unwrap();

        let stored = read_values(&path).unwrap();
        assert_eq!(stored.get("myKey"), None);
        assert_eq!(stored.get("otherKey"), Some(&DefaultsValue::Integer(2)));
    }

    #[test]
    fn polling_without_watch_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = FileDefaults::builder()
            .with_path(dir.path().join("defaults.ron"))
            .build()
            .unwrap();
        assert!(!defaults.is_watching());
        assert!(!defaults.poll_external_changes().unwrap());
    }
}
