//! Settings file I/O
//!
//! Root and queue settings live in `ddmq.yaml`. A missing file is an empty
//! layer. Rewrites go through a temp file and a rename, and keep every key
//! this crate does not know about.

use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::queue::config::Settings;
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::store::DirectoryStore;

/// Load the settings layer stored at `path`
pub fn load(store: &DirectoryStore, path: &Path) -> QueueResult<Settings> {
    match read_text(store, path)? {
        Some(text) => Settings::from_yaml_str(&text).map_err(|e| match e {
            QueueError::Config { message } => {
                QueueError::config(format!("{}: {}", path.display(), message))
            }
            other => other,
        }),
        None => Ok(Settings::default()),
    }
}

/// Merge the keys set in `update` into the file at `path`, creating it if needed
pub fn merge_into(store: &DirectoryStore, path: &Path, update: &Settings) -> QueueResult<()> {
    update.validate()?;
    let mut document = load_mapping(store, path)?;

    if update.default_priority.is_some() {
        // keep a single priority key in the file
        document.remove(crate::queue::config::KEY_PRIORITY_ALIAS);
    }
    for (key, value) in update.to_mapping() {
        document.insert(key, value);
    }
    write_mapping(store, path, &document)
}

/// A single key of the file at `path`, typed or not
pub fn read_value(store: &DirectoryStore, path: &Path, key: &str) -> QueueResult<Option<Value>> {
    Ok(load_mapping(store, path)?.remove(key))
}

/// Create a settings file holding `initial` if none exists
pub fn create_if_missing(store: &DirectoryStore, path: &Path, initial: &Mapping) -> QueueResult<()> {
    if store.exists(path) {
        return Ok(());
    }
    let text = render_mapping(initial)?;
    match store.create_exclusive(path, text.as_bytes()) {
        Ok(()) => Ok(()),
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Create an empty settings file if none exists
pub fn ensure_exists(store: &DirectoryStore, path: &Path) -> QueueResult<()> {
    create_if_missing(store, path, &Mapping::new())
}

fn read_text(store: &DirectoryStore, path: &Path) -> QueueResult<Option<String>> {
    match store.read(path) {
        Ok(bytes) => String::from_utf8(bytes).map(Some).map_err(|_| {
            QueueError::config(format!("{} is not valid UTF-8", path.display()))
        }),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn load_mapping(store: &DirectoryStore, path: &Path) -> QueueResult<Mapping> {
    let Some(text) = read_text(store, path)? else {
        return Ok(Mapping::new());
    };
    if text.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(&text) {
        Ok(Value::Mapping(map)) => Ok(map),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err(QueueError::config(format!(
            "{}: settings must be a key/value mapping",
            path.display()
        ))),
        Err(e) => Err(QueueError::config(format!("{}: {}", path.display(), e))),
    }
}

fn write_mapping(store: &DirectoryStore, path: &Path, document: &Mapping) -> QueueResult<()> {
    store.replace(path, render_mapping(document)?.as_bytes())?;
    Ok(())
}

fn render_mapping(document: &Mapping) -> QueueResult<String> {
    if document.is_empty() {
        return Ok(String::new());
    }
    serde_yaml::to_string(document)
        .map_err(|e| QueueError::config(format!("cannot serialize settings: {}", e)))
}
