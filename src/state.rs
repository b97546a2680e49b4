// src/state.rs

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// An app's named state dictionaries, shared by all of the app's bees and
/// its map functions.
///
/// Individual operations are atomic, but the runtime provides no ordering
/// across operations: apps that need read-modify-write consistency beyond a
/// single key rely on key ownership (one bee per key) or synchronize
/// themselves.
#[derive(Debug, Clone, Default)]
pub struct AppState {
  dicts: Arc<Mutex<HashMap<String, HashMap<String, Bytes>>>>,
}

impl AppState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, dict: &str, key: &str) -> Option<Bytes> {
    self.dicts.lock().get(dict).and_then(|d| d.get(key).cloned())
  }

  pub fn put(&self, dict: &str, key: impl Into<String>, value: Bytes) {
    self
      .dicts
      .lock()
      .entry(dict.to_owned())
      .or_default()
      .insert(key.into(), value);
  }

  pub fn remove(&self, dict: &str, key: &str) -> Option<Bytes> {
    self.dicts.lock().get_mut(dict).and_then(|d| d.remove(key))
  }

  /// Keys currently present in `dict`.
  pub fn keys(&self, dict: &str) -> Vec<String> {
    self
      .dicts
      .lock()
      .get(dict)
      .map(|d| d.keys().cloned().collect())
      .unwrap_or_default()
  }
}
