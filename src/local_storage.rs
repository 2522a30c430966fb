//! Per-sandbox view of the app [`KeyValueStore`]: the visitor passport and the last targeting
//! response.
use std::sync::Arc;

use crate::{sandbox::TargetingResponse, storage::KeyValueStore, Config, Result};

/// State of one sandbox [`Config`] in a shared [`KeyValueStore`].
///
/// Keys are derived from the config, so several sandboxes can share a store.
pub(crate) struct LocalStorage {
    store: Arc<dyn KeyValueStore>,
    passport_key: String,
    targeting_key: String,
}

impl LocalStorage {
    pub fn new(config: &Config, store: Arc<dyn KeyValueStore>) -> Self {
        LocalStorage {
            store,
            passport_key: config.passport_key(),
            targeting_key: config.targeting_key(),
        }
    }

    pub fn get_passport(&self) -> Result<Option<String>> {
        Ok(self.store.get(&self.passport_key)?)
    }

    pub fn set_passport(&self, passport: &str) -> Result<()> {
        Ok(self.store.set(&self.passport_key, passport)?)
    }

    /// Get the cached targeting response. Returns `None` if nothing was cached or the cache was
    /// cleared.
    pub fn get_targeting(&self) -> Result<Option<TargetingResponse>> {
        let Some(json) = self.store.get(&self.targeting_key)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Replace the cached targeting response.
    pub fn set_targeting(&self, targeting: &TargetingResponse) -> Result<()> {
        // Serializing before touching the store, so a failure leaves the previous value intact.
        let json = serde_json::to_string(targeting)?;
        Ok(self.store.set(&self.targeting_key, &json)?)
    }

    pub fn clear_targeting(&self) -> Result<()> {
        Ok(self.store.remove(&self.targeting_key)?)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use super::LocalStorage;
    use crate::{
        storage::{InMemoryStore, KeyValueStore},
        Config, Error,
    };

    fn targeting() -> HashMap<String, Vec<String>> {
        HashMap::from([
            ("gender".to_owned(), vec!["F".to_owned()]),
            ("age".to_owned(), vec!["18-24".to_owned(), "25-34".to_owned()]),
        ])
    }

    #[test]
    fn targeting_round_trip_and_clear() {
        let storage = LocalStorage::new(&Config::new("host", "app"), Arc::new(InMemoryStore::new()));

        assert_eq!(storage.get_targeting().unwrap(), None);

        storage.set_targeting(&targeting()).unwrap();
        assert_eq!(storage.get_targeting().unwrap(), Some(targeting()));

        storage.clear_targeting().unwrap();
        assert_eq!(storage.get_targeting().unwrap(), None);
    }

    #[test]
    fn passport_is_stored_under_config_key() {
        let store = Arc::new(InMemoryStore::new());
        let config = Config::new("host", "app");
        let storage = LocalStorage::new(&config, store.clone());

        assert_eq!(storage.get_passport().unwrap(), None);
        storage.set_passport("abc123").unwrap();

        assert_eq!(
            store.get(&config.passport_key()).unwrap().as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn sandboxes_sharing_a_store_are_isolated() {
        let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
        let a = LocalStorage::new(&Config::new("host", "a"), store.clone());
        let b = LocalStorage::new(&Config::new("host", "b"), store.clone());

        a.set_passport("pass-a").unwrap();
        a.set_targeting(&targeting()).unwrap();

        assert_eq!(b.get_passport().unwrap(), None);
        assert_eq!(b.get_targeting().unwrap(), None);
    }

    #[test]
    fn corrupted_targeting_is_an_error() {
        let store = Arc::new(InMemoryStore::new());
        let config = Config::new("host", "app");
        store.set(&config.targeting_key(), "{not json").unwrap();

        let storage = LocalStorage::new(&config, store);
        assert!(matches!(storage.get_targeting(), Err(Error::Json(_))));
    }
}
