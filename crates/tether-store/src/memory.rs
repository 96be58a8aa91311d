use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::store::DurableStore;

/// In-process store. Contents are lost when the value is dropped.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, Option<String>>> {
        let entries = self.entries.lock().unwrap();
        Ok(keys
            .iter()
            .map(|k| (k.to_string(), entries.get(*k).cloned()))
            .collect())
    }

    async fn set_many(&self, new_entries: &[(String, String)]) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        for (k, v) in new_entries {
            entries.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        for k in keys {
            entries.remove(*k);
        }
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
