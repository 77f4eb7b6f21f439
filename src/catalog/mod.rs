//! Channel catalog shared by a profile's relay servers
//!
//! A catalog is built once from a portal listing and never modified. A
//! refresh builds a new one and swaps it into the profile's
//! [`CatalogHandle`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

pub mod channel;

pub use channel::{Channel, ChannelInfo, ChannelResolver, LogoAsset};

use crate::errors::{AppError, AppResult};

#[derive(Debug)]
pub struct ChannelCatalog {
    channels: HashMap<String, Arc<Channel>>,
    sorted_keys: Vec<String>,
    by_cmd: HashMap<String, String>,
}

impl ChannelCatalog {
    /// Build a catalog keyed by channel name.
    ///
    /// Entries without a name or command are skipped and the first entry of
    /// a duplicated name wins. An empty result is an `EmptyCatalog` error.
    pub fn from_entries<I>(entries: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = ChannelInfo>,
    {
        let mut channels = HashMap::new();
        let mut by_cmd = HashMap::new();
        let mut skipped = 0usize;

        for info in entries {
            let key = info.name.trim().to_string();
            if key.is_empty() || info.cmd.trim().is_empty() {
                skipped += 1;
                continue;
            }
            if channels.contains_key(&key) {
                skipped += 1;
                continue;
            }
            by_cmd.entry(info.cmd.clone()).or_insert_with(|| key.clone());
            channels.insert(key.clone(), Arc::new(Channel::new(key, info)));
        }

        if channels.is_empty() {
            return Err(AppError::EmptyCatalog);
        }
        if skipped > 0 {
            debug!("Skipped {} unnamed, commandless or duplicate channels", skipped);
        }

        let mut sorted_keys: Vec<String> = channels.keys().cloned().collect();
        sorted_keys.sort();

        Ok(Self {
            channels,
            sorted_keys,
            by_cmd,
        })
    }

    pub fn get(&self, key: &str) -> Option<Arc<Channel>> {
        self.channels.get(key).cloned()
    }

    /// Channel listed with exactly this upstream command
    pub fn get_by_cmd(&self, cmd: &str) -> Option<Arc<Channel>> {
        self.by_cmd.get(cmd).and_then(|key| self.get(key))
    }

    /// Keys in byte order
    pub fn keys(&self) -> &[String] {
        &self.sorted_keys
    }

    /// Channels in key order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Channel>> {
        self.sorted_keys.iter().filter_map(|k| self.channels.get(k))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// The catalog currently served by one profile
#[derive(Debug, Clone)]
pub struct CatalogHandle {
    inner: Arc<RwLock<Arc<ChannelCatalog>>>,
}

impl CatalogHandle {
    pub fn new(catalog: ChannelCatalog) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    pub async fn current(&self) -> Arc<ChannelCatalog> {
        self.inner.read().await.clone()
    }

    /// Replace the served catalog. Requests already holding the old one finish with it.
    pub async fn install(&self, catalog: ChannelCatalog) {
        let catalog = Arc::new(catalog);
        *self.inner.write().await = catalog;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, cmd: &str) -> ChannelInfo {
        ChannelInfo {
            id: name.to_lowercase(),
            name: name.into(),
            genre: "News".into(),
            logo: String::new(),
            cmd: cmd.into(),
        }
    }

    #[test]
    fn test_keys_are_sorted_bytewise() {
        let catalog = ChannelCatalog::from_entries(vec![
            info("b", "cmd-b"),
            info("a", "cmd-a"),
            info("c", "cmd-c"),
            info("B", "cmd-B"),
        ])
        .unwrap();
        assert_eq!(catalog.keys(), ["B", "a", "b", "c"]);
        let names: Vec<&str> = catalog.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["B", "a", "b", "c"]);
    }

    #[test]
    fn test_skips_and_duplicates() {
        let catalog = ChannelCatalog::from_entries(vec![
            info("One", "first"),
            info("One", "second"),
            info("", "nameless"),
            info("Two", " "),
        ])
        .unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("One").unwrap().cmd(), "first");
        assert_eq!(catalog.get_by_cmd("first").unwrap().key(), "One");
        assert!(catalog.get_by_cmd("second").is_none());
        assert!(catalog.get("Two").is_none());
    }

    #[test]
    fn test_empty_catalog_error() {
        assert!(matches!(
            ChannelCatalog::from_entries(vec![info("", "x")]),
            Err(AppError::EmptyCatalog)
        ));
    }

    #[tokio::test]
    async fn test_install_swaps_whole_catalog() {
        let handle =
            CatalogHandle::new(ChannelCatalog::from_entries(vec![info("old", "o")]).unwrap());
        let before = handle.current().await;

        handle
            .install(ChannelCatalog::from_entries(vec![info("new", "n"), info("other", "x")]).unwrap())
            .await;

        assert!(before.get("old").is_some());
        let after = handle.current().await;
        assert!(after.get("old").is_none());
        assert_eq!(after.len(), 2);
    }
}
