use std::{
    collections::{BTreeSet, HashMap},
    path::PathBuf,
    sync::{Arc, Mutex},
};

pub const WATCHLIST_KEY: &str = "watchlist";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// String key/value persistence behind the watchlist.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn save(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStore {
    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A panic mid-insert leaves the map itself intact.
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values().get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// All keys in one JSON object file. A missing file reads as empty.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_all(&self) -> Result<HashMap<String, String>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl KeyValueStore for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut all = self.read_all().await?;
        all.insert(key.to_string(), value.to_string());

        // Replace via rename; readers see the old or the new file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&all)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Devices the operator keeps an eye on.
pub struct Watchlist {
    store: Arc<dyn KeyValueStore>,
    devices: BTreeSet<i64>,
}

impl Watchlist {
    /// Read the saved watchlist. A corrupt value is logged and treated as an
    /// empty list; store failures propagate.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let devices = match store.load(WATCHLIST_KEY).await? {
            None => BTreeSet::new(),
            Some(raw) => match serde_json::from_str::<Vec<i64>>(&raw) {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "stored watchlist is corrupt, starting empty");
                    BTreeSet::new()
                }
            },
        };

        Ok(Self { store, devices })
    }

    /// Returns false when the device was already watched.
    pub fn add(&mut self, device_id: i64) -> bool {
        self.devices.insert(device_id)
    }

    /// Returns false when the device was not watched.
    pub fn remove(&mut self, device_id: i64) -> bool {
        self.devices.remove(&device_id)
    }

    pub fn contains(&self, device_id: i64) -> bool {
        self.devices.contains(&device_id)
    }

    /// Watched device ids, ascending.
    pub fn devices(&self) -> Vec<i64> {
        self.devices.iter().copied().collect()
    }

    pub async fn save(&self) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&self.devices())?;
        self.store.save(WATCHLIST_KEY, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_remove_and_persist() {
        let store = Arc::new(InMemoryStore::default());

        let mut list = Watchlist::load(store.clone()).await.unwrap();
        assert!(list.devices().is_empty());
        assert!(list.add(12));
        assert!(list.add(3));
        assert!(!list.add(12));
        assert!(list.remove(12));
        assert!(!list.remove(99));
        list.add(7);
        list.save().await.unwrap();

        assert_eq!(
            store.load(WATCHLIST_KEY).await.unwrap().as_deref(),
            Some("[3,7]")
        );

        let reloaded = Watchlist::load(store).await.unwrap();
        assert_eq!(reloaded.devices(), vec![3, 7]);
        assert!(reloaded.contains(7));
        assert!(!reloaded.contains(12));
    }

    #[tokio::test]
    async fn corrupt_value_loads_empty() {
        let store = Arc::new(InMemoryStore::default());
        store.save(WATCHLIST_KEY, "{not json").await.unwrap();

        let list = Watchlist::load(store).await.unwrap();
        assert!(list.devices().is_empty());
    }

    #[tokio::test]
    async fn json_file_store_round_trips_and_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = JsonFileStore::new(&path);

        assert_eq!(store.load("theme").await.unwrap(), None);
        store.save("theme", "dark").await.unwrap();

        let mut list = Watchlist::load(Arc::new(store.clone())).await.unwrap();
        list.add(42);
        list.save().await.unwrap();

        let fresh = JsonFileStore::new(&path);
        assert_eq!(fresh.load("theme").await.unwrap().as_deref(), Some("dark"));
        assert_eq!(
            Watchlist::load(Arc::new(fresh)).await.unwrap().devices(),
            vec![42]
        );
    }

    #[tokio::test]
    async fn unreadable_store_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let res = Watchlist::load(Arc::new(JsonFileStore::new(&path))).await;
        assert!(matches!(res, Err(StoreError::Json(_))));
    }
}
