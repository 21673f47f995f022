use std::{collections::BTreeMap, path::PathBuf};

use color_eyre::Result;
use eyre::eyre;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::desk::identity::AccessoryHandle;

/// Accessories registered in earlier runs, persisted as a JSON array.
pub struct AccessoryCache {
    path: PathBuf,
    accessories: Mutex<BTreeMap<Uuid, AccessoryHandle>>,
}

impl AccessoryCache {
    pub async fn load(path: impl Into<PathBuf>) -> Result<AccessoryCache> {
        let path = path.into();

        let accessories: Vec<AccessoryHandle> = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let de = &mut serde_json::Deserializer::from_slice(&bytes);
                serde_path_to_error::deserialize(de)
                    .map_err(|e| eyre!("Corrupt accessory cache {}: {}", path.display(), e))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => vec![],
            Err(e) => return Err(e.into()),
        };

        Ok(AccessoryCache {
            path,
            accessories: Mutex::new(
                accessories
                    .into_iter()
                    .map(|handle| (handle.uuid, handle))
                    .collect(),
            ),
        })
    }

    pub async fn accessories(&self) -> Vec<AccessoryHandle> {
        self.accessories.lock().await.values().cloned().collect()
    }

    /// Stores the accessory and rewrites the cache file.
    pub async fn upsert(&self, handle: &AccessoryHandle) -> Result<()> {
        let mut accessories = self.accessories.lock().await;
        accessories.insert(handle.uuid, handle.clone());

        let json = serde_json::to_vec_pretty(&accessories.values().collect::<Vec<_>>())?;

        // Write a sibling file and rename it over the real one
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        Ok(())
    }
}
