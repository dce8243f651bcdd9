use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::{PreferenceError, PreferenceStore, Preferences};

/// JSON object of subscriber address → array of lower-cased tokens.
pub struct JsonFilePreferenceStore {
    path: PathBuf,
}

impl JsonFilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl PreferenceStore for JsonFilePreferenceStore {
    async fn load_all(&self) -> Result<Preferences, PreferenceError> {
        let body = match tokio::fs::read_to_string(&self.path).await {
            Ok(body) => body,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no preference file yet, starting empty");
                return Ok(Preferences::default());
            }
            Err(err) => return Err(err.into()),
        };

        let document: BTreeMap<String, Value> = serde_json::from_str(&body)?;
        let mut raw = BTreeMap::new();
        for (address, value) in document {
            let Value::Array(entries) = value else {
                warn!(%address, "ignoring non-array preference entry");
                continue;
            };
            let tokens = entries
                .into_iter()
                .filter_map(|entry| entry.as_str().map(str::to_string))
                .collect();
            raw.insert(address, tokens);
        }

        let prefs = Preferences::from_raw(raw);
        info!(path = %self.path.display(), subscribers = prefs.len(), "preferences loaded");
        Ok(prefs)
    }

    async fn save_all(&self, prefs: &Preferences) -> Result<(), PreferenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let body = serde_json::to_string_pretty(&prefs.to_raw())?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, body).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        info!(path = %self.path.display(), subscribers = prefs.len(), "preferences saved");
        Ok(())
    }
}
