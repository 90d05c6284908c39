//! Services dump (`<peripheral>.srv.json`) written by the scanner
//!
//! Only used to warn about addresses the peripheral never advertised; the
//! dump is optional and never blocks an action.

use std::path::{Path, PathBuf};

use gattmaster_proto::{CommandTable, Entry};

const SUFFIX: &str = ".srv.json";

#[derive(serde::Deserialize, Debug, Clone)]
pub struct ServiceRecord {
    pub uuid: String,
    #[serde(default)]
    pub characteristics: Vec<CharacteristicRecord>,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct CharacteristicRecord {
    pub uuid: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ServicesError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ServicesDump {
    services: Vec<ServiceRecord>,
}

impl ServicesDump {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            services: serde_json::from_str(json)?,
        })
    }

    pub async fn load(path: &Path) -> Result<Self, ServicesError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ServicesError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&json).map_err(|source| ServicesError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `-s` wins (suffix appended when missing), then `$DEVICES_PATH/<peripheral>.srv.json`
    pub fn locate(
        explicit: Option<&str>,
        devices_path: Option<&str>,
        peripheral_id: &str,
    ) -> Option<PathBuf> {
        match (explicit, devices_path) {
            (Some(file), _) if file.contains(SUFFIX) => Some(PathBuf::from(file)),
            (Some(file), _) => Some(PathBuf::from(format!("{file}{SUFFIX}"))),
            (None, Some(dir)) => Some(Path::new(dir).join(format!("{peripheral_id}{SUFFIX}"))),
            (None, None) => None,
        }
    }

    pub fn services(&self) -> &[ServiceRecord] {
        &self.services
    }

    pub fn contains(&self, service_id: &str, characteristic_id: &str) -> bool {
        let service_id = normalize(service_id);
        let characteristic_id = normalize(characteristic_id);
        self.services
            .iter()
            .filter(|s| normalize(&s.uuid) == service_id)
            .flat_map(|s| &s.characteristics)
            .any(|c| normalize(&c.uuid) == characteristic_id)
    }

    /// Table rows addressing a characteristic the peripheral never advertised
    pub fn unknown_entries<'a>(&self, table: &'a CommandTable) -> Vec<&'a Entry> {
        table
            .entries()
            .filter(|e| !self.contains(&e.service_id, &e.characteristic_id))
            .collect()
    }
}

fn normalize(uuid: &str) -> String {
    uuid.trim().replace('-', "").to_lowercase()
}
