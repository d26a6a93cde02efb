use std::path::Path;

use serde::{Deserialize, Serialize};

use ms_core::error::SettingsError;
use ms_core::settings::{DEFAULT_SERVER_ADDRESS, read_json};

/// Hôte par défaut du serveur local d'un worker. L'implémentation
/// d'origine cherchait la première interface non-loopback ; la
/// découverte réseau est hors périmètre, l'hôte se configure.
const DEFAULT_BIND_HOST: &str = "127.0.0.1";

/// Configuration d'un worker : où joindre le coordinateur, et sur
/// quel hôte lier son propre serveur (le port est toujours choisi
/// libre).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkerSettings {
    /// host:port of the coordinator.
    #[serde(default)]
    pub coordinator_address: String,
    /// Host the worker's own listener binds to.
    #[serde(default)]
    pub bind_host: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            coordinator_address: DEFAULT_SERVER_ADDRESS.to_string(),
            bind_host: DEFAULT_BIND_HOST.to_string(),
        }
    }
}

impl WorkerSettings {
    /// Charge et normalise la configuration depuis un fichier JSON.
    ///
    /// # Errors
    /// Retourne [`SettingsError`] si le fichier est illisible ou si
    /// le JSON ne correspond pas au schéma.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let mut settings: Self = read_json(path)?;
        settings.normalize();
        log::debug!("Worker settings: {settings:?}");
        Ok(settings)
    }

    /// Remplace les champs vides par leurs défauts. Idempotent.
    pub fn normalize(&mut self) {
        if self.coordinator_address.is_empty() {
            self.coordinator_address = DEFAULT_SERVER_ADDRESS.to_string();
        }
        if self.bind_host.is_empty() {
            self.bind_host = DEFAULT_BIND_HOST.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.json");
        std::fs::write(&path, "{}").unwrap();
        let settings = WorkerSettings::load(&path).unwrap();
        assert_eq!(settings.coordinator_address, DEFAULT_SERVER_ADDRESS);
        assert_eq!(settings.bind_host, DEFAULT_BIND_HOST);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn empty_strings_are_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.json");
        std::fs::write(&path, r#"{"CoordinatorAddress":"","BindHost":""}"#).unwrap();
        let settings = WorkerSettings::load(&path).unwrap();
        assert_eq!(settings.coordinator_address, DEFAULT_SERVER_ADDRESS);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn explicit_address_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.json");
        std::fs::write(&path, r#"{"CoordinatorAddress":"10.0.0.2:6000"}"#).unwrap();
        let settings = WorkerSettings::load(&path).unwrap();
        assert_eq!(settings.coordinator_address, "10.0.0.2:6000");
    }
}
