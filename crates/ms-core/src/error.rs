use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a settings file.
///
/// Anything that can be auto-corrected is handled by normalisation
/// instead; these are the failures that abort a run at startup.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("impossible de lire {}", path.display())]
    Read {
        /// Path that failed to open or read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The settings file is not valid JSON for the expected shape.
    #[error("JSON invalide dans {}", path.display())]
    Parse {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying parse failure.
        source: serde_json::Error,
    },
}
