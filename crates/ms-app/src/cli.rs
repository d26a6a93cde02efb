use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// mandelswarm — distributed renderer for Mandelbrot zoom sequences.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Rôle de ce processus.
    #[arg(long, value_enum)]
    pub mode: Mode,

    /// Fichier de configuration JSON.
    #[arg(long)]
    pub settings: PathBuf,

    /// Nombre de workers lancés dans ce processus (mode worker).
    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    /// Niveau de log : error, warn, info, debug, trace.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Les deux rôles d'une instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Génère, distribue, assemble, écrit les frames.
    Coordinator,
    /// Tire des tâches et calcule des pixels.
    Worker,
}
