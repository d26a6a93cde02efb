/// Le moteur coordinateur : génère les tâches du plan d'animation,
/// les distribue aux workers enregistrés, ingère les résultats,
/// écrit les frames JPEG, et assemble le film final.

pub mod engine;
mod generate;
mod ingest;
mod movie;
mod service;
mod state;
mod waitgroup;

pub use engine::{RunSummary, run};
