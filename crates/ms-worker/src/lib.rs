/// Le moteur worker : s'enregistre auprès du coordinateur, tire des
/// tâches, calcule chaque pixel via le noyau fractal, renvoie les
/// résultats, et répond aux sondes de vivacité.

pub mod engine;
pub mod settings;

pub use engine::run;
pub use settings::WorkerSettings;
