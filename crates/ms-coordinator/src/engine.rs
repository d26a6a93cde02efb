use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use ms_core::settings::CoordinatorSettings;
use ms_rpc::{Request, Response, RpcServer};

use crate::service::CoordinatorService;
use crate::state::{Shared, lock};
use crate::{generate, ingest, movie};

/// Période du journal de battement de cœur.
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);
/// Période de l'appel nominal vers les workers. C'est le timeout de
/// vivacité du run : un worker muet au-delà est réclamé.
const ROLL_CALL_PERIOD: Duration = Duration::from_secs(60);
/// Granularité de scrutation du drapeau d'arrêt des tickers.
const TICK: Duration = Duration::from_millis(500);

/// Ce qu'un run laisse derrière lui.
#[derive(Debug)]
pub struct RunSummary {
    /// Frames que le plan prévoyait.
    pub image_count: u32,
    /// Frames effectivement écrites sur disque.
    pub frames_written: u32,
    /// Dossier du run.
    pub run_dir: PathBuf,
}

/// Fait tourner un run complet de coordinateur : validation du plan,
/// dossier de run, serveur RPC, puis générateur + ingesteur + tickers
/// jusqu'à la dernière frame (et le film, le cas échéant).
///
/// # Errors
/// Plan invalide, dossier de run impossible à créer, adresse du
/// serveur non liable, ou échec d'écriture d'une frame.
pub fn run(settings_path: &Path) -> Result<RunSummary> {
    let mut settings = CoordinatorSettings::load(settings_path)?;
    if settings.generate_movie && !movie::encoder_available() {
        log::warn!("[coordinator] ffmpeg introuvable : GenerateMovie désactivé.");
        settings.generate_movie = false;
    }

    let run_dir = prepare_run_dir(&settings, settings_path)?;
    let (shared, generator_tx) = Shared::new(settings, run_dir.clone());
    log::info!(
        "[coordinator] run {} : {} images, {} tâches",
        shared.settings.run_name,
        shared.image_count,
        shared.total_task_count
    );

    let service = Arc::new(CoordinatorService::new(Arc::clone(&shared)));
    let mut server = RpcServer::run(service, &shared.settings.server_address, "coordinator")
        .context("démarrage du serveur RPC")?;

    let generator_shared = Arc::clone(&shared);
    let generator = thread::Builder::new()
        .name("ms-generate".to_string())
        .spawn(move || generate::generate(&generator_shared, &generator_tx))
        .context("démarrage du générateur")?;

    let ticker_shared = Arc::clone(&shared);
    let ticker = thread::Builder::new()
        .name("ms-tickers".to_string())
        .spawn(move || tickers(&ticker_shared))
        .context("démarrage des tickers")?;

    let outcome = ingest::ingest(&shared);

    if outcome.is_ok() {
        log::info!(
            "[coordinator] attente du départ de {} workers",
            shared.workers_present.count()
        );
        shared.workers_present.wait();

        if shared.settings.generate_movie {
            match movie::encode_movie(&run_dir, shared.digit_count) {
                Ok(()) => log::info!("[coordinator] movie.mp4 écrit"),
                // Un encodeur disparu en cours de run n'invalide pas
                // les frames produites.
                Err(e) => log::warn!("[coordinator] assemblage du film en échec: {e}"),
            }
        }
    }

    shared.shutdown.store(true, Ordering::Relaxed);
    server.stop();
    let _ = generator.join();
    let _ = ticker.join();

    outcome?;
    let summary = RunSummary {
        image_count: shared.image_count,
        frames_written: shared.completed.load(Ordering::Relaxed),
        run_dir,
    };
    log::info!(
        "[coordinator] run terminé : {}/{} frames",
        summary.frames_written,
        summary.image_count
    );
    Ok(summary)
}

/// Crée savePath/runName et y dépose la copie de reproductibilité du
/// fichier de configuration, octet pour octet.
fn prepare_run_dir(settings: &CoordinatorSettings, settings_path: &Path) -> Result<PathBuf> {
    let run_dir = settings.save_path.join(&settings.run_name);
    if run_dir.exists() {
        if !run_dir.is_dir() {
            bail!("{} existe et n'est pas un dossier", run_dir.display());
        }
    } else {
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("création de {}", run_dir.display()))?;
    }

    let copy_name = settings_path
        .file_name()
        .map_or_else(|| "settings.json".into(), ToOwned::to_owned);
    fs::copy(settings_path, run_dir.join(&copy_name)).with_context(|| {
        format!(
            "copie de {} dans {}",
            settings_path.display(),
            run_dir.display()
        )
    })?;
    Ok(run_dir)
}

/// Les deux activités périodiques du coordinateur, sur leurs propres
/// horloges : battement de cœur (30 s) et appel nominal (60 s).
fn tickers(shared: &Shared) {
    let mut heartbeat = Duration::ZERO;
    let mut roll_call = Duration::ZERO;
    while !shared.shutdown.load(Ordering::Relaxed) {
        thread::sleep(TICK);
        heartbeat += TICK;
        roll_call += TICK;
        if heartbeat >= HEARTBEAT_PERIOD {
            heartbeat = Duration::ZERO;
            log_heartbeat(shared);
        }
        if roll_call >= ROLL_CALL_PERIOD {
            roll_call = Duration::ZERO;
            run_roll_call(shared);
        }
    }
}

fn log_heartbeat(shared: &Shared) {
    let in_progress = lock(&shared.book).images.len();
    let completed = shared.completed.load(Ordering::Relaxed);
    log::info!(
        "[coordinator] Tasks [Generated: {}] [Ingested: {}] | Images [Completed: {}] [WIP: {}] [Todo: {}]",
        shared.generated.load(Ordering::Relaxed),
        shared.ingested.load(Ordering::Relaxed),
        completed,
        in_progress,
        shared.image_count - completed
    );
}

/// Sonde chaque worker enregistré. Un appel en échec ferme la
/// poignée et retire le worker par le chemin de désenregistrement —
/// ses tâches en vol repartent en file.
fn run_roll_call(shared: &Shared) {
    log::debug!("[coordinator] appel nominal");
    let clients: Vec<_> = lock(&shared.book)
        .workers
        .iter()
        .map(|(address, entry)| (address.clone(), entry.client.clone()))
        .collect();

    for (address, client) in clients {
        let alive = matches!(
            client.call(&Request::RollCall),
            Ok(Response::Present(true))
        );
        if !alive {
            log::warn!("[coordinator] worker absent à l'appel nominal: {address}");
            crate::state::remove_worker(shared, &address);
        }
    }
}
