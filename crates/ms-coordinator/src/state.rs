use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ms_core::frame::FrameImage;
use ms_core::settings::CoordinatorSettings;
use ms_core::task::Task;
use ms_rpc::RpcClient;

use crate::waitgroup::WaitGroup;

/// Capacité des files de tâches. Bornée : la contre-pression sur le
/// générateur est attendue et correcte.
pub(crate) const QUEUE_CAPACITY: usize = 1000;

/// Un worker vu du coordinateur : sa poignée client et l'ombre de
/// chaque tâche en vol chez lui.
pub(crate) struct WorkerEntry {
    pub client: RpcClient,
    /// task id → copie de la tâche telle que distribuée (donc sans
    /// résultat), pour la réclamation.
    pub outstanding: HashMap<u64, Task>,
}

/// Comptabilité structurelle, sous un seul verrou : la carte des
/// workers (avec leurs tâches en vol) et les frames en cours
/// d'assemblage.
pub(crate) struct Bookkeeping {
    pub workers: HashMap<String, WorkerEntry>,
    pub images: HashMap<u32, FrameImage>,
}

/// État partagé entre le service RPC, le générateur, l'ingesteur et
/// les tickers.
pub(crate) struct Shared {
    pub settings: CoordinatorSettings,
    pub image_count: u32,
    pub total_task_count: u64,
    pub digit_count: usize,
    pub run_dir: PathBuf,

    /// Côté consommation de la file des tâches à faire.
    pub pending_rx: flume::Receiver<Task>,
    /// Producteur de réclamation. Le générateur tient son propre
    /// émetteur ; celui-ci est lâché par l'ingesteur en fin de flux —
    /// c'est à ce moment que GetTask rend la sentinelle.
    pub reclaim_tx: Mutex<Option<flume::Sender<Task>>>,
    /// Côté consommation de la file des résultats.
    pub done_rx: flume::Receiver<Task>,
    /// Producteur des résultats, lâché par l'ingesteur en fin de flux.
    pub done_tx: Mutex<Option<flume::Sender<Task>>>,

    pub book: Mutex<Bookkeeping>,
    pub generated: AtomicU64,
    pub ingested: AtomicU64,
    pub completed: AtomicU32,
    pub workers_present: WaitGroup,
    pub shutdown: AtomicBool,
}

/// Verrouillage avec récupération d'empoisonnement : un thread qui a
/// paniqué ne doit pas condamner la comptabilité.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Construit l'état partagé d'un run à partir d'un plan
    /// normalisé. Retourne aussi l'émetteur réservé au générateur.
    pub fn new(settings: CoordinatorSettings, run_dir: PathBuf) -> (Arc<Self>, flume::Sender<Task>) {
        let (pending_tx, pending_rx) = flume::bounded(QUEUE_CAPACITY);
        let (done_tx, done_rx) = flume::bounded(QUEUE_CAPACITY);
        let shared = Arc::new(Self {
            image_count: settings.image_count(),
            total_task_count: settings.total_task_count(),
            digit_count: settings.digit_count(),
            settings,
            run_dir,
            pending_rx,
            reclaim_tx: Mutex::new(Some(pending_tx.clone())),
            done_rx,
            done_tx: Mutex::new(Some(done_tx)),
            book: Mutex::new(Bookkeeping {
                workers: HashMap::new(),
                images: HashMap::new(),
            }),
            generated: AtomicU64::new(0),
            ingested: AtomicU64::new(0),
            completed: AtomicU32::new(0),
            workers_present: WaitGroup::new(),
            shutdown: AtomicBool::new(false),
        });
        (shared, pending_tx)
    }
}

/// Retire un worker de la comptabilité : réclame ses tâches en vol,
/// ferme sa poignée, décrémente le compteur de présence. C'est le
/// chemin unique de sortie — DeRegisterWorker comme appel nominal
/// manqué.
pub(crate) fn remove_worker(shared: &Shared, address: &str) {
    let entry = lock(&shared.book).workers.remove(address);
    let Some(entry) = entry else {
        log::warn!("[coordinator] départ d'un worker inconnu: {address}");
        return;
    };

    // La réclamation se fait hors verrou : l'envoi peut bloquer sur
    // une file pleine.
    let reclaim_tx = lock(&shared.reclaim_tx).clone();
    let mut reclaimed = 0usize;
    for (_, task) in entry.outstanding {
        // Seules les copies sans résultat sont réclamées : c'est la
        // garantie qui rend la re-distribution sûre.
        if !task.results.is_empty() {
            continue;
        }
        let sent = match &reclaim_tx {
            Some(tx) => requeue(shared, tx, task),
            None => false,
        };
        if sent {
            reclaimed += 1;
        } else {
            log::warn!("[coordinator] tâche en vol abandonnée, flux déjà clos");
        }
    }
    if reclaimed > 0 {
        log::info!("[coordinator] {reclaimed} tâches réclamées de {address}");
    }

    entry.client.disconnect();
    log::info!("[coordinator] worker parti: {address}");
    shared.workers_present.done();
}

/// Remet une tâche en file, par tranches d'attente pour rester
/// interruptible par l'arrêt du run.
fn requeue(shared: &Shared, tx: &flume::Sender<Task>, task: Task) -> bool {
    let mut task = task;
    loop {
        if shared.shutdown.load(Ordering::Relaxed) {
            return false;
        }
        match tx.send_timeout(task, Duration::from_millis(500)) {
            Ok(()) => return true,
            Err(flume::SendTimeoutError::Timeout(returned)) => task = returned,
            Err(flume::SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}
