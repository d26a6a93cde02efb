use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ms_core::task::Task;
use ms_rpc::wire::CallError;
use ms_rpc::{Handler, Request, Response, RpcClient};

use crate::state::{self, Shared, WorkerEntry, lock};

/// Attente maximale d'une réponse d'appel nominal. Un worker muet
/// au-delà est traité comme absent.
const ROLL_CALL_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Le dispatch RPC du coordinateur : les six méthodes que les
/// workers (et les tickers) invoquent.
pub(crate) struct CoordinatorService {
    shared: Arc<Shared>,
}

impl CoordinatorService {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Ouvre une poignée vers le serveur du worker et l'enregistre.
    /// Un échec de connexion se journalise seulement : l'appel
    /// nominal suivant fera le ménage.
    fn register_worker(&self, address: String) -> Response {
        if lock(&self.shared.book).workers.contains_key(&address) {
            log::warn!("[coordinator] ré-enregistrement de {address}");
            state::remove_worker(&self.shared, &address);
        }

        let client = RpcClient::new(address.clone(), format!("coordinator->{address}"));
        if let Err(e) = client.connect() {
            log::warn!("[coordinator] connexion vers {address} impossible: {e}");
        }
        client.set_reply_timeout(Some(ROLL_CALL_REPLY_TIMEOUT));

        lock(&self.shared.book).workers.insert(
            address.clone(),
            WorkerEntry {
                client,
                outstanding: HashMap::new(),
            },
        );
        self.shared.workers_present.add();
        log::info!("[coordinator] worker rejoint: {address}");
        Response::Ack
    }

    /// Tire une tâche de la file. Suspend l'appelant tant que la
    /// file est vide et encore ouverte ; une fois le flux clos,
    /// chaque appel rend la sentinelle de fin.
    fn get_task(&self, address: String) -> Response {
        match self.shared.pending_rx.recv() {
            Ok(mut task) => {
                task.worker_address.clone_from(&address);
                {
                    let mut book = lock(&self.shared.book);
                    if let Some(entry) = book.workers.get_mut(&address) {
                        entry.outstanding.insert(task.id, task.clone());
                        return Response::Assigned(task);
                    }
                }
                // Appelant jamais enregistré : sans ombre en
                // comptabilité la tâche serait irréclamable. Elle
                // repart en file, l'appel est refusé.
                log::warn!("[coordinator] GetTask d'un worker non enregistré: {address}");
                if let Some(tx) = lock(&self.shared.reclaim_tx).clone() {
                    let _ = tx.send(task);
                }
                Response::Failed(CallError::UnknownWorker(address))
            }
            Err(_) => {
                log::info!("[coordinator] toutes les tâches sont distribuées");
                Response::Failed(CallError::QueueDrained)
            }
        }
    }

    /// Met une tâche terminée en file d'ingestion. Une tâche qui
    /// n'est plus en vol pour ce worker — réclamée entre-temps — est
    /// abandonnée : sa jumelle re-distribuée fait foi.
    fn return_task(&self, task: Task) -> Response {
        let still_outstanding = lock(&self.shared.book)
            .workers
            .get(&task.worker_address)
            .is_some_and(|entry| entry.outstanding.contains_key(&task.id));
        if !still_outstanding {
            log::warn!(
                "[coordinator] tâche {} renvoyée par {} hors comptabilité, abandonnée",
                task.id,
                task.worker_address
            );
            return Response::Ack;
        }

        // L'envoi peut bloquer sur une file pleine : jamais sous le
        // verrou de comptabilité.
        let done_tx = lock(&self.shared.done_tx).clone();
        match done_tx {
            Some(tx) => {
                if tx.send(task).is_err() {
                    log::warn!("[coordinator] résultat reçu après la fin du flux");
                }
            }
            None => log::warn!("[coordinator] résultat reçu après la fin du flux"),
        }
        Response::Ack
    }
}

impl Handler for CoordinatorService {
    fn handle(&self, request: Request) -> Response {
        match request {
            Request::RegisterWorker(address) => self.register_worker(address),
            Request::DeRegisterWorker(address) => {
                state::remove_worker(&self.shared, &address);
                Response::Ack
            }
            Request::RollCall => Response::Present(true),
            Request::GetTask(address) => self.get_task(address),
            Request::ReturnTask(task) => self.return_task(task),
            Request::GetRenderSettings => Response::Settings(self.shared.settings.render.clone()),
        }
    }
}
