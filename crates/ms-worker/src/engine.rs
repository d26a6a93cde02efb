use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, bail};

use ms_core::task::{PixelResult, Task};
use ms_kernel::Mandelbrot;
use ms_rpc::wire::CallError;
use ms_rpc::{Handler, Request, Response, RpcClient, RpcServer};

use crate::settings::WorkerSettings;

/// Période du journal de progression.
const PROGRESS_PERIOD: Duration = Duration::from_secs(30);
/// Granularité de scrutation du drapeau d'arrêt du ticker.
const TICK: Duration = Duration::from_millis(500);

/// Répondeur du serveur local : seul l'appel nominal du coordinateur
/// est servi ici, la boucle de tâches vit côté client.
struct LivenessResponder;

impl Handler for LivenessResponder {
    fn handle(&self, request: Request) -> Response {
        match request {
            Request::RollCall => Response::Present(true),
            _ => Response::Failed(CallError::UnsupportedMethod),
        }
    }
}

/// Fait tourner un worker jusqu'à épuisement du flux de tâches.
/// Retourne le nombre de tâches complétées.
///
/// Démarrage : lier un port libre, servir RollCall, s'enregistrer
/// auprès du coordinateur, recevoir la copie des paramètres de rendu.
/// Toute erreur de transport worker→coordinateur est fatale ; seule
/// la sentinelle « all tasks handed out » termine proprement.
///
/// # Errors
/// Connexion initiale impossible, appel en échec, ou réponse hors
/// protocole.
pub fn run(settings: &WorkerSettings) -> Result<u64> {
    let mut server = RpcServer::run(
        Arc::new(LivenessResponder),
        &format!("{}:0", settings.bind_host),
        "worker",
    )
    .context("démarrage du serveur local")?;
    let my_address = server.local_address().to_string();
    log::info!("[worker {my_address}] démarrage");

    let client = RpcClient::new(
        settings.coordinator_address.clone(),
        format!("worker {my_address}"),
    );
    client.connect().context("connexion au coordinateur")?;

    let outcome = serve(&client, &my_address);

    // Départ meilleur-effort : un échec ici n'est pas fatal.
    if let Err(e) = deregister(&client, &my_address) {
        log::warn!("[worker {my_address}] échec du désenregistrement: {e}");
    }
    client.disconnect();
    server.stop();

    outcome
}

/// Enregistrement, récupération des paramètres, puis boucle de
/// tâches, avec le ticker de progression autour.
fn serve(client: &RpcClient, my_address: &str) -> Result<u64> {
    client
        .call(&Request::RegisterWorker(my_address.to_string()))?
        .into_result()
        .context("RegisterWorker refusé")?;

    let render = match client.call(&Request::GetRenderSettings)?.into_result()? {
        Response::Settings(render) => render,
        other => bail!("réponse inattendue à GetRenderSettings: {other:?}"),
    };
    let kernel = Mandelbrot::new(render);

    let completed = Arc::new(AtomicU64::new(0));
    let ticker_stop = Arc::new(AtomicBool::new(false));
    let ticker = spawn_progress_ticker(my_address, &completed, &ticker_stop)?;

    let outcome = task_loop(client, &kernel, my_address, &completed);

    ticker_stop.store(true, Ordering::Relaxed);
    let _ = ticker.join();

    outcome?;
    let total = completed.load(Ordering::Relaxed);
    log::info!("[worker {my_address}] terminé, {total} tâches traitées");
    Ok(total)
}

/// Tire des tâches jusqu'à la sentinelle de fin de flux.
fn task_loop(
    client: &RpcClient,
    kernel: &Mandelbrot,
    my_address: &str,
    completed: &AtomicU64,
) -> Result<()> {
    log::info!("[worker {my_address}] traitement des tâches");
    loop {
        let response = client.call(&Request::GetTask(my_address.to_string()))?;
        let mut task = match response.into_result() {
            Ok(Response::Assigned(task)) => task,
            Ok(other) => bail!("réponse inattendue à GetTask: {other:?}"),
            Err(CallError::QueueDrained) => {
                log::info!("[worker {my_address}] toutes les tâches sont distribuées");
                return Ok(());
            }
            Err(e) => return Err(e).context("GetTask refusé"),
        };

        compute(kernel, &mut task);

        client
            .call(&Request::ReturnTask(task))?
            .into_result()
            .context("ReturnTask refusé")?;
        completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Calcule chaque coordonnée d'une tâche, curseur en lockstep.
fn compute(kernel: &Mandelbrot, task: &mut Task) {
    while let Some(coordinate) = task.next_coordinate() {
        let color = kernel.sample(&coordinate);
        task.add_result(PixelResult {
            column: coordinate.column,
            row: coordinate.row,
            color,
        });
    }
}

fn deregister(client: &RpcClient, my_address: &str) -> Result<()> {
    client
        .call(&Request::DeRegisterWorker(my_address.to_string()))?
        .into_result()?;
    Ok(())
}

fn spawn_progress_ticker(
    my_address: &str,
    completed: &Arc<AtomicU64>,
    stop: &Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let name = format!("worker {my_address}");
    let completed = Arc::clone(completed);
    let stop = Arc::clone(stop);
    thread::Builder::new()
        .name("ms-worker-ticker".to_string())
        .spawn(move || {
            let mut elapsed = Duration::ZERO;
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(TICK);
                elapsed += TICK;
                if elapsed >= PROGRESS_PERIOD {
                    elapsed = Duration::ZERO;
                    log::info!(
                        "[{name}] Tasks [Completed: {}]",
                        completed.load(Ordering::Relaxed)
                    );
                }
            }
        })
        .context("démarrage du ticker de progression")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_core::color::Rgba;
    use ms_core::settings::RenderSettings;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn smoke_render_settings() -> RenderSettings {
        let mut settings = RenderSettings {
            boundary: 4.0,
            width: 4,
            height: 4,
            max_iterations: 50,
            palette: vec![Rgba::WHITE],
            escape_color: Rgba::BLACK,
            super_sampling: 1,
            ..RenderSettings::default()
        };
        settings.normalize();
        settings
    }

    #[test]
    fn compute_fills_every_coordinate_in_order() {
        let kernel = Mandelbrot::new(smoke_render_settings());
        let mut task = Task::for_row(0, 0, 0.0, 0.0, 0.5, 2, 4);
        compute(&kernel, &mut task);
        assert!(task.is_complete());
        assert_eq!(task.results.len(), 4);
        for (k, result) in task.results.iter().enumerate() {
            assert_eq!(result.column, task.coordinates[k].column);
            assert_eq!(result.row, task.coordinates[k].row);
            assert_eq!(result.color.a, 255);
        }
        // Le pixel (2, 2) est l'origine du plan : il n'échappe pas.
        assert_eq!(task.results[2].color, Rgba::BLACK);
    }

    #[test]
    fn liveness_responder_only_serves_roll_call() {
        let responder = LivenessResponder;
        assert!(matches!(
            responder.handle(Request::RollCall),
            Response::Present(true)
        ));
        assert!(matches!(
            responder.handle(Request::GetRenderSettings),
            Response::Failed(CallError::UnsupportedMethod)
        ));
    }

    /// Coordinateur factice : distribue des tâches préparées puis la
    /// sentinelle, et capture tout ce qui revient.
    struct ScriptedCoordinator {
        todo: Mutex<VecDeque<Task>>,
        returned: Mutex<Vec<Task>>,
        render: RenderSettings,
    }

    impl Handler for ScriptedCoordinator {
        fn handle(&self, request: Request) -> Response {
            match request {
                Request::RegisterWorker(_) | Request::DeRegisterWorker(_) => Response::Ack,
                Request::RollCall => Response::Present(true),
                Request::GetRenderSettings => Response::Settings(self.render.clone()),
                Request::GetTask(_) => {
                    match self
                        .todo
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .pop_front()
                    {
                        Some(task) => Response::Assigned(task),
                        None => Response::Failed(CallError::QueueDrained),
                    }
                }
                Request::ReturnTask(task) => {
                    self.returned
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .push(task);
                    Response::Ack
                }
            }
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn worker_drains_the_queue_and_returns_results() {
        let mut todo = VecDeque::new();
        for row in 0..4 {
            todo.push_back(Task::for_row(u64::from(row), 0, 0.0, 0.0, 0.5, row, 4));
        }
        let coordinator = Arc::new(ScriptedCoordinator {
            todo: Mutex::new(todo),
            returned: Mutex::new(Vec::new()),
            render: smoke_render_settings(),
        });

        let mut server =
            RpcServer::run(Arc::clone(&coordinator), "127.0.0.1:0", "fake-coordinator").unwrap();
        let settings = WorkerSettings {
            coordinator_address: server.local_address().to_string(),
            bind_host: "127.0.0.1".to_string(),
        };

        let completed = run(&settings).unwrap();
        assert_eq!(completed, 4);

        let returned = coordinator
            .returned
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(returned.len(), 4);
        assert!(returned.iter().all(Task::is_complete));
        // Les résultats reviennent en ordre de coordonnées.
        let mut ids: Vec<u64> = returned.iter().map(|t| t.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3]);

        server.stop();
    }
}
