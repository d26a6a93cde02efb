use std::sync::atomic::Ordering;
use std::time::Duration;

use ms_core::plan::FrameSequence;
use ms_core::task::{Granularity, Task};

use crate::state::Shared;

/// Tranche d'attente sur une file pleine, entre deux regards sur le
/// drapeau d'arrêt. Un run qui avorte ne doit pas laisser le
/// générateur suspendu sur un envoi.
const SEND_SLICE: Duration = Duration::from_millis(500);

/// Le producteur unique : déroule le plan d'animation et émet les
/// tâches dans la file bornée, ids strictement croissants depuis 0.
/// L'émetteur est lâché au retour — après la dernière frame de la
/// DERNIÈRE transition, jamais avant.
pub(crate) fn generate(shared: &Shared, tx: &flume::Sender<Task>) {
    log::info!("[coordinator] génération des tâches");
    let render = &shared.settings.render;
    let mut next_id = 0u64;

    for frame in FrameSequence::new(&shared.settings.transitions) {
        match shared.settings.granularity {
            Granularity::Row => {
                for row in 0..render.height {
                    let task = Task::for_row(
                        next_id,
                        frame.image_number,
                        frame.center_x,
                        frame.center_y,
                        frame.magnification,
                        row,
                        render.width,
                    );
                    if !emit(shared, tx, task) {
                        return;
                    }
                    next_id += 1;
                }
            }
            Granularity::Column => {
                for column in 0..render.width {
                    let task = Task::for_column(
                        next_id,
                        frame.image_number,
                        frame.center_x,
                        frame.center_y,
                        frame.magnification,
                        column,
                        render.height,
                    );
                    if !emit(shared, tx, task) {
                        return;
                    }
                    next_id += 1;
                }
            }
            Granularity::Image => {
                let task = Task::for_image(
                    next_id,
                    frame.image_number,
                    frame.center_x,
                    frame.center_y,
                    frame.magnification,
                    render.width,
                    render.height,
                );
                if !emit(shared, tx, task) {
                    return;
                }
                next_id += 1;
            }
        }
    }

    log::debug!("[coordinator] génération terminée, {next_id} tâches");
}

/// Envoi dans la file bornée. La contre-pression est le comportement
/// voulu ; l'attente se fait par tranches pour rester interruptible
/// par l'arrêt du run.
fn emit(shared: &Shared, tx: &flume::Sender<Task>, task: Task) -> bool {
    let mut task = task;
    loop {
        if shared.shutdown.load(Ordering::Relaxed) {
            log::warn!("[coordinator] génération interrompue par l'arrêt du run");
            return false;
        }
        match tx.send_timeout(task, SEND_SLICE) {
            Ok(()) => {
                shared.generated.fetch_add(1, Ordering::Relaxed);
                return true;
            }
            Err(flume::SendTimeoutError::Timeout(returned)) => task = returned,
            Err(flume::SendTimeoutError::Disconnected(_)) => {
                log::warn!("[coordinator] file des tâches fermée avant la fin de la génération");
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Shared, lock};
    use ms_core::settings::{CoordinatorSettings, TransitionSettings};
    use std::path::PathBuf;

    fn plan(granularity: Granularity, transitions: Vec<TransitionSettings>) -> CoordinatorSettings {
        let mut settings = CoordinatorSettings {
            run_name: "test".to_string(),
            granularity,
            transitions,
            ..CoordinatorSettings::default()
        };
        settings.render.width = 4;
        settings.render.height = 3;
        settings.normalize();
        settings
    }

    fn transition(start: f64, end: f64, step: f64) -> TransitionSettings {
        TransitionSettings {
            magnification_start: start,
            magnification_end: end,
            magnification_step: step,
            ..TransitionSettings::default()
        }
    }

    fn drain(shared: &Shared, tx: flume::Sender<Task>) -> Vec<Task> {
        generate(shared, &tx);
        drop(tx);
        lock(&shared.reclaim_tx).take();
        shared.pending_rx.try_iter().collect()
    }

    #[test]
    fn ids_are_monotonic_and_dense() {
        let settings = plan(Granularity::Row, vec![transition(1.0, 8.0, 2.0)]);
        let expected = settings.total_task_count();
        let (shared, tx) = Shared::new(settings, PathBuf::from("."));
        let tasks = drain(&shared, tx);

        assert_eq!(tasks.len() as u64, expected);
        for (k, task) in tasks.iter().enumerate() {
            assert_eq!(task.id, k as u64, "exactly one task per id");
        }
    }

    #[test]
    fn row_tasks_cover_each_frame_line_by_line() {
        let settings = plan(Granularity::Row, vec![transition(2.0, 2.0, 1.5)]);
        let (shared, tx) = Shared::new(settings, PathBuf::from("."));
        let tasks = drain(&shared, tx);

        assert_eq!(tasks.len(), 3, "one frame of three rows");
        for (row, task) in tasks.iter().enumerate() {
            assert_eq!(task.image_number, 0);
            assert_eq!(task.coordinates.len(), 4);
            assert!(task.coordinates.iter().all(|c| c.row == row as u32));
        }
    }

    #[test]
    fn image_granularity_emits_one_task_per_frame() {
        let settings = plan(Granularity::Image, vec![transition(1.0, 8.0, 2.0)]);
        let (shared, tx) = Shared::new(settings, PathBuf::from("."));
        let tasks = drain(&shared, tx);

        assert_eq!(tasks.len(), 3);
        let numbers: Vec<u32> = tasks.iter().map(|t| t.image_number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
        assert!(tasks.iter().all(|t| t.coordinates.len() == 12));
    }

    #[test]
    fn generation_spans_every_transition() {
        let settings = plan(
            Granularity::Image,
            vec![transition(1.0, 8.0, 2.0), transition(8.0, 1.0, 2.0)],
        );
        let (shared, tx) = Shared::new(settings, PathBuf::from("."));
        let tasks = drain(&shared, tx);

        // 3 frames de zoom avant + 3 de zoom arrière : la file ne se
        // ferme qu'après la dernière transition.
        assert_eq!(tasks.len(), 6);
        assert_eq!(tasks.last().map(|t| t.image_number), Some(5));
        assert_eq!(
            shared.generated.load(Ordering::Relaxed),
            shared.total_task_count
        );
    }
}
