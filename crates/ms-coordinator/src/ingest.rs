use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use ms_core::frame::FrameImage;

use crate::state::{Shared, lock};

/// Le consommateur unique : lit la file des résultats jusqu'à avoir
/// ingéré `total_task_count` tâches, assemble les frames, et écrit
/// chaque frame complète en JPEG dès qu'elle l'est — l'ordre
/// d'arrivée est quelconque.
///
/// En fin de flux, ferme la file des résultats et lâche le
/// producteur de réclamation : c'est ce qui délivre la sentinelle
/// aux workers suspendus dans GetTask.
///
/// # Errors
/// Toute erreur d'écriture de frame est fatale pour le run.
pub(crate) fn ingest(shared: &Shared) -> Result<()> {
    log::info!("[coordinator] ingestion des résultats");
    let render = &shared.settings.render;

    while shared.ingested.load(Ordering::Relaxed) < shared.total_task_count {
        let Ok(task) = shared.done_rx.recv() else {
            log::warn!("[coordinator] file des résultats fermée prématurément");
            break;
        };
        shared.ingested.fetch_add(1, Ordering::Relaxed);

        // La frame sort de la carte le temps des écritures : les
        // pixels se posent hors verrou, l'ingesteur est seul à
        // écrire.
        let mut frame = lock(&shared.book)
            .images
            .remove(&task.image_number)
            .unwrap_or_else(|| FrameImage::new(render.width, render.height));
        for result in &task.results {
            frame.write_pixel(result.column, result.row, result.color);
        }

        let complete = frame.is_complete();
        {
            let mut book = lock(&shared.book);
            if let Some(entry) = book.workers.get_mut(&task.worker_address) {
                entry.outstanding.remove(&task.id);
            }
            if !complete {
                book.images.insert(task.image_number, frame);
                continue;
            }
        }

        // Frame complète : encodage hors verrou, puis l'entrée
        // disparaît — elle ne sera jamais réécrite.
        write_frame(shared, task.image_number, &frame)?;
        shared.completed.fetch_add(1, Ordering::Relaxed);
    }

    lock(&shared.done_tx).take();
    lock(&shared.reclaim_tx).take();
    log::debug!(
        "[coordinator] ingestion terminée, {} tâches",
        shared.ingested.load(Ordering::Relaxed)
    );
    Ok(())
}

/// Chemin du fichier d'une frame : numéro zero-padded sur
/// `digit_count` chiffres.
pub(crate) fn frame_path(shared: &Shared, image_number: u32) -> PathBuf {
    shared.run_dir.join(format!(
        "{image_number:0width$}.jpg",
        width = shared.digit_count
    ))
}

fn write_frame(shared: &Shared, image_number: u32, frame: &FrameImage) -> Result<()> {
    let path = frame_path(shared, image_number);
    let file =
        File::create(&path).with_context(|| format!("création de {}", path.display()))?;
    let encoder = JpegEncoder::new(BufWriter::new(file));
    encoder
        .write_image(
            &frame.to_rgb(),
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )
        .with_context(|| format!("encodage de {}", path.display()))?;
    log::info!("[coordinator] image enregistrée: {}", path.display());
    Ok(())
}
