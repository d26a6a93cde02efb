use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// Cadence du film assemblé.
const FRAME_RATE: u32 = 30;

/// True si un encodeur ffmpeg répond sur le PATH. Sondé à la
/// validation : sans encodeur, GenerateMovie est rétrogradé.
pub(crate) fn encoder_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Assemble les frames du dossier de run en movie.mp4 : motif
/// d'entrée numérique zero-padded, H.264, format de pixel compatible
/// avec les lecteurs courants.
///
/// # Errors
/// Retourne une erreur si ffmpeg ne démarre pas ou se termine en
/// échec — l'appelant journalise, le run reste un succès.
pub(crate) fn encode_movie(run_dir: &Path, digit_count: usize) -> Result<()> {
    let pattern = format!("%0{digit_count}d.jpg");
    log::info!("[coordinator] assemblage de movie.mp4 ({pattern})");

    let status = Command::new("ffmpeg")
        .current_dir(run_dir)
        .arg("-y")
        .args(["-framerate", &FRAME_RATE.to_string()])
        .args(["-start_number", "0"])
        .args(["-i", &pattern])
        .args(["-c:v", "libx264"])
        .args(["-pix_fmt", "yuv420p"])
        .args(["-hide_banner", "-loglevel", "error"])
        .arg("movie.mp4")
        .stdin(Stdio::null())
        .status()
        .context("lancement de ffmpeg")?;

    if !status.success() {
        anyhow::bail!("ffmpeg s'est terminé avec {status}");
    }
    Ok(())
}
