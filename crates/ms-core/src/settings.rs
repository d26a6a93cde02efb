use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::color::{PaletteRamp, Rgba};
use crate::error::SettingsError;
use crate::task::Granularity;

/// Adresse par défaut du coordinateur, partagée par les deux rôles.
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:51000";

/// Paramètres du rendu Mandelbrot. Immuables une fois le run lancé :
/// le coordinateur en est l'auteur, chaque worker en reçoit une copie
/// en lecture seule à l'enregistrement.
///
/// Les clés JSON sont en PascalCase (format hérité du fichier
/// d'origine), tous les champs sont optionnels et normalisés par
/// [`RenderSettings::normalize`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RenderSettings {
    /// Escape test value: a point escapes once x² + y² exceeds it.
    #[serde(default)]
    pub boundary: f64,
    /// Color of points that never escape.
    #[serde(default)]
    pub escape_color: Rgba,
    /// Gradient ramps that, when present, replace `palette`.
    #[serde(default)]
    pub generate_palette_settings: Vec<PaletteRamp>,
    /// Frame height in pixels.
    #[serde(default)]
    pub height: u32,
    /// Iteration cap per point.
    #[serde(default)]
    pub max_iterations: u32,
    /// Ordered cycle of colors indexed by escape time.
    #[serde(default)]
    pub palette: Vec<Rgba>,
    /// Blend adjacent palette entries using the fractional escape
    /// time. Meaningless (and forced off) with a single color.
    #[serde(default)]
    pub smooth_coloring: bool,
    /// N for NxN grid supersampling; 1 means one sample per pixel.
    #[serde(default)]
    pub super_sampling: u32,
    /// Frame width in pixels.
    #[serde(default)]
    pub width: u32,
}

impl RenderSettings {
    /// Applique les valeurs par défaut et corrige les champs
    /// incohérents. Idempotent.
    pub fn normalize(&mut self) {
        if self.boundary <= 0.0 {
            self.boundary = 100.0;
        }
        if self.escape_color.is_unset() {
            self.escape_color = Rgba::BLACK;
        }
        if !self.generate_palette_settings.is_empty() {
            self.palette = self
                .generate_palette_settings
                .iter()
                .flat_map(PaletteRamp::generate)
                .collect();
        }
        if self.height == 0 {
            self.height = 1080;
        }
        if self.max_iterations == 0 {
            self.max_iterations = 1000;
        }
        if self.palette.is_empty() {
            self.palette = vec![Rgba::WHITE];
        }
        if self.super_sampling < 1 {
            self.super_sampling = 1;
        }
        if self.width == 0 {
            self.width = 1920;
        }

        // Le lissage interpole entre deux entrées de palette.
        if self.palette.len() == 1 && self.smooth_coloring {
            self.smooth_coloring = false;
            log::info!("Palette d'une seule couleur : SmoothColoring désactivé.");
        }
    }

    /// Côté le plus court de l'image — dérivé, jamais persisté.
    #[must_use]
    pub fn shorter_side(&self) -> u32 {
        self.width.min(self.height)
    }

    /// Pixels par frame.
    #[must_use]
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Un segment d'animation : d'où on part, où on arrive, et comment
/// la magnification évolue entre les deux.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransitionSettings {
    /// Real-axis center at the start of the segment.
    #[serde(default)]
    pub start_x: f64,
    /// Imaginary-axis center at the start of the segment.
    #[serde(default)]
    pub start_y: f64,
    /// Real-axis center at the end of the segment.
    #[serde(default)]
    pub end_x: f64,
    /// Imaginary-axis center at the end of the segment.
    #[serde(default)]
    pub end_y: f64,
    /// Magnification of the first frame.
    #[serde(default)]
    pub magnification_start: f64,
    /// Magnification the segment tends toward.
    #[serde(default)]
    pub magnification_end: f64,
    /// Per-frame magnification factor, > 1.
    #[serde(default)]
    pub magnification_step: f64,
    /// Frames in this segment — derived by [`Self::normalize`],
    /// never read from the file.
    #[serde(skip)]
    pub frame_count: u32,
}

impl TransitionSettings {
    /// Corrige les bornes et dérive `frame_count`.
    pub fn normalize(&mut self) {
        self.start_x = self.start_x.clamp(-4.0, 4.0);
        self.start_y = self.start_y.clamp(-4.0, 4.0);
        self.end_x = self.end_x.clamp(-4.0, 4.0);
        self.end_y = self.end_y.clamp(-4.0, 4.0);
        if self.magnification_end <= 0.0 {
            self.magnification_end = 1.5;
        }
        if self.magnification_start <= 0.0 {
            self.magnification_start = 0.5;
        }
        if self.magnification_step <= 1.0 {
            self.magnification_step = 1.1;
        }
        self.frame_count = self.computed_frame_count();
    }

    /// True when the segment magnifies over time.
    #[must_use]
    pub fn is_zoom_in(&self) -> bool {
        self.magnification_start < self.magnification_end
    }

    /// True when the segment de-magnifies over time.
    #[must_use]
    pub fn is_zoom_out(&self) -> bool {
        self.magnification_start > self.magnification_end
    }

    /*
     * Nombre de frames par les logarithmes :
     *   magnification_start · step^n = magnification_end
     *   n = log(magnification_end) / log(step) − log(magnification_start)
     * Pour un zoom arrière les rôles de start et end s'échangent.
     */
    fn computed_frame_count(&self) -> u32 {
        let (low, high) = match self
            .magnification_start
            .partial_cmp(&self.magnification_end)
        {
            Some(Ordering::Less) => (self.magnification_start, self.magnification_end),
            Some(Ordering::Greater) => (self.magnification_end, self.magnification_start),
            // Magnification constante : une seule frame.
            _ => return 1,
        };
        let count = (high.ln() / self.magnification_step.ln() - low.ln()).ceil();
        if count >= 1.0 { count as u32 } else { 1 }
    }
}

/// Le plan d'animation complet du coordinateur.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CoordinatorSettings {
    /// Stitch the frames into movie.mp4 once the run completes.
    /// Downgraded to false when no encoder is on PATH.
    #[serde(default)]
    pub generate_movie: bool,
    /// Name of the run directory; defaults to a timestamp.
    #[serde(default)]
    pub run_name: String,
    /// Directory the run directory is created under.
    #[serde(default)]
    pub save_path: PathBuf,
    /// host:port the coordinator listens on.
    #[serde(default)]
    pub server_address: String,
    /// Dispatch unit: row, column, or whole image.
    #[serde(default, rename = "TaskGeneration")]
    pub granularity: Granularity,
    /// Animation segments, walked in order.
    #[serde(default, rename = "TransitionSettings")]
    pub transitions: Vec<TransitionSettings>,
    /// Shared render parameters.
    #[serde(default, rename = "MandelbrotSettings")]
    pub render: RenderSettings,
}

impl CoordinatorSettings {
    /// Charge et normalise le plan depuis un fichier JSON.
    ///
    /// # Errors
    /// Retourne [`SettingsError`] si le fichier est illisible ou si
    /// le JSON ne correspond pas au schéma.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let mut settings: Self = read_json(path)?;
        settings.normalize();
        log::debug!("Coordinator settings: {settings:?}");
        Ok(settings)
    }

    /// Applique les valeurs par défaut à tout le plan. Idempotent.
    pub fn normalize(&mut self) {
        self.render.normalize();
        if self.run_name.is_empty() {
            self.run_name = format!("run_{}", chrono::Local::now().format("%Y_%m_%d-%H_%M_%S"));
        }
        if self.save_path.as_os_str().is_empty() {
            self.save_path = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        }
        if self.server_address.is_empty() {
            self.server_address = DEFAULT_SERVER_ADDRESS.to_string();
        }
        if self.transitions.is_empty() {
            self.transitions.push(TransitionSettings {
                magnification_start: 0.5,
                magnification_end: 1.5,
                magnification_step: 1.1,
                ..TransitionSettings::default()
            });
        }
        for transition in &mut self.transitions {
            transition.normalize();
        }
    }

    /// Nombre total de frames du run. Requiert un plan normalisé.
    #[must_use]
    pub fn image_count(&self) -> u32 {
        self.transitions.iter().map(|t| t.frame_count).sum()
    }

    /// Nombre total de tâches que le générateur émettra.
    #[must_use]
    pub fn total_task_count(&self) -> u64 {
        u64::from(self.image_count())
            * self
                .granularity
                .tasks_per_frame(self.render.width, self.render.height)
    }

    /// Largeur du zero-padding des noms de frames :
    /// ⌊log₁₀(image_count)⌋ + 1.
    #[must_use]
    pub fn digit_count(&self) -> usize {
        let mut digits = 1;
        let mut n = self.image_count() / 10;
        while n > 0 {
            digits += 1;
            n /= 10;
        }
        digits
    }
}

/// Lit et désérialise un fichier JSON.
///
/// # Errors
/// Retourne [`SettingsError`] sur échec de lecture ou de parsing.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, SettingsError> {
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
