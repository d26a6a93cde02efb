use ms_core::color::{self, Rgba};
use ms_core::settings::RenderSettings;
use ms_core::task::Coordinate;

/// Le noyau fractal : de la coordonnée pixel à la couleur RGBA.
///
/// Pur et total — aucun échec possible sur des entrées finies. Le
/// worker instancie un évaluateur avec la copie des paramètres reçue
/// du coordinateur et lui passe chaque coordonnée. Les offsets de la
/// grille de sur-échantillonnage sont précalculés à la construction.
pub struct Mandelbrot {
    settings: RenderSettings,
    /// ln 2, factorisé hors de la correction de lissage.
    ln2: f64,
    /// Offsets (0.5 + k)/N − 0.5 pour k ∈ [0, N). [0] quand N = 1.
    offsets: Vec<f64>,
}

impl Mandelbrot {
    /// Construit l'évaluateur. Les settings doivent être normalisés
    /// (super_sampling ≥ 1, palette non vide).
    #[must_use]
    pub fn new(settings: RenderSettings) -> Self {
        let n = settings.super_sampling.max(1);
        let offsets = (0..n)
            .map(|k| (0.5 + f64::from(k)) / f64::from(n) - 0.5)
            .collect();
        Self {
            settings,
            ln2: 2.0_f64.ln(),
            offsets,
        }
    }

    /// Paramètres avec lesquels cet évaluateur a été construit.
    #[must_use]
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Les N² points du plan complexe à évaluer pour un pixel,
    /// colonne d'offsets externe, ligne interne.
    #[must_use]
    pub fn points_for(&self, coordinate: &Coordinate) -> Vec<(f64, f64)> {
        let mut points = Vec::with_capacity(self.offsets.len() * self.offsets.len());
        for dx in &self.offsets {
            for dy in &self.offsets {
                points.push(self.to_plane(coordinate, *dx, *dy));
            }
        }
        points
    }

    /*
     * Conversion du pixel (column, row) vers le point (x, y) du plan :
     * - les pixels sont indexés du coin haut-gauche, on recentre donc
     *   de la moitié de chaque dimension,
     * - la proportion de l'image est préservée en divisant par le
     *   côté court (à l'off-by-one près),
     * - la magnification multiplie le dénominateur.
     * L'axe y de l'image descend, d'où le signe de l'offset vertical.
     */
    fn to_plane(&self, c: &Coordinate, dx: f64, dy: f64) -> (f64, f64) {
        let scale = c.magnification * (f64::from(self.settings.shorter_side()) - 1.0);
        let x = c.center_x + (f64::from(c.column) - f64::from(self.settings.width) / 2.0 + dx) / scale;
        let y = c.center_y + (f64::from(c.row) - f64::from(self.settings.height) / 2.0 - dy) / scale;
        (x, y)
    }

    /// Temps d'évasion du point (x, y) : itère z ← z² + c en
    /// arithmétique réelle jusqu'à dépasser `boundary` ou atteindre
    /// `max_iterations`. Avec le lissage actif le compte est affiné
    /// en fractionnaire pour les points qui s'évadent.
    // La comparaison flottante est exacte à dessein : on cherche une
    // répétition stricte de l'orbite, pas une proximité.
    #[allow(clippy::float_cmp)]
    #[must_use]
    pub fn escape_time(&self, x: f64, y: f64) -> f64 {
        let max_iterations = f64::from(self.settings.max_iterations);
        let (mut x1, mut y1, mut x2, mut y2) = (0.0_f64, 0.0_f64, 0.0_f64, 0.0_f64);
        let mut iteration = 0.0_f64;

        // Détection de périodicité : une orbite qui repasse
        // exactement par un point déjà vu ne s'évadera jamais.
        let (mut old_x, mut old_y) = (0.0_f64, 0.0_f64);
        let mut period = 0u32;

        while x2 + y2 <= self.settings.boundary && iteration < max_iterations {
            y1 = 2.0 * x1 * y1 + y;
            x1 = x2 - y2 + x;
            x2 = x1 * x1;
            y2 = y1 * y1;
            iteration += 1.0;

            if x1 == old_x && y1 == old_y {
                iteration = max_iterations;
                break;
            }
            period += 1;
            if period > 20 {
                period = 0;
                old_x = x1;
                old_y = y1;
            }
        }

        // Compte d'itérations normalisé (coloration continue). x1, y1
        // viennent de franchir le rayon d'évasion : zn est positif et
        // fini, et un point non évadé ne passe jamais ici.
        if self.settings.smooth_coloring && iteration < max_iterations {
            let zn = (x2 + y2).ln() / 2.0;
            let nu = (zn / self.ln2).ln() / self.ln2;
            iteration = iteration + 1.0 - nu;
        }

        iteration
    }

    /// Couleur d'un compte d'itérations : couleur d'évasion pour un
    /// point resté dans l'ensemble, entrée de palette sinon, mélangée
    /// vers l'entrée suivante quand le lissage est actif.
    #[must_use]
    pub fn color_for(&self, iteration: f64) -> Rgba {
        let floor = iteration.floor() as u32;
        if floor >= self.settings.max_iterations {
            return self.settings.escape_color;
        }
        let palette = &self.settings.palette;
        let c1 = palette[floor as usize % palette.len()];
        if !self.settings.smooth_coloring {
            return c1;
        }
        let c2 = palette[(floor as usize + 1) % palette.len()];
        color::mix(c1, c2, iteration.fract())
    }

    /// Couleur finale d'un pixel : évalue les N² sous-pixels et
    /// moyenne les canaux. Pour N = 1 le résultat est identique au
    /// chemin mono-échantillon, bit pour bit.
    #[must_use]
    pub fn sample(&self, coordinate: &Coordinate) -> Rgba {
        let points = self.points_for(coordinate);
        let mut samples = Vec::with_capacity(points.len());
        for (x, y) in points {
            samples.push(self.color_for(self.escape_time(x, y)));
        }
        mean_color(&samples)
    }
}

/// Moyenne canal par canal en division entière tronquante, alpha
/// forcé à 255. C'est la moyenne du sur-échantillonnage — la
/// troncature est voulue, le chemin N = 1 doit rester bit-exact.
///
/// # Panics
/// Panique sur une tranche vide (jamais produite par le noyau).
#[must_use]
pub fn mean_color(samples: &[Rgba]) -> Rgba {
    assert!(!samples.is_empty(), "mean of no samples");
    let (mut r, mut g, mut b) = (0u32, 0u32, 0u32);
    for sample in samples {
        r += u32::from(sample.r);
        g += u32::from(sample.g);
        b += u32::from(sample.b);
    }
    let divisor = samples.len() as u32;
    Rgba {
        r: (r / divisor) as u8,
        g: (g / divisor) as u8,
        b: (b / divisor) as u8,
        a: 255,
    }
}
