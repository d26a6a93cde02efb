use serde::{Deserialize, Serialize};

/// Couleur RGBA, un byte par canal.
///
/// Sur le fichier de configuration JSON les champs s'appellent
/// `R`, `G`, `B`, `A` (format hérité du fichier d'origine).
///
/// # Example
/// ```
/// use ms_core::color::Rgba;
/// let c: Rgba = serde_json::from_str(r#"{"R":255,"G":0,"B":0,"A":255}"#).unwrap();
/// assert_eq!(c, Rgba::new(255, 0, 0, 255));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct Rgba {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel. Computed pixels always carry 255.
    pub a: u8,
}

impl Rgba {
    /// Opaque white — the fallback palette.
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 255);
    /// Opaque black — the fallback escape color.
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);

    /// Construit une couleur à partir des quatre canaux.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// True when all four channels are zero (the serde default).
    #[must_use]
    pub const fn is_unset(self) -> bool {
        self.r == 0 && self.g == 0 && self.b == 0 && self.a == 0
    }
}

/// Interpolation linéaire tronquante entre deux canaux.
///
/// La fraction est appliquée en f64 puis tronquée vers u8, comme la
/// division entière du moyennage de sur-échantillonnage.
///
/// # Example
/// ```
/// use ms_core::color::lerp_channel;
/// assert_eq!(lerp_channel(0, 10, 0.2), 2);
/// assert_eq!(lerp_channel(0, 10, 0.19), 1);
/// ```
#[must_use]
pub fn lerp_channel(v1: u8, v2: u8, fraction: f64) -> u8 {
    (f64::from(v1) + (f64::from(v2) - f64::from(v1)) * fraction) as u8
}

/// Mélange deux couleurs canal par canal. L'alpha est forcé à 255.
///
/// # Example
/// ```
/// use ms_core::color::{mix, Rgba};
/// let c = mix(Rgba::new(0, 0, 0, 255), Rgba::new(100, 100, 100, 255), 0.5);
/// assert_eq!(c, Rgba::new(50, 50, 50, 255));
/// ```
#[must_use]
pub fn mix(c1: Rgba, c2: Rgba, fraction: f64) -> Rgba {
    Rgba {
        r: lerp_channel(c1.r, c2.r, fraction),
        g: lerp_channel(c1.g, c2.g, fraction),
        b: lerp_channel(c1.b, c2.b, fraction),
        a: 255,
    }
}

/// Un segment de dégradé du fichier de configuration
/// (`GeneratePaletteSettings`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaletteRamp {
    /// First color of the ramp.
    pub start_color: Rgba,
    /// Last color the ramp tends toward (never quite reached).
    pub end_color: Rgba,
    /// Number of samples contributed by this ramp.
    pub number_colors: u32,
}

impl PaletteRamp {
    /// Échantillonne `number_colors` couleurs de `start_color` vers
    /// `end_color`. La fraction du pas j est j / number_colors, donc
    /// `end_color` n'est jamais atteinte — le segment suivant
    /// enchaîne sans doublon. L'alpha est forcé à 255.
    #[must_use]
    pub fn generate(&self) -> Vec<Rgba> {
        let mut palette = Vec::with_capacity(self.number_colors as usize);
        for j in 0..self.number_colors {
            let fraction = f64::from(j) / f64::from(self.number_colors);
            palette.push(Rgba {
                r: lerp_channel(self.start_color.r, self.end_color.r, fraction),
                g: lerp_channel(self.start_color.g, self.end_color.g, fraction),
                b: lerp_channel(self.start_color.b, self.end_color.b, fraction),
                a: 255,
            });
        }
        palette
    }
}
