use crate::ease::{ease_in_expo, ease_out_expo, lerp};
use crate::settings::TransitionSettings;

/// Où une frame est centrée et à quelle magnification.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameDescriptor {
    /// Output frame number, 0-based, global across transitions.
    pub image_number: u32,
    /// Real-axis center.
    pub center_x: f64,
    /// Imaginary-axis center.
    pub center_y: f64,
    /// Magnification of this frame.
    pub magnification: f64,
}

/// Parcourt les transitions dans l'ordre et produit le centre et la
/// magnification de chaque frame du run.
///
/// L'ordre des mises à jour par frame suit la sémantique « première
/// frame à magnification_start » dans les deux sens : un zoom arrière
/// applique centre et magnification AVANT d'émettre la frame, un zoom
/// avant les applique APRÈS. Le recentrage est interpolé avec un
/// easing exponentiel — sortant en zoom avant, entrant en zoom
/// arrière.
///
/// Les transitions doivent être normalisées (frame_count dérivé).
pub struct FrameSequence<'a> {
    transitions: &'a [TransitionSettings],
    index: usize,
    current_frame: u32,
    center_x: f64,
    center_y: f64,
    magnification: f64,
    image_number: u32,
}

impl<'a> FrameSequence<'a> {
    /// Démarre le parcours sur la première transition.
    #[must_use]
    pub fn new(transitions: &'a [TransitionSettings]) -> Self {
        let (center_x, center_y, magnification) = transitions
            .first()
            .map_or((0.0, 0.0, 1.0), |t| {
                (t.start_x, t.start_y, t.magnification_start)
            });
        Self {
            transitions,
            index: 0,
            current_frame: 1,
            center_x,
            center_y,
            magnification,
            image_number: 0,
        }
    }
}

impl Iterator for FrameSequence<'_> {
    type Item = FrameDescriptor;

    fn next(&mut self) -> Option<FrameDescriptor> {
        let transition = self.transitions.get(self.index)?;
        debug_assert!(transition.frame_count > 0, "transition not normalized");
        let t = f64::from(self.current_frame) / f64::from(transition.frame_count);

        if transition.is_zoom_out() {
            self.center_x = lerp(transition.start_x, transition.end_x, ease_in_expo(t));
            self.center_y = lerp(transition.start_y, transition.end_y, ease_in_expo(t));
            self.magnification /= transition.magnification_step;
        }

        let frame = FrameDescriptor {
            image_number: self.image_number,
            center_x: self.center_x,
            center_y: self.center_y,
            magnification: self.magnification,
        };

        if transition.is_zoom_in() {
            self.center_x = lerp(transition.start_x, transition.end_x, ease_out_expo(t));
            self.center_y = lerp(transition.start_y, transition.end_y, ease_out_expo(t));
            self.magnification *= transition.magnification_step;
        }

        self.image_number += 1;
        self.current_frame += 1;
        if self.current_frame > transition.frame_count {
            // Transition suivante : on repart de son point de départ.
            self.index += 1;
            self.current_frame = 1;
            if let Some(next) = self.transitions.get(self.index) {
                self.center_x = next.start_x;
                self.center_y = next.start_y;
                self.magnification = next.magnification_start;
            }
        }

        Some(frame)
    }
}
