/// Shared types for the mandelswarm workspace.
///
/// This crate contains everything both sides of the wire agree on:
/// the settings model, the task model, colors, easing, the per-frame
/// animation walk, and the frame-assembly buffer.

pub mod color;
pub mod ease;
pub mod error;
pub mod frame;
pub mod plan;
pub mod settings;
pub mod task;

pub use color::Rgba;
pub use error::SettingsError;
pub use frame::FrameImage;
pub use plan::{FrameDescriptor, FrameSequence};
pub use settings::{CoordinatorSettings, RenderSettings, TransitionSettings};
pub use task::{Coordinate, Granularity, PixelResult, Task};
