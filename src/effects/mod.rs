//! Transform capability and the built-in effect set
//!
//! A [`Transform`] is a pure `Frame -> Frame` function. The pipeline engine
//! never looks inside one; it only needs [`Transform::kind`] to mirror the
//! topology onto a remote endpoint.

pub mod color;
pub mod geometry;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::frame::Frame;

pub use color::{Grayscale, Negative, Sepia, Xray};
pub use geometry::{BoxBlur, HorizontalFlip, VerticalFlip};

/// Stateless frame transform.
///
/// `apply` must not block and must not retain `frame` after returning.
pub trait Transform: Send + Sync + fmt::Debug {
    fn apply(&self, frame: Frame) -> Frame;

    /// Tag used to look up the remote configuration call.
    fn kind(&self) -> EffectKind;

    /// Display label.
    fn label(&self) -> &'static str {
        self.kind().label()
    }
}

/// Shared handle to a transform; replicas of a pipeline share one instance.
pub type SharedTransform = Arc<dyn Transform>;

/// Every effect the editor knows about, local implementation or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Blur,
    ColorSaturation,
    Drawing,
    EdgeDetection,
    GradientMagnitude,
    Grayscale,
    HorizontalFlip,
    HoughCircle,
    HoughLine,
    Identity,
    MotionHistory,
    Negative,
    SeamCarve,
    Sepia,
    VerticalFlip,
    Xray,
}

impl EffectKind {
    pub const ALL: [EffectKind; 16] = [
        EffectKind::Blur,
        EffectKind::ColorSaturation,
        EffectKind::Drawing,
        EffectKind::EdgeDetection,
        EffectKind::GradientMagnitude,
        EffectKind::Grayscale,
        EffectKind::HorizontalFlip,
        EffectKind::HoughCircle,
        EffectKind::HoughLine,
        EffectKind::Identity,
        EffectKind::MotionHistory,
        EffectKind::Negative,
        EffectKind::SeamCarve,
        EffectKind::Sepia,
        EffectKind::VerticalFlip,
        EffectKind::Xray,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            EffectKind::Blur => "Blur",
            EffectKind::ColorSaturation => "Color Saturation",
            EffectKind::Drawing => "Drawing",
            EffectKind::EdgeDetection => "Edge Detection",
            EffectKind::GradientMagnitude => "Gradient Magnitude",
            EffectKind::Grayscale => "Grayscale",
            EffectKind::HorizontalFlip => "Horizontal Flip",
            EffectKind::HoughCircle => "Hough Circle",
            EffectKind::HoughLine => "Hough Line",
            EffectKind::Identity => "Identity",
            EffectKind::MotionHistory => "Motion History",
            EffectKind::Negative => "Negative",
            EffectKind::SeamCarve => "Seam Carve",
            EffectKind::Sepia => "Sepia",
            EffectKind::VerticalFlip => "Vertical Flip",
            EffectKind::Xray => "X-ray",
        }
    }

    /// Name of the remote configuration call for this kind.
    ///
    /// Identity has none: the remote side starts out as a pass-through.
    pub const fn remote_name(self) -> Option<&'static str> {
        match self {
            EffectKind::Identity => None,
            EffectKind::Blur => Some("add_blur_effect"),
            EffectKind::ColorSaturation => Some("add_color_saturation_effect"),
            EffectKind::Drawing => Some("add_drawing_effect"),
            EffectKind::EdgeDetection => Some("add_edge_detection_effect"),
            EffectKind::GradientMagnitude => Some("add_gradient_magnitude_effect"),
            EffectKind::Grayscale => Some("add_grayscale_effect"),
            EffectKind::HorizontalFlip => Some("add_horizontal_flip_effect"),
            EffectKind::HoughCircle => Some("add_hough_circle_effect"),
            EffectKind::HoughLine => Some("add_hough_line_effect"),
            EffectKind::MotionHistory => Some("add_motion_history_effect"),
            EffectKind::Negative => Some("add_negative_effect"),
            EffectKind::SeamCarve => Some("add_seam_carve_effect"),
            EffectKind::Sepia => Some("add_sepia_effect"),
            EffectKind::VerticalFlip => Some("add_vertical_flip_effect"),
            EffectKind::Xray => Some("add_xray_effect"),
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EffectKind {
    type Err = String;

    /// Accepts either the snake_case config name or the display label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        EffectKind::ALL
            .into_iter()
            .find(|kind| {
                let label = kind.label().to_ascii_lowercase().replace(['-', ' '], "_");
                let snake = format!("{kind:?}").to_ascii_lowercase();
                wanted == label || wanted == snake || wanted.replace('_', "") == snake
            })
            .ok_or_else(|| s.to_string())
    }
}

/// Pass-through. Also installed as the placeholder stage of an empty pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl Transform for Identity {
    fn apply(&self, frame: Frame) -> Frame {
        frame
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Identity
    }
}

/// Build the local implementation of `kind`, if there is one.
pub fn from_kind(kind: EffectKind) -> Option<SharedTransform> {
    let transform: SharedTransform = match kind {
        EffectKind::Identity => Arc::new(Identity),
        EffectKind::Grayscale => Arc::new(Grayscale),
        EffectKind::Negative => Arc::new(Negative),
        EffectKind::Sepia => Arc::new(Sepia),
        EffectKind::Xray => Arc::new(Xray),
        EffectKind::HorizontalFlip => Arc::new(HorizontalFlip),
        EffectKind::VerticalFlip => Arc::new(VerticalFlip),
        EffectKind::Blur => Arc::new(BoxBlur),
        _ => return None,
    };
    Some(transform)
}
