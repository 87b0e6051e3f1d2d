//! Transformation kinds and their input constraints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MorphoError;

/// The transformation a client is asking for.
///
/// Each kind selects one fallback chain and one set of input constraints;
/// the set is closed and a kind never changes meaning between releases
/// (clients hard-code these wire names).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformationKind {
    FaceSwapImage,
    FaceSwapVideo,
    Cartoon,
    Memoji,
    AnimalToon,
    MuscleEnhance,
    ArtStyle,
    HdUpscale,
    RestoreOldPhoto,
}

/// Output media class of a kind; selects vendor media handling and the
/// default timeout class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaClass {
    Image,
    Video,
}

impl TransformationKind {
    /// Every kind, in a stable order.
    pub const ALL: [TransformationKind; 9] = [
        TransformationKind::FaceSwapImage,
        TransformationKind::FaceSwapVideo,
        TransformationKind::Cartoon,
        TransformationKind::Memoji,
        TransformationKind::AnimalToon,
        TransformationKind::MuscleEnhance,
        TransformationKind::ArtStyle,
        TransformationKind::HdUpscale,
        TransformationKind::RestoreOldPhoto,
    ];

    /// Wire name used in routes, config tables and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformationKind::FaceSwapImage => "face-swap-image",
            TransformationKind::FaceSwapVideo => "face-swap-video",
            TransformationKind::Cartoon => "cartoon",
            TransformationKind::Memoji => "memoji",
            TransformationKind::AnimalToon => "animal-toon",
            TransformationKind::MuscleEnhance => "muscle-enhance",
            TransformationKind::ArtStyle => "art-style",
            TransformationKind::HdUpscale => "hd-upscale",
            TransformationKind::RestoreOldPhoto => "restore-old-photo",
        }
    }

    pub fn media_class(&self) -> MediaClass {
        match self {
            TransformationKind::FaceSwapVideo => MediaClass::Video,
            _ => MediaClass::Image,
        }
    }

    /// Face-swap kinds compose a source face onto a target and need both
    /// inputs; every other kind transforms a single input.
    pub fn requires_target(&self) -> bool {
        matches!(
            self,
            TransformationKind::FaceSwapImage | TransformationKind::FaceSwapVideo
        )
    }
}

impl fmt::Display for TransformationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformationKind {
    type Err = MorphoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransformationKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| MorphoError::InvalidInput(format!("unknown transformation kind: {s}")))
    }
}
