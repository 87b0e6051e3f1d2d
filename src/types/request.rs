//! Transformation request types.

use serde::{Deserialize, Serialize};

use crate::error::{MorphoError, Result};
use crate::types::identity::Requester;
use crate::types::input::MediaInput;
use crate::types::kind::{MediaClass, TransformationKind};

/// Kind-specific tuning parameters. All optional; providers ignore the
/// ones that do not apply to them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformParams {
    /// Effect strength in `0.0..=1.0` (e.g. muscle enhancement).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f32>,

    /// Named style preset (e.g. an art-style name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,

    /// Template asset reference from the content store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// One validated transformation request. Built per incoming call and
/// dropped with it; nothing here is persisted.
#[derive(Debug, Clone)]
pub struct TransformationRequest {
    pub kind: TransformationKind,
    pub requester: Requester,
    /// Primary input; for face-swap kinds this is the face to transplant.
    pub source: MediaInput,
    /// Swap target. Present exactly when the kind requires it.
    pub target: Option<MediaInput>,
    pub params: TransformParams,
    /// Client idempotency key for duplicate/late polls.
    pub request_id: Option<String>,
}

impl TransformationRequest {
    /// Validate raw client inputs into a request.
    ///
    /// Face-swap kinds need a source face (always an image) and a target
    /// in the kind's media class; every other kind takes one input and a
    /// target, if supplied, is ignored.
    pub fn new(
        kind: TransformationKind,
        requester: Requester,
        source: &str,
        target: Option<&str>,
        params: TransformParams,
        request_id: Option<String>,
    ) -> Result<Self> {
        if let Some(intensity) = params.intensity {
            if !(0.0..=1.0).contains(&intensity) {
                return Err(MorphoError::InvalidInput(format!(
                    "intensity must be within 0.0..=1.0, got {intensity}"
                )));
            }
        }

        let source = MediaInput::parse(source, MediaClass::Image)?;
        let target = if kind.requires_target() {
            let raw = target.ok_or_else(|| {
                MorphoError::InvalidInput(format!("{kind} requires a target input"))
            })?;
            Some(MediaInput::parse(raw, kind.media_class())?)
        } else {
            None
        };

        Ok(TransformationRequest {
            kind,
            requester,
            source,
            target,
            params,
            request_id,
        })
    }
}
