use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::effects::VisualizationType;

const MIN_SCALE: f32 = 0.01;

/// Placement of one visualization: pixel offset from the frame center,
/// uniform scale and rotation in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformState {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub rotation: f32,
}

impl Default for TransformState {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl TransformState {
    pub const IDENTITY: TransformState = TransformState {
        x: 0.0,
        y: 0.0,
        scale: 1.0,
        rotation: 0.0,
    };

    /// Scale kept positive, rotation kept within [-180, 180].
    pub fn normalized(self) -> Self {
        let scale = if self.scale.is_finite() && self.scale > 0.0 {
            self.scale.max(MIN_SCALE)
        } else {
            1.0
        };
        Self {
            scale,
            rotation: self.rotation.clamp(-180.0, 180.0),
            ..self
        }
    }

    /// Fields set in `patch` replace ours; the rest are kept.
    pub fn merge(self, patch: &TransformPatch) -> Self {
        Self {
            x: patch.x.unwrap_or(self.x),
            y: patch.y.unwrap_or(self.y),
            scale: patch.scale.unwrap_or(self.scale),
            rotation: patch.rotation.unwrap_or(self.rotation),
        }
        .normalized()
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformPatch {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub scale: Option<f32>,
    pub rotation: Option<f32>,
}

impl From<TransformState> for TransformPatch {
    fn from(t: TransformState) -> Self {
        Self {
            x: Some(t.x),
            y: Some(t.y),
            scale: Some(t.scale),
            rotation: Some(t.rotation),
        }
    }
}

/// A visualization type together with its placement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisualEffectSpec {
    pub kind: VisualizationType,
    pub transform: TransformState,
}

/// Per-type placements. Entries are created on first configuration and
/// outlive selection changes. Updates swap in a new map, so a snapshot held
/// by a render in progress never changes underneath it.
#[derive(Clone, Debug, Default)]
pub struct TransformRig {
    entries: Arc<HashMap<VisualizationType, TransformState>>,
}

impl TransformRig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity when the type was never configured.
    pub fn get(&self, kind: VisualizationType) -> TransformState {
        self.entries.get(&kind).copied().unwrap_or_default()
    }

    pub fn set_transform(&mut self, kind: VisualizationType, patch: &TransformPatch) -> TransformState {
        let merged = self.get(kind).merge(patch);
        Arc::make_mut(&mut self.entries).insert(kind, merged);
        merged
    }

    pub fn reset_transform(&mut self, kind: VisualizationType) {
        if self.entries.contains_key(&kind) {
            Arc::make_mut(&mut self.entries).insert(kind, TransformState::IDENTITY);
        }
    }

    pub fn snapshot(&self) -> Arc<HashMap<VisualizationType, TransformState>> {
        Arc::clone(&self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_unspecified_fields() {
        let base = TransformState {
            x: 1.0,
            y: 2.0,
            scale: 1.0,
            rotation: 0.0,
        };
        let patch = TransformPatch {
            scale: Some(2.0),
            ..Default::default()
        };
        assert_eq!(
            base.merge(&patch),
            TransformState {
                x: 1.0,
                y: 2.0,
                scale: 2.0,
                rotation: 0.0
            }
        );
    }

    #[test]
    fn merge_normalizes_scale_and_rotation() {
        let patch = TransformPatch {
            scale: Some(-3.0),
            rotation: Some(270.0),
            ..Default::default()
        };
        let t = TransformState::IDENTITY.merge(&patch);
        assert_eq!(t.scale, 1.0);
        assert_eq!(t.rotation, 180.0);
    }

    #[test]
    fn snapshots_are_not_mutated_by_later_updates() {
        let mut rig = TransformRig::new();
        rig.set_transform(VisualizationType::Fusion, &TransformPatch { x: Some(5.0), ..Default::default() });
        let before = rig.snapshot();
        rig.set_transform(VisualizationType::Fusion, &TransformPatch { x: Some(9.0), ..Default::default() });
        assert_eq!(before[&VisualizationType::Fusion].x, 5.0);
        assert_eq!(rig.get(VisualizationType::Fusion).x, 9.0);
    }

    #[test]
    fn reset_restores_identity() {
        let mut rig = TransformRig::new();
        rig.set_transform(
            VisualizationType::Monstercat,
            &TransformPatch { rotation: Some(45.0), ..Default::default() },
        );
        rig.reset_transform(VisualizationType::Monstercat);
        assert!(rig.get(VisualizationType::Monstercat).is_identity());
    }
}
