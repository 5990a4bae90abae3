pub mod transform;

use std::sync::Arc;

pub use transform::{TransformPatch, TransformRig, TransformState, VisualEffectSpec};

use crate::effects::{DrawParams, EffectRegistry, VisualizationType};
use crate::render::Canvas;

/// Which visualizations are drawn each tick.
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    Single(VisualizationType),
    /// Drawn in insertion order, first entry at the bottom.
    Multi(Arc<Vec<VisualizationType>>),
}

impl Default for Selection {
    fn default() -> Self {
        Self::Single(VisualizationType::Monstercat)
    }
}

/// Resolves the active visualizations and draws each one under its own
/// placement transform.
pub struct CompositeScene {
    registry: EffectRegistry,
    rig: TransformRig,
    selection: Selection,
    /// Type drawn when leaving multi-select mode.
    primary: VisualizationType,
}

impl CompositeScene {
    pub fn new(registry: EffectRegistry) -> Self {
        let selection = Selection::default();
        let primary = match &selection {
            Selection::Single(kind) => *kind,
            Selection::Multi(_) => VisualizationType::Monstercat,
        };
        Self {
            registry,
            rig: TransformRig::new(),
            selection,
            primary,
        }
    }

    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    pub fn rig(&self) -> &TransformRig {
        &self.rig
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Single-select mode drawing `kind`.
    pub fn select(&mut self, kind: VisualizationType) {
        self.primary = kind;
        self.selection = Selection::Single(kind);
    }

    pub fn set_multi(&mut self, enabled: bool) {
        self.selection = match (enabled, &self.selection) {
            (true, Selection::Single(kind)) => Selection::Multi(Arc::new(vec![*kind])),
            (false, Selection::Multi(_)) => Selection::Single(self.primary),
            (_, current) => current.clone(),
        };
    }

    pub fn is_multi(&self) -> bool {
        matches!(self.selection, Selection::Multi(_))
    }

    /// In multi-select mode, add `kind` on top or remove it. Returns whether
    /// it is selected afterwards. In single mode it becomes the one selection.
    pub fn toggle(&mut self, kind: VisualizationType) -> bool {
        match &self.selection {
            Selection::Single(_) => {
                self.select(kind);
                true
            }
            Selection::Multi(kinds) => {
                let mut next = kinds.as_ref().clone();
                let selected = match next.iter().position(|k| *k == kind) {
                    Some(pos) => {
                        next.remove(pos);
                        false
                    }
                    None => {
                        next.push(kind);
                        true
                    }
                };
                self.selection = Selection::Multi(Arc::new(next));
                selected
            }
        }
    }

    /// Replace the multi-select set wholesale, dropping duplicates.
    pub fn set_selected(&mut self, kinds: &[VisualizationType]) {
        let mut unique = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !unique.contains(kind) {
                unique.push(*kind);
            }
        }
        if let Some(first) = unique.first() {
            self.primary = *first;
        }
        self.selection = Selection::Multi(Arc::new(unique));
    }

    pub fn set_transform(&mut self, kind: VisualizationType, patch: &TransformPatch) -> TransformState {
        self.rig.set_transform(kind, patch)
    }

    pub fn reset_transform(&mut self, kind: VisualizationType) {
        self.rig.reset_transform(kind);
    }

    /// Active types in draw order.
    pub fn active(&self) -> Vec<VisualizationType> {
        match &self.selection {
            Selection::Single(kind) => vec![*kind],
            Selection::Multi(kinds) => kinds.as_ref().clone(),
        }
    }

    pub fn effect_specs(&self) -> Vec<VisualEffectSpec> {
        self.active()
            .into_iter()
            .map(|kind| VisualEffectSpec {
                kind,
                transform: self.rig.get(kind),
            })
            .collect()
    }

    /// Draw every active visualization bottom to top.
    pub fn render(&self, canvas: &mut Canvas, params: &DrawParams) {
        let (cx, cy) = (params.width / 2.0, params.height / 2.0);
        for spec in self.effect_specs() {
            let Some(renderer) = self.registry.get(spec.kind) else {
                log::debug!("No renderer registered for {}", spec.kind);
                continue;
            };
            canvas.save();
            if renderer.honors_transform() && !spec.transform.is_identity() {
                let t = spec.transform;
                canvas.translate(cx + t.x, cy + t.y);
                canvas.rotate(t.rotation);
                canvas.scale(t.scale, t.scale);
                canvas.translate(-cx, -cy);
            }
            renderer.draw(canvas, params);
            canvas.restore();
        }
    }
}
