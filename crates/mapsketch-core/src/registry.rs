//! Per-layer interaction registry and the policy that enables interactions.

use crate::bus::AllowInteractions;
use crate::feature::FeatureUid;
use crate::layer::LayerId;
use serde::{Deserialize, Serialize};

/// What the user is currently doing on the map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    #[default]
    None,
    Draw,
    Edit,
    Move,
    Delete,
}

impl Activity {
    /// Activities that keep an attribute-editor selection alive.
    pub fn holds_selection(self) -> bool {
        matches!(self, Activity::Edit | Activity::Move)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Select,
    Translate,
    Modify,
}

/// Inputs the enablement policy is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyState {
    pub activity: Activity,
    /// The owning plugin window is shown.
    pub window_visible: bool,
    pub modify_enabled: bool,
    pub translate_enabled: bool,
    /// Another surface holds exclusive map control.
    pub suspended: bool,
}

impl Default for PolicyState {
    fn default() -> Self {
        Self {
            activity: Activity::None,
            window_visible: false,
            modify_enabled: true,
            translate_enabled: true,
            suspended: false,
        }
    }
}

/// Active flags for the three interactions of one layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InteractionFlags {
    pub select: bool,
    pub translate: bool,
    pub modify: bool,
}

impl InteractionFlags {
    pub fn get(&self, kind: InteractionKind) -> bool {
        match kind {
            InteractionKind::Select => self.select,
            InteractionKind::Translate => self.translate,
            InteractionKind::Modify => self.modify,
        }
    }
}

/// A flip of one interaction's active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionChange {
    pub layer: LayerId,
    pub kind: InteractionKind,
    pub active: bool,
}

/// Interactions bound to one attached layer, sharing one feature collection.
#[derive(Debug, Clone)]
pub struct InteractionBundle {
    pub layer: LayerId,
    pub allow: AllowInteractions,
    /// Attribute service backing the layer, if any.
    pub service_id: Option<String>,
    /// Vertex editing permitted by the layer's schema.
    pub node_editing: bool,
    active: InteractionFlags,
    /// Features the interactions currently operate on.
    pub features: Vec<FeatureUid>,
    cleaned_up: bool,
}

impl InteractionBundle {
    pub fn new(layer: LayerId, allow: AllowInteractions, service_id: Option<String>) -> Self {
        Self {
            layer,
            allow,
            service_id,
            node_editing: true,
            active: InteractionFlags::default(),
            features: Vec::new(),
            cleaned_up: false,
        }
    }

    pub fn active(&self) -> InteractionFlags {
        self.active
    }

    /// What the policy wants for this layer.
    pub fn desired(&self, policy: &PolicyState) -> InteractionFlags {
        if policy.suspended {
            return InteractionFlags::default();
        }
        InteractionFlags {
            select: policy.window_visible && self.allow.select,
            translate: policy.activity == Activity::Move && policy.translate_enabled && self.allow.translate,
            modify: policy.activity == Activity::Edit
                && policy.modify_enabled
                && self.allow.modify
                && self.node_editing,
        }
    }

    /// Move to `target`, returning the interactions that flipped.
    fn apply(&mut self, target: InteractionFlags) -> Vec<InteractionChange> {
        let changes = [InteractionKind::Select, InteractionKind::Translate, InteractionKind::Modify]
            .into_iter()
            .filter(|&kind| self.active.get(kind) != target.get(kind))
            .map(|kind| InteractionChange {
                layer: self.layer,
                kind,
                active: target.get(kind),
            })
            .collect();
        self.active = target;
        changes
    }

    /// Deactivate everything and drop the collection. Safe to repeat.
    pub fn cleanup(&mut self) -> bool {
        if self.cleaned_up {
            return false;
        }
        self.active = InteractionFlags::default();
        self.features.clear();
        self.cleaned_up = true;
        true
    }
}

/// Attached layers in attach order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<InteractionBundle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a layer. Returns false if it is already registered.
    pub fn attach(&mut self, layer: LayerId, allow: AllowInteractions, service_id: Option<String>) -> bool {
        if self.contains(layer) {
            return false;
        }
        log::debug!("registry: attached layer {}", layer);
        self.entries.push(InteractionBundle::new(layer, allow, service_id));
        true
    }

    /// Detach a layer after running its cleanup.
    pub fn detach(&mut self, layer: LayerId) -> Option<InteractionBundle> {
        let pos = self.entries.iter().position(|e| e.layer == layer)?;
        let mut entry = self.entries.remove(pos);
        entry.cleanup();
        log::debug!("registry: detached layer {}", layer);
        Some(entry)
    }

    pub fn contains(&self, layer: LayerId) -> bool {
        self.entries.iter().any(|e| e.layer == layer)
    }

    pub fn get(&self, layer: LayerId) -> Option<&InteractionBundle> {
        self.entries.iter().find(|e| e.layer == layer)
    }

    pub fn get_mut(&mut self, layer: LayerId) -> Option<&mut InteractionBundle> {
        self.entries.iter_mut().find(|e| e.layer == layer)
    }

    pub fn entries(&self) -> &[InteractionBundle] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [InteractionBundle] {
        &mut self.entries
    }

    pub fn layers(&self) -> Vec<LayerId> {
        self.entries.iter().map(|e| e.layer).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bring every entry in line with the policy, returning what changed.
    pub fn apply_policy(&mut self, policy: &PolicyState) -> Vec<InteractionChange> {
        let changes: Vec<InteractionChange> = self
            .entries
            .iter_mut()
            .flat_map(|e| {
                let target = e.desired(policy);
                e.apply(target)
            })
            .collect();
        if !changes.is_empty() {
            log::debug!("registry: policy flipped {} interaction(s)", changes.len());
        }
        changes
    }

    /// Deactivate modify everywhere without touching the others.
    pub fn suspend_modify(&mut self) -> Vec<InteractionChange> {
        self.entries
            .iter_mut()
            .flat_map(|e| {
                let target = InteractionFlags {
                    modify: false,
                    ..e.active
                };
                e.apply(target)
            })
            .collect()
    }

    /// Run every cleanup and empty the registry.
    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            entry.cleanup();
        }
        self.entries.clear();
    }
}
