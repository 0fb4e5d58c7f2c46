//! Keeps map interactions on attribute-editor layers in step with the
//! attribute editor, by canonical id, over the event bus.
//!
//! Incoming bus messages are queued by the bus subscriptions and applied
//! by [`Synchronizer::process`]; everything this side wants to say goes to
//! an outgoing queue the host drains with [`Synchronizer::take_outgoing`].

use crate::bus::{AllowInteractions, BusMessage, EventBus, LayerSchema, SOURCE_MAP, SelectMode, SubscriptionId, Topic};
use crate::feature::{Feature, FeatureUid, props};
use crate::geometry::{Geometry, combined_bounds};
use crate::identity::{AttributeSnapshot, CanonicalId};
use crate::input::{MapEvent, Modifiers};
use crate::layer::{LayerId, MapModel, VectorLayer};
use crate::registry::{Activity, InteractionChange, InteractionKind, PolicyState, Registry};
use crate::selection::{EditKind, EditSnapshot, Selection, bearing_offset, rotation_about};
use crate::viewport::MapView;
use kurbo::Point;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Topics the synchronizer listens to.
const INBOUND: [Topic; 8] = [
    Topic::SelectIds,
    Topic::FocusId,
    Topic::SchemaLoaded,
    Topic::Snapshot,
    Topic::AeTranslate,
    Topic::AeRotate,
    Topic::AttachExternalLayer,
    Topic::DisableInteractions,
];

/// Selection and identity synchronizer.
#[derive(Debug, Default)]
pub struct Synchronizer {
    registry: Registry,
    policy: PolicyState,
    snapshot: AttributeSnapshot,
    selection: Selection,
    /// Last requested ids, reapplied to layers attached later.
    wanted: Vec<CanonicalId>,
    focus: Option<CanonicalId>,
    /// Feature the focused id resolved to, for the edit and move panels.
    focused: Option<(LayerId, FeatureUid)>,
    pending_edit: Option<EditSnapshot>,
    inbox: Rc<RefCell<VecDeque<BusMessage>>>,
    subscriptions: Vec<SubscriptionId>,
    listening_layers: bool,
    outgoing: Vec<BusMessage>,
    changes: Vec<InteractionChange>,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the inbound topics on `bus`.
    pub fn connect(&mut self, bus: &mut EventBus) {
        for topic in INBOUND {
            let inbox = self.inbox.clone();
            let id = bus.subscribe(Some(topic), move |msg| inbox.borrow_mut().push_back(msg.clone()));
            self.subscriptions.push(id);
        }
    }

    /// Attach every attribute-editor layer already on the map and start
    /// following layer additions and removals.
    pub fn setup(&mut self, map: &mut MapModel) {
        let layers: Vec<LayerId> = map
            .vector_layers()
            .into_iter()
            .filter(|(l, _)| l.is_attribute_editor())
            .map(|(l, _)| l.id)
            .collect();
        for layer in layers {
            self.attach(map, layer, AllowInteractions::default(), None);
        }
        self.listening_layers = true;
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn focus(&self) -> Option<&str> {
        self.focus.as_deref()
    }

    /// The single feature pushed to the edit and move panels, if any.
    pub fn focused_feature(&self) -> Option<(LayerId, FeatureUid)> {
        self.focused
    }

    pub fn snapshot(&self) -> &AttributeSnapshot {
        &self.snapshot
    }

    pub fn policy(&self) -> &PolicyState {
        &self.policy
    }

    /// Drain messages queued for the bus.
    pub fn take_outgoing(&mut self) -> Vec<BusMessage> {
        std::mem::take(&mut self.outgoing)
    }

    /// Drain the interaction flips made since the last call, for the host to
    /// mirror onto its own map interactions.
    pub fn take_interaction_changes(&mut self) -> Vec<InteractionChange> {
        std::mem::take(&mut self.changes)
    }

    /// Apply every queued inbound message.
    pub fn process(&mut self, map: &mut MapModel) {
        loop {
            let next = self.inbox.borrow_mut().pop_front();
            let Some(msg) = next else { break };
            self.handle_message(map, msg);
        }
    }

    pub fn handle_message(&mut self, map: &mut MapModel, msg: BusMessage) {
        match msg {
            BusMessage::SelectIds { ids, mode, .. } => {
                let ids: Vec<CanonicalId> = ids.iter().map(|id| self.snapshot.canonicalize(id)).collect();
                match mode {
                    SelectMode::Replace => self.selection.replace(ids),
                    SelectMode::Toggle => {
                        for id in ids {
                            self.selection.toggle(id);
                        }
                    }
                }
                self.apply_selection(map);
            }
            BusMessage::FocusId { id } => {
                self.focus = id.map(|id| self.snapshot.canonicalize(&id));
                self.focused = self.focus.as_deref().and_then(|id| self.resolve_one(map, id));
            }
            BusMessage::Snapshot { rows } => self.snapshot.replace(rows),
            BusMessage::SchemaLoaded(schema) => self.on_schema_loaded(&schema),
            BusMessage::AeTranslate { distance, angle_deg } => {
                let delta = bearing_offset(distance, angle_deg);
                self.transform_selection(map, |g| g.translate(delta));
            }
            BusMessage::AeRotate { degrees, clockwise } => {
                let geometries: Vec<Geometry> = self
                    .selected_features(map)
                    .into_iter()
                    .filter_map(|(layer, uid)| map.vector_layer(layer)?.source.get(uid)?.clone_geometry())
                    .collect();
                let Some(bounds) = combined_bounds(&geometries) else {
                    return;
                };
                let affine = rotation_about(bounds.center(), degrees, clockwise);
                self.transform_selection(map, |g| g.transform(affine));
            }
            BusMessage::AttachExternalLayer { layer, allow, service_id } => {
                if map.vector_layer(layer).is_none() {
                    log::debug!("sync: attach request for unknown layer {}", layer);
                    return;
                }
                self.attach(map, layer, allow, service_id);
            }
            BusMessage::DisableInteractions { disable } => {
                self.policy.suspended = disable;
                self.reevaluate();
            }
            BusMessage::ToggleDeleteIds { .. } | BusMessage::RequestSchema { .. } | BusMessage::GeometryEdited(_) => {}
        }
    }

    /// Route a map event. `hit_tolerance` is in pixels.
    pub fn on_map_event<V: MapView + ?Sized>(&mut self, map: &mut MapModel, view: &V, event: &MapEvent, hit_tolerance: f64) {
        match event {
            MapEvent::LayerAdded { layer } if self.listening_layers => {
                if map.vector_layer(*layer).is_some_and(VectorLayer::is_attribute_editor) {
                    self.attach(map, *layer, AllowInteractions::default(), None);
                }
            }
            MapEvent::LayerRemoved { layer } if self.listening_layers => {
                self.registry.detach(*layer);
                if self.focused.is_some_and(|(focused_layer, _)| focused_layer == *layer) {
                    self.focused = None;
                }
            }
            MapEvent::SingleClick { pixel, modifiers } => self.on_click(map, view, *pixel, *modifiers, hit_tolerance),
            MapEvent::TranslateStart { layer, features } => self.begin_edit(map, EditKind::Translate, *layer, features),
            MapEvent::ModifyStart { layer, features } => self.begin_edit(map, EditKind::Modify, *layer, features),
            MapEvent::TranslateEnd { .. } | MapEvent::ModifyEnd { .. } => self.end_edit(map),
            _ => {}
        }
    }

    pub fn set_activity(&mut self, map: &mut MapModel, activity: Activity) {
        let leaving = self.policy.activity.holds_selection() && !activity.holds_selection();
        self.policy.activity = activity;
        if leaving {
            self.clear_selection(map);
        }
        self.reevaluate();
    }

    pub fn set_window_visible(&mut self, map: &mut MapModel, visible: bool) {
        self.policy.window_visible = visible;
        if !visible {
            self.clear_selection(map);
        }
        self.reevaluate();
    }

    pub fn set_modify_enabled(&mut self, enabled: bool) {
        self.policy.modify_enabled = enabled;
        self.reevaluate();
    }

    pub fn set_translate_enabled(&mut self, enabled: bool) {
        self.policy.translate_enabled = enabled;
        self.reevaluate();
    }

    fn reevaluate(&mut self) {
        let changes = self.registry.apply_policy(&self.policy);
        self.record(changes);
    }

    /// Queue flips, folding a flip that undoes a queued one.
    fn record(&mut self, changes: Vec<InteractionChange>) {
        for change in changes {
            let pending = self
                .changes
                .iter()
                .position(|c| c.layer == change.layer && c.kind == change.kind);
            match pending {
                Some(i) if self.changes[i].active != change.active => {
                    self.changes.remove(i);
                }
                Some(i) => self.changes[i] = change,
                None => self.changes.push(change),
            }
        }
    }

    fn attach(&mut self, map: &mut MapModel, layer: LayerId, allow: AllowInteractions, service_id: Option<String>) {
        if !self.registry.attach(layer, allow, service_id.clone()) {
            log::debug!("sync: layer {} already attached", layer);
            return;
        }
        if let Some(service_id) = service_id {
            self.outgoing.push(BusMessage::RequestSchema { service_id });
        }
        self.mark_layer(map, layer);
        self.reevaluate();
    }

    fn on_schema_loaded(&mut self, schema: &LayerSchema) {
        for entry in self.registry.entries_mut() {
            if entry.service_id.as_deref() == Some(schema.service_id.as_str()) {
                entry.node_editing = schema.geometry_editable;
            }
        }
        self.reevaluate();
    }

    /// Push the current selection into every registered layer.
    fn apply_selection(&mut self, map: &mut MapModel) {
        self.wanted = self.selection.ids().to_vec();
        // Modify goes first so vertex handles never render on stale features.
        let changes = self.registry.suspend_modify();
        self.record(changes);
        for layer in self.registry.layers() {
            self.mark_layer(map, layer);
        }
        self.reevaluate();
    }

    /// Reset one layer's selection flags and collection to the wanted ids.
    fn mark_layer(&mut self, map: &mut MapModel, layer_id: LayerId) {
        let Some(entry) = self.registry.get_mut(layer_id) else {
            return;
        };
        let Some(layer) = map.vector_layer_mut(layer_id) else {
            return;
        };
        entry.features.clear();
        for feature in layer.source.features_mut() {
            if feature.flag(props::EDIT_ACTIVE) {
                feature.set_property(props::EDIT_ACTIVE, false);
            }
        }
        for id in &self.wanted {
            // Every part carrying the id is selected.
            let found: Vec<FeatureUid> = layer
                .source
                .features()
                .iter()
                .filter(|f| self.snapshot.feature_matches(f, id))
                .map(|f| f.uid)
                .collect();
            for uid in found {
                if entry.features.contains(&uid) {
                    continue;
                }
                if let Some(feature) = layer.source.get_mut(uid) {
                    feature.set_property(props::EDIT_ACTIVE, true);
                }
                entry.features.push(uid);
            }
        }
        layer.changed();
    }

    /// First feature across the registered layers that `id` refers to.
    fn resolve_one(&self, map: &MapModel, id: &str) -> Option<(LayerId, FeatureUid)> {
        self.registry.layers().into_iter().find_map(|layer_id| {
            let layer = map.vector_layer(layer_id)?;
            layer
                .source
                .features()
                .iter()
                .find(|f| self.snapshot.feature_matches(f, id))
                .map(|f| (layer_id, f.uid))
        })
    }

    fn clear_selection(&mut self, map: &mut MapModel) {
        if self.selection.is_empty() && self.wanted.is_empty() {
            return;
        }
        self.selection.clear();
        self.apply_selection(map);
    }

    fn selected_features(&self, map: &MapModel) -> Vec<(LayerId, FeatureUid)> {
        self.registry
            .entries()
            .iter()
            .filter(|e| map.vector_layer(e.layer).is_some())
            .flat_map(|e| e.features.iter().map(move |uid| (e.layer, *uid)))
            .collect()
    }

    fn canonical_id(&self, feature: &Feature) -> Option<CanonicalId> {
        self.snapshot.feature_id(feature)
    }

    fn on_click<V: MapView + ?Sized>(
        &mut self,
        map: &mut MapModel,
        view: &V,
        pixel: Point,
        modifiers: Modifiers,
        tolerance: f64,
    ) {
        let deleting = self.policy.activity == Activity::Delete;
        let clickable: Vec<LayerId> = self
            .registry
            .entries()
            .iter()
            .filter(|e| deleting || e.active().select)
            .map(|e| e.layer)
            .collect();
        if clickable.is_empty() {
            return;
        }

        let filter = |layer: &VectorLayer, f: &Feature| clickable.contains(&layer.id) && !f.is_overlay();
        let hit = view
            .features_at_pixel(map, pixel, tolerance, &filter)
            .first()
            .and_then(|hit| map.vector_layer(hit.layer)?.source.get(hit.feature))
            .and_then(|f| self.canonical_id(f));

        let toggle = !deleting && modifiers.toggles_selection();
        match (hit, toggle) {
            (Some(id), true) => self.selection.toggle(id),
            (Some(id), false) => self.selection.replace([id]),
            (None, true) => return,
            (None, false) if deleting => return,
            (None, false) => self.selection.clear(),
        }
        self.apply_selection(map);
        self.outgoing.push(BusMessage::SelectIds {
            ids: self.selection.ids().to_vec(),
            source: SOURCE_MAP.to_string(),
            mode: SelectMode::Replace,
        });
        if deleting {
            self.outgoing.push(BusMessage::ToggleDeleteIds {
                ids: self.selection.ids().to_vec(),
                source: SOURCE_MAP.to_string(),
            });
        }
    }

    fn begin_edit(&mut self, map: &MapModel, kind: EditKind, layer: LayerId, features: &[FeatureUid]) {
        let Some(source) = map.vector_layer(layer).map(|l| &l.source) else {
            return;
        };
        let mut snapshot = EditSnapshot::new(kind);
        for feature in features.iter().filter_map(|uid| source.get(*uid)) {
            if let Some(id) = self.canonical_id(feature) {
                snapshot.capture(id, feature.clone_geometry());
            }
        }
        self.pending_edit = Some(snapshot);
    }

    fn end_edit(&mut self, map: &MapModel) {
        let Some(snapshot) = self.pending_edit.take() else {
            log::debug!("sync: edit ended without a start");
            return;
        };
        self.emit_edits(map, snapshot);
    }

    fn emit_edits(&mut self, map: &MapModel, snapshot: EditSnapshot) {
        let registered = self.registry.layers();
        let snapshot_rows = &self.snapshot;
        let edits = snapshot.finish(|id| {
            registered
                .iter()
                .filter_map(|layer| map.vector_layer(*layer))
                .flat_map(|l| l.source.features())
                .find(|f| snapshot_rows.feature_id(f).as_deref() == Some(id))
                .and_then(Feature::clone_geometry)
        });
        self.outgoing.extend(edits.into_iter().map(BusMessage::GeometryEdited));
    }

    /// Apply `op` to every selected geometry and report the edits.
    fn transform_selection(&mut self, map: &mut MapModel, op: impl Fn(&mut Geometry)) {
        let targets = self.selected_features(map);
        if targets.is_empty() {
            return;
        }
        let mut snapshot = EditSnapshot::new(EditKind::Transform);
        for &(layer, uid) in &targets {
            let Some(feature) = map.feature_mut(layer, uid) else {
                continue;
            };
            if let Some(id) = self.snapshot.feature_id(feature) {
                snapshot.capture(id, feature.clone_geometry());
            }
            if let Some(mut geometry) = feature.clone_geometry() {
                op(&mut geometry);
                feature.set_geometry(geometry);
            }
        }
        for layer in targets.iter().map(|(l, _)| *l) {
            if let Some(l) = map.vector_layer_mut(layer) {
                l.changed();
            }
        }
        self.emit_edits(map, snapshot);
    }

    /// Unsubscribe, stop following layers and clean up every entry.
    /// Safe to call more than once.
    pub fn teardown(&mut self, bus: &mut EventBus, map: &mut MapModel) {
        if self.subscriptions.is_empty() && !self.listening_layers && self.registry.is_empty() {
            log::debug!("sync: teardown already done");
            return;
        }
        for id in self.subscriptions.drain(..) {
            bus.unsubscribe(id);
        }
        self.listening_layers = false;
        for entry in self.registry.entries_mut() {
            if let Some(layer) = map.vector_layer_mut(entry.layer) {
                for uid in &entry.features {
                    if let Some(f) = layer.source.get_mut(*uid) {
                        f.set_property(props::EDIT_ACTIVE, false);
                    }
                }
            }
            entry.cleanup();
        }
        self.registry.clear();
        self.pending_edit = None;
        self.focused = None;
        self.inbox.borrow_mut().clear();
    }

    /// Whether `kind` is active on `layer`.
    pub fn is_active(&self, layer: LayerId, kind: InteractionKind) -> bool {
        self.registry.get(layer).is_some_and(|e| e.active().get(kind))
    }
}
