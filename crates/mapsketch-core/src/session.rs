//! Sketch session: the map model, bus and every sketch component wired
//! together behind one event-routing surface.

use crate::bus::{BusMessage, EventBus, GeometryEdit, SubscriptionId, Topic};
use crate::config::SketchConfig;
use crate::feature::{FeatureUid, props};
use crate::guides::AngleGuides;
use crate::input::MapEvent;
use crate::layer::{Layer, LayerId, MapModel, VectorLayer};
use crate::measure::{apply_measurement_label, measure};
use crate::registry::Activity;
use crate::snap::SnapEngine;
use crate::synchronizer::Synchronizer;
use crate::timer::{Duration, HoldRepeat, Instant};
use crate::validate::{GeometryValidator, Toast};
use crate::viewport::Viewport;
use kurbo::Point;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Snap party name used while drawing.
const DRAW_PARTY: &str = "draw";

/// Overlay layer the session adds for kink markers.
pub const MARKER_LAYER: &str = "sketch-markers";

/// Upper bound on publish rounds per pump, guarding against feedback loops.
const MAX_PUMP_ROUNDS: usize = 16;

/// A live sketching session.
pub struct SketchSession {
    pub config: SketchConfig,
    pub map: MapModel,
    pub view: Viewport,
    pub bus: EventBus,
    pub snap: SnapEngine,
    pub guides: AngleGuides,
    pub validator: GeometryValidator,
    pub sync: Synchronizer,
    activity: Activity,
    /// Feature currently being drawn.
    drawing: Option<(LayerId, FeatureUid)>,
    rotate_repeat: HoldRepeat,
    rotate_step: Option<(f64, bool)>,
    edits: Rc<RefCell<VecDeque<GeometryEdit>>>,
    edit_subscription: Option<SubscriptionId>,
    /// Every message this session published, in order.
    published: Vec<BusMessage>,
    toasts: Vec<Toast>,
}

impl SketchSession {
    pub fn new(config: SketchConfig, mut map: MapModel, view: Viewport) -> Self {
        let marker_layer = map.add_layer(Layer::Vector(VectorLayer::new(MARKER_LAYER)));
        let mut bus = EventBus::new();
        let edits: Rc<RefCell<VecDeque<GeometryEdit>>> = Rc::default();
        let inbox = edits.clone();
        let edit_subscription = bus.subscribe(Some(Topic::GeometryEdited), move |msg| {
            if let BusMessage::GeometryEdited(edit) = msg {
                inbox.borrow_mut().push_back(edit.clone());
            }
        });

        let mut sync = Synchronizer::new();
        sync.connect(&mut bus);
        let rotate_repeat = HoldRepeat::new(
            Duration::from_millis(config.rotate_repeat.initial_delay_ms),
            Duration::from_millis(config.rotate_repeat.interval_ms),
        );

        let mut session = Self {
            snap: SnapEngine::new(config.snap.clone()),
            guides: AngleGuides::new(config.guides.clone()),
            validator: GeometryValidator::new(true).with_marker_layer(marker_layer),
            sync,
            config,
            map,
            view,
            bus,
            activity: Activity::None,
            drawing: None,
            rotate_repeat,
            rotate_step: None,
            edits,
            edit_subscription: Some(edit_subscription),
            published: Vec::new(),
            toasts: Vec::new(),
        };
        session.sync.setup(&mut session.map);
        session.pump();
        session
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    /// Snap `coordinate` against the map, ignoring the feature being drawn.
    pub fn snap_coordinate(&self, coordinate: Point) -> Point {
        let exclude = self.drawing.map(|(_, uid)| uid);
        self.snap.snap(&self.map, &self.view, coordinate, exclude)
    }

    /// Route a host map event.
    pub fn handle_map_event(&mut self, event: &MapEvent, now: Instant) {
        match event {
            MapEvent::PointerMove { coordinate } => {
                let exclude = self.drawing.map(|(_, uid)| uid);
                self.snap.track(&self.map, &self.view, *coordinate, exclude);
            }
            MapEvent::PointerLeave => self.snap.hide_indicator(),
            MapEvent::ModifiersChanged { modifiers } => self.guides.set_modifiers(*modifiers),
            MapEvent::DrawStart { layer, feature } => {
                self.drawing = Some((*layer, *feature));
                self.guides.on_draw_start(&mut self.map, &self.view, *layer, *feature);
            }
            MapEvent::DrawAbort => {
                self.drawing = None;
                self.guides.clear_guides(&mut self.map);
            }
            MapEvent::FeatureAdded { layer, feature } => self.on_feature_added(*layer, *feature),
            MapEvent::LayerVisibilityChanged { .. } => self.snap.on_layer_visibility_changed(now),
            MapEvent::LayerAdded { .. } | MapEvent::LayerRemoved { .. } => {
                self.snap.on_layer_visibility_changed(now);
                self.sync.on_map_event(&mut self.map, &self.view, event, self.config.hit_tolerance_px);
            }
            _ => self.sync.on_map_event(&mut self.map, &self.view, event, self.config.hit_tolerance_px),
        }
        self.pump();
    }

    fn on_feature_added(&mut self, layer: LayerId, uid: FeatureUid) {
        let finished = self.drawing.take_if(|(l, f)| *l == layer && *f == uid).is_some();
        let settings = &self.config.measurement;
        let Some(feature) = self.map.feature_mut(layer, uid) else {
            return;
        };
        if feature.is_overlay() {
            return;
        }
        if finished {
            feature.set_property_silent(props::USER_DRAWN, true);
        }
        apply_measurement_label(feature, settings);
        if feature.flag(props::USER_DRAWN) {
            self.validator.validate_in_layer(&mut self.map, layer, uid);
        }
    }

    /// Publish a message and settle every reaction to it.
    pub fn publish(&mut self, message: BusMessage) {
        self.bus.publish(&message);
        self.published.push(message);
        self.pump();
    }

    /// Process inbound queues until no component has anything left to say.
    fn pump(&mut self) {
        for _ in 0..MAX_PUMP_ROUNDS {
            self.sync.process(&mut self.map);
            loop {
                let next = self.edits.borrow_mut().pop_front();
                let Some(edit) = next else { break };
                self.validator.on_geometry_edited(&mut self.map, &edit.id);
            }
            self.toasts.extend(self.validator.take_toasts());

            let outgoing = self.sync.take_outgoing();
            if outgoing.is_empty() {
                return;
            }
            for message in outgoing {
                self.bus.publish(&message);
                self.published.push(message);
            }
        }
        log::warn!("session: bus did not settle after {} rounds", MAX_PUMP_ROUNDS);
    }

    /// Drive timers.
    pub fn tick(&mut self, now: Instant) {
        self.snap.tick(now, &self.map);
        let repeats = self.rotate_repeat.poll(now);
        if let Some((degrees, clockwise)) = self.rotate_step {
            for _ in 0..repeats {
                self.publish(BusMessage::AeRotate { degrees, clockwise });
            }
        }
    }

    /// Rotate the selection once now and keep rotating while held.
    pub fn start_rotate(&mut self, degrees: f64, clockwise: bool, now: Instant) {
        self.rotate_step = Some((degrees, clockwise));
        self.rotate_repeat.start(now);
        self.publish(BusMessage::AeRotate { degrees, clockwise });
    }

    pub fn stop_rotate(&mut self) {
        self.rotate_step = None;
        self.rotate_repeat.stop();
    }

    pub fn set_activity(&mut self, activity: Activity) {
        if activity == self.activity {
            return;
        }
        self.guides.clear_guides(&mut self.map);
        self.stop_rotate();
        if self.activity == Activity::Draw {
            self.snap.unregister_party(DRAW_PARTY);
            self.drawing = None;
        }
        if activity == Activity::Draw {
            self.snap.register_party(DRAW_PARTY, &self.map);
        }
        self.activity = activity;
        self.sync.set_activity(&mut self.map, activity);
        self.pump();
    }

    pub fn set_window_visible(&mut self, visible: bool) {
        self.sync.set_window_visible(&mut self.map, visible);
        self.pump();
    }

    pub fn set_snap_enabled(&mut self, enabled: bool) {
        self.config.snap.enabled = enabled;
        self.snap.set_enabled(enabled, &self.map);
    }

    pub fn set_snap_tolerance(&mut self, pixels: f64) {
        self.config.snap.pixel_tolerance = pixels;
        self.snap.set_pixel_tolerance(pixels, &self.map);
    }

    /// Measurement label for a feature under the session's settings.
    pub fn measure_feature(&self, uid: FeatureUid) -> Option<String> {
        let (_, feature) = self.map.find_feature(uid)?;
        Some(measure(feature, &self.config.measurement))
    }

    /// Drain the messages published since the last call.
    pub fn take_outgoing(&mut self) -> Vec<BusMessage> {
        std::mem::take(&mut self.published)
    }

    pub fn take_toasts(&mut self) -> Vec<Toast> {
        std::mem::take(&mut self.toasts)
    }

    /// Release every subscription, interaction, guide and timer. Safe to repeat.
    pub fn teardown(&mut self) {
        self.sync.teardown(&mut self.bus, &mut self.map);
        if let Some(id) = self.edit_subscription.take() {
            self.bus.unsubscribe(id);
        }
        self.snap.teardown();
        self.guides.clear_guides(&mut self.map);
        self.validator.clear_markers(&mut self.map);
        if let Some(layer) = self.validator.marker_layer() {
            self.map.remove_layer(layer);
        }
        self.stop_rotate();
        self.drawing = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SelectMode;
    use crate::feature::Feature;
    use crate::geometry::Geometry;
    use crate::input::Modifiers;
    use crate::layer::{ATTRIBUTE_EDITOR_LAYER, Layer, VectorLayer};
    use crate::validate::ToastLevel;
    use crate::viewport::MapView;
    use kurbo::Size;

    fn bowtie() -> Geometry {
        Geometry::Polygon(vec![vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
            Point::new(0.0, 0.0),
        ]])
    }

    fn square() -> Geometry {
        Geometry::Polygon(vec![vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
            Point::new(0.0, 0.0),
        ]])
    }

    fn session() -> (SketchSession, LayerId, LayerId) {
        let mut map = MapModel::new();
        let editor = map.add_layer(Layer::Vector(
            VectorLayer::new(ATTRIBUTE_EDITOR_LAYER).with_features(vec![Feature::new(square()).with_id("a")]),
        ));
        let draw = map.add_layer(Layer::Vector(VectorLayer::new("draw")));
        let view = Viewport::new(Point::new(5.0, 5.0), 1.0, Size::new(200.0, 200.0));
        (SketchSession::new(SketchConfig::default(), map, view), editor, draw)
    }

    #[test]
    fn test_drawn_feature_validated_and_labelled() {
        let (mut s, _, draw) = session();
        let now = Instant::now();
        s.set_activity(Activity::Draw);
        let uid = s.map.vector_layer_mut(draw).unwrap().source.add_feature(Feature::new(bowtie()));
        s.handle_map_event(&MapEvent::DrawStart { layer: draw, feature: uid }, now);
        s.handle_map_event(&MapEvent::FeatureAdded { layer: draw, feature: uid }, now);

        let toasts = s.take_toasts();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].level, ToastLevel::Warning);
        let feature = s.map.vector_layer(draw).unwrap().source.get(uid).unwrap();
        assert!(feature.flag(props::USER_DRAWN));
        assert!(feature.property(props::MEASUREMENT_LABEL).is_some());
        assert_eq!(s.validator.marker_count(), 1);
    }

    #[test]
    fn test_draw_activity_registers_snap_party() {
        let (mut s, _, _) = session();
        assert!(!s.snap.is_attached());
        s.set_activity(Activity::Draw);
        assert!(s.snap.is_attached());
        assert_eq!(s.snap_coordinate(Point::new(10.2, 10.3)), Point::new(10.0, 10.0));
        s.set_activity(Activity::Edit);
        assert!(!s.snap.is_attached());
    }

    #[test]
    fn test_guides_cleared_on_activity_change() {
        let (mut s, _, draw) = session();
        let now = Instant::now();
        s.set_activity(Activity::Draw);
        s.handle_map_event(
            &MapEvent::ModifiersChanged { modifiers: Modifiers { meta: true, ..Modifiers::NONE } },
            now,
        );
        let line = Feature::new(Geometry::LineString(vec![Point::new(5.0, 0.0), Point::new(5.0, 0.0)]));
        let uid = s.map.vector_layer_mut(draw).unwrap().source.add_feature(line);
        s.handle_map_event(&MapEvent::DrawStart { layer: draw, feature: uid }, now);
        assert_eq!(s.guides.guide_count(), 5);

        s.set_activity(Activity::None);
        let guides = s.map.vector_layer(draw).unwrap().source.features().iter().filter(|f| f.is_guide()).count();
        assert_eq!(guides, 0);
    }

    #[test]
    fn test_rotate_edit_round_trip_through_bus() {
        let (mut s, _, _) = session();
        s.set_window_visible(true);
        s.publish(BusMessage::SelectIds {
            ids: vec!["a".into()],
            source: "table".into(),
            mode: SelectMode::Replace,
        });
        s.take_outgoing();

        let now = Instant::now();
        s.start_rotate(90.0, false, now);
        let out = s.take_outgoing();
        assert!(matches!(out[0], BusMessage::AeRotate { .. }));
        assert!(matches!(&out[1], BusMessage::GeometryEdited(e) if e.id == "a"));

        // Held past the initial delay: one more step.
        s.tick(now + Duration::from_millis(400));
        let out = s.take_outgoing();
        assert_eq!(out.iter().filter(|m| matches!(m, BusMessage::GeometryEdited(_))).count(), 1);
        s.stop_rotate();
        s.tick(now + Duration::from_secs(5));
        assert!(s.take_outgoing().is_empty());
    }

    #[test]
    fn test_kink_markers_do_not_block_selection_clicks() {
        let bowtie = Feature::new(Geometry::Polygon(vec![vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
            Point::new(0.0, 0.0),
        ]]))
        .with_id("p");
        let mut map = MapModel::new();
        let editor = map.add_layer(Layer::Vector(VectorLayer::new(ATTRIBUTE_EDITOR_LAYER).with_features(vec![bowtie])));
        let view = Viewport::new(Point::new(5.0, 5.0), 1.0, Size::new(200.0, 200.0));
        let mut s = SketchSession::new(SketchConfig::default(), map, view);
        s.set_window_visible(true);

        s.publish(BusMessage::GeometryEdited(GeometryEdit {
            id: "p".into(),
            before: None,
            after: None,
            when: 0,
        }));
        assert_eq!(s.take_toasts().len(), 1);
        assert_eq!(s.validator.marker_count(), 1);
        assert_eq!(s.map.vector_layer(editor).unwrap().source.len(), 1);
        let markers = s.map.vector_layer_by_name(MARKER_LAYER).unwrap();
        assert!(markers.source.features()[0].flag(props::KINK_MARKER));

        let pixel = s.view.pixel_from_coordinate(Point::new(5.0, 5.0));
        s.handle_map_event(
            &MapEvent::SingleClick { pixel, modifiers: Modifiers::NONE },
            Instant::now(),
        );
        assert_eq!(s.sync.selection().ids().to_vec(), vec!["p".to_string()]);
    }

    #[test]
    fn test_teardown_twice() {
        let (mut s, _, _) = session();
        s.teardown();
        assert_eq!(s.bus.subscriber_count(), 0);
        s.teardown();
    }
}
