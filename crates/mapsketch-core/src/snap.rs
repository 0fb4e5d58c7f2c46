//! Snapping pointer coordinates to nearby feature vertices and edges.

use crate::config::SnapConfig;
use crate::feature::FeatureUid;
use crate::geometry::closest_point_on_segment;
use crate::layer::{LayerId, MapModel, VectorLayer};
use crate::timer::{Debouncer, Duration, Instant};
use crate::viewport::MapView;
use kurbo::Point;
use std::collections::BTreeMap;

/// Type of snap target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapTargetKind {
    /// A vertex of a feature.
    Vertex,
    /// The closest point on an edge.
    Edge,
}

/// The winning snap candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapHit {
    /// Snapped position in map coordinates.
    pub point: Point,
    pub kind: SnapTargetKind,
    pub layer: LayerId,
    pub feature: FeatureUid,
    /// Squared pixel distance from the pointer.
    pub distance_sq_px: f64,
}

/// Find the nearest vertex or edge point to `coordinate` among the given layers.
///
/// Vertices and edges compete on pixel distance alone; the first candidate
/// found wins ties. Returns None when nothing lies within `tolerance_px`.
pub fn find_snap_target<'a, V: MapView + ?Sized>(
    view: &V,
    layers: impl IntoIterator<Item = &'a VectorLayer>,
    coordinate: Point,
    exclude: Option<FeatureUid>,
    tolerance_px: f64,
) -> Option<SnapHit> {
    let pointer = view.pixel_from_coordinate(coordinate);
    let mut best: Option<SnapHit> = None;

    let mut consider = |point: Point, kind: SnapTargetKind, layer: LayerId, feature: FeatureUid| {
        let dist_sq = (view.pixel_from_coordinate(point) - pointer).hypot2();
        if best.is_none_or(|b| dist_sq < b.distance_sq_px) {
            best = Some(SnapHit {
                point,
                kind,
                layer,
                feature,
                distance_sq_px: dist_sq,
            });
        }
    };

    for layer in layers {
        for feature in layer.source.features() {
            if Some(feature.uid) == exclude || feature.is_overlay() {
                continue;
            }
            let Some(geometry) = feature.geometry() else {
                continue;
            };
            for vertex in geometry.vertices() {
                consider(vertex, SnapTargetKind::Vertex, layer.id, feature.uid);
            }
            for (a, b) in geometry.edges() {
                let on_edge = closest_point_on_segment(coordinate, a, b);
                consider(on_edge, SnapTargetKind::Edge, layer.id, feature.uid);
            }
        }
    }

    best.filter(|hit| hit.distance_sq_px <= tolerance_px * tolerance_px)
}

/// Snap interactions currently attached to the map: one per vector source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapInteractions {
    pub layers: Vec<LayerId>,
}

/// Visual indicator that follows the snapped pointer position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SnapIndicator {
    /// None while hidden.
    pub position: Option<Point>,
    pub kind: Option<SnapTargetKind>,
}

/// Snap engine with reference-counted activation.
#[derive(Debug)]
pub struct SnapEngine {
    config: SnapConfig,
    /// Interested parties and how many times each registered.
    parties: BTreeMap<String, usize>,
    interactions: Option<SnapInteractions>,
    rebuild: Debouncer,
    indicator: SnapIndicator,
}

impl SnapEngine {
    pub fn new(config: SnapConfig) -> Self {
        let rebuild = Debouncer::new(Duration::from_millis(config.rebuild_debounce_ms));
        Self {
            config,
            parties: BTreeMap::new(),
            interactions: None,
            rebuild,
            indicator: SnapIndicator::default(),
        }
    }

    pub fn config(&self) -> &SnapConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whether snap interactions are attached to the map.
    pub fn is_attached(&self) -> bool {
        self.interactions.is_some()
    }

    pub fn interactions(&self) -> Option<&SnapInteractions> {
        self.interactions.as_ref()
    }

    /// Total registrations across all parties.
    pub fn party_count(&self) -> usize {
        self.parties.values().sum()
    }

    /// Register interest in snapping. Attaches interactions on the first registration.
    pub fn register_party(&mut self, party: &str, map: &MapModel) {
        *self.parties.entry(party.to_string()).or_insert(0) += 1;
        if self.interactions.is_none() {
            log::debug!("snap: attaching interactions for '{}'", party);
            self.rebuild_interactions(map);
        }
    }

    /// Drop one registration. Tears interactions down after the last one.
    pub fn unregister_party(&mut self, party: &str) {
        match self.parties.get_mut(party) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.parties.remove(party);
            }
            None => {
                log::debug!("snap: '{}' was not registered", party);
                return;
            }
        }
        if self.parties.is_empty() {
            log::debug!("snap: last party left, detaching interactions");
            self.detach();
        }
    }

    /// Enable or disable snapping globally.
    pub fn set_enabled(&mut self, enabled: bool, map: &MapModel) {
        self.config.enabled = enabled;
        if enabled {
            if !self.parties.is_empty() {
                self.rebuild_interactions(map);
            }
        } else {
            self.detach();
        }
    }

    pub fn set_pixel_tolerance(&mut self, tolerance: f64, map: &MapModel) {
        self.config.pixel_tolerance = tolerance.max(0.0);
        if self.interactions.is_some() {
            self.rebuild_interactions(map);
        }
    }

    pub fn set_tracking(&mut self, tracking: bool) {
        self.config.tracking = tracking;
        if !tracking {
            self.hide_indicator();
        }
    }

    /// A layer's visibility changed; rebuild once the burst settles.
    pub fn on_layer_visibility_changed(&mut self, now: Instant) {
        if self.interactions.is_some() {
            self.rebuild.trigger(now);
        }
    }

    /// Drive pending timers. Returns true if interactions were rebuilt.
    pub fn tick(&mut self, now: Instant, map: &MapModel) -> bool {
        if self.rebuild.poll(now) && self.interactions.is_some() {
            self.rebuild_interactions(map);
            return true;
        }
        false
    }

    fn rebuild_interactions(&mut self, map: &MapModel) {
        if !self.config.enabled || self.parties.is_empty() {
            self.interactions = None;
            return;
        }
        let layers: Vec<LayerId> = map.visible_vector_layers().iter().map(|l| l.id).collect();
        log::debug!("snap: rebuilt interactions over {} layer(s)", layers.len());
        self.interactions = Some(SnapInteractions { layers });
    }

    fn detach(&mut self) {
        self.interactions = None;
        self.rebuild.cancel();
        self.hide_indicator();
    }

    /// Snap detail for `coordinate`, or None if nothing is in tolerance.
    pub fn snap_detailed<V: MapView + ?Sized>(
        &self,
        map: &MapModel,
        view: &V,
        coordinate: Point,
        exclude: Option<FeatureUid>,
    ) -> Option<SnapHit> {
        if !self.config.enabled {
            return None;
        }
        let interactions = self.interactions.as_ref()?;
        let layers = map
            .visible_vector_layers()
            .into_iter()
            .filter(|l| interactions.layers.contains(&l.id));
        find_snap_target(view, layers, coordinate, exclude, self.config.pixel_tolerance)
    }

    /// Snap `coordinate`, returning it unchanged when nothing is in tolerance.
    pub fn snap<V: MapView + ?Sized>(
        &self,
        map: &MapModel,
        view: &V,
        coordinate: Point,
        exclude: Option<FeatureUid>,
    ) -> Point {
        self.snap_detailed(map, view, coordinate, exclude)
            .map_or(coordinate, |hit| hit.point)
    }

    /// Pointer moved: snap and move the indicator when tracking.
    pub fn track<V: MapView + ?Sized>(
        &mut self,
        map: &MapModel,
        view: &V,
        coordinate: Point,
        exclude: Option<FeatureUid>,
    ) -> Point {
        let hit = self.snap_detailed(map, view, coordinate, exclude);
        if self.config.tracking {
            self.indicator = SnapIndicator {
                position: hit.map(|h| h.point),
                kind: hit.map(|h| h.kind),
            };
        }
        hit.map_or(coordinate, |h| h.point)
    }

    pub fn hide_indicator(&mut self) {
        self.indicator = SnapIndicator::default();
    }

    pub fn indicator(&self) -> SnapIndicator {
        self.indicator
    }

    /// Remove all parties, interactions and timers.
    pub fn teardown(&mut self) {
        self.parties.clear();
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Feature, props};
    use crate::geometry::Geometry;
    use crate::layer::Layer;
    use crate::viewport::Viewport;
    use kurbo::Size;

    /// One map unit per pixel, centred on the origin.
    fn unit_view() -> Viewport {
        Viewport::new(Point::ZERO, 1.0, Size::new(400.0, 400.0))
    }

    /// Triangle whose edges leave (10, 10) away from the test pointer.
    fn triangle() -> Feature {
        Feature::new(Geometry::Polygon(vec![vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 20.0),
            Point::new(0.0, 0.0),
        ]]))
    }

    fn engine_with(map: &MapModel) -> SnapEngine {
        let mut engine = SnapEngine::new(SnapConfig::default());
        engine.register_party("draw", map);
        engine
    }

    fn two_layer_map() -> (MapModel, FeatureUid) {
        let tri = triangle();
        let uid = tri.uid;
        let mut map = MapModel::new();
        map.add_layer(Layer::Vector(VectorLayer::new("a").with_features(vec![tri])));
        map.add_layer(Layer::Vector(VectorLayer::new("b").with_features(vec![Feature::new(
            Geometry::Point(Point::new(150.0, 150.0)),
        )])));
        (map, uid)
    }

    #[test]
    fn test_snap_to_vertex_within_tolerance() {
        let (map, _) = two_layer_map();
        let engine = engine_with(&map);
        let snapped = engine.snap(&map, &unit_view(), Point::new(10.2, 9.9), None);
        assert_eq!(snapped, Point::new(10.0, 10.0));
    }

    #[test]
    fn test_out_of_tolerance_returns_input() {
        let (map, _) = two_layer_map();
        let engine = engine_with(&map);
        let input = Point::new(60.0, 60.0);
        assert_eq!(engine.snap(&map, &unit_view(), input, None), input);
    }

    #[test]
    fn test_edge_beats_farther_vertex() {
        let line = Feature::new(Geometry::LineString(vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)]));
        let mut map = MapModel::new();
        map.add_layer(Layer::Vector(VectorLayer::new("a").with_features(vec![line])));
        let engine = engine_with(&map);
        let hit = engine
            .snap_detailed(&map, &unit_view(), Point::new(50.0, 3.0), None)
            .unwrap();
        assert_eq!(hit.kind, SnapTargetKind::Edge);
        assert_eq!(hit.point, Point::new(50.0, 0.0));
    }

    #[test]
    fn test_tie_keeps_first_candidate() {
        let line = Feature::new(Geometry::LineString(vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]));
        let mut map = MapModel::new();
        map.add_layer(Layer::Vector(VectorLayer::new("a").with_features(vec![line])));
        let engine = engine_with(&map);
        // Beyond the end: vertex and clamped edge point coincide.
        let hit = engine
            .snap_detailed(&map, &unit_view(), Point::new(12.0, 0.0), None)
            .unwrap();
        assert_eq!(hit.kind, SnapTargetKind::Vertex);
    }

    #[test]
    fn test_excluded_and_overlay_features_ignored() {
        let (mut map, uid) = two_layer_map();
        let guide = Feature::new(Geometry::Point(Point::new(60.0, 60.0)))
            .with_property(props::USER_MEASUREMENT_GUIDE, true);
        let marker = Feature::new(Geometry::Point(Point::new(80.0, 80.0))).with_property(props::KINK_MARKER, true);
        if let Some(Layer::Vector(l)) = map.layers.first_mut() {
            l.source.add_feature(guide);
            l.source.add_feature(marker);
        }
        let engine = engine_with(&map);
        let view = unit_view();
        assert_eq!(engine.snap(&map, &view, Point::new(10.2, 9.9), Some(uid)), Point::new(10.2, 9.9));
        assert_eq!(engine.snap(&map, &view, Point::new(60.5, 60.0), None), Point::new(60.5, 60.0));
        assert_eq!(engine.snap(&map, &view, Point::new(80.5, 80.0), None), Point::new(80.5, 80.0));
    }

    #[test]
    fn test_hidden_layer_ignored() {
        let (mut map, _) = two_layer_map();
        let id = map.layers[0].id();
        map.set_visible(id, false);
        let engine = engine_with(&map);
        let input = Point::new(10.2, 9.9);
        assert_eq!(engine.snap(&map, &unit_view(), input, None), input);
    }

    #[test]
    fn test_disabled_short_circuits() {
        let (map, _) = two_layer_map();
        let mut engine = engine_with(&map);
        engine.set_enabled(false, &map);
        assert!(!engine.is_enabled() && !engine.is_attached());
        let input = Point::new(10.2, 9.9);
        assert_eq!(engine.snap(&map, &unit_view(), input, None), input);
        engine.set_enabled(true, &map);
        assert_eq!(engine.snap(&map, &unit_view(), input, None), Point::new(10.0, 10.0));
    }

    #[test]
    fn test_empty_map_returns_input() {
        let map = MapModel::new();
        let engine = engine_with(&map);
        let input = Point::new(1.0, 1.0);
        assert_eq!(engine.snap(&map, &unit_view(), input, None), input);
    }

    #[test]
    fn test_party_refcount() {
        let (map, _) = two_layer_map();
        let mut engine = SnapEngine::new(SnapConfig::default());
        assert!(!engine.is_attached());
        engine.register_party("draw", &map);
        engine.register_party("draw", &map);
        engine.register_party("measure", &map);
        assert_eq!(engine.party_count(), 3);
        engine.unregister_party("draw");
        engine.unregister_party("measure");
        assert!(engine.is_attached());
        engine.unregister_party("draw");
        assert!(!engine.is_attached());
        engine.unregister_party("draw");
        assert_eq!(engine.party_count(), 0);
    }

    #[test]
    fn test_visibility_rebuild_debounced() {
        let (mut map, _) = two_layer_map();
        let id = map.layers[0].id();
        map.set_visible(id, false);
        let mut engine = engine_with(&map);
        assert_eq!(engine.interactions().unwrap().layers.len(), 1);

        map.set_visible(id, true);
        let t0 = Instant::now();
        engine.on_layer_visibility_changed(t0);
        engine.on_layer_visibility_changed(t0 + Duration::from_millis(100));
        assert!(!engine.tick(t0 + Duration::from_millis(300), &map));
        assert!(engine.tick(t0 + Duration::from_millis(360), &map));
        assert_eq!(engine.interactions().unwrap().layers.len(), 2);
    }

    #[test]
    fn test_tracking_indicator() {
        let (map, _) = two_layer_map();
        let mut engine = engine_with(&map);
        engine.set_tracking(true);
        let view = unit_view();
        engine.track(&map, &view, Point::new(10.2, 9.9), None);
        assert_eq!(engine.indicator().position, Some(Point::new(10.0, 10.0)));
        engine.track(&map, &view, Point::new(80.0, 80.0), None);
        assert_eq!(engine.indicator().position, None);
    }
}
