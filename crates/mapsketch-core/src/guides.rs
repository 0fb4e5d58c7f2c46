//! Angle guides: parallel and perpendicular construction lines laid along
//! the segment a new drawing starts on.
//!
//! Guides are ordinary features flagged [`props::USER_MEASUREMENT_GUIDE`].
//! Snapping, measurement and validation all skip them.

use crate::config::GuideConfig;
use crate::feature::{Feature, FeatureUid, props};
use crate::geometry::{Geometry, GeometryKind, point_on_segment};
use crate::input::Modifiers;
use crate::layer::{LayerId, MapModel, VectorLayer};
use crate::viewport::MapView;
use kurbo::{Point, Vec2};
use peniko::Color;
use std::f64::consts::FRAC_PI_2;

/// Guide role stored under [`props::GUIDE_KIND`].
pub const OWNER_SEGMENT: &str = "owner";
pub const CONSTRUCTION_LINE: &str = "guide";

/// Highlight for the segment the drawing started on.
pub const OWNER_COLOR: Color = Color::from_rgba8(255, 94, 0, 255);
pub const GUIDE_COLOR: Color = Color::from_rgba8(0, 153, 255, 170);

/// `#rrggbbaa` form used in feature style properties.
pub fn color_hex(color: Color) -> String {
    let rgba = color.to_rgba8();
    format!("#{:02x}{:02x}{:02x}{:02x}", rgba.r, rgba.g, rgba.b, rgba.a)
}

fn guides_apply_to(kind: GeometryKind) -> bool {
    matches!(
        kind,
        GeometryKind::Polygon | GeometryKind::MultiPolygon | GeometryKind::LineString
    )
}

/// The segment the anchor lies on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OwnerSegment {
    pub start: Point,
    pub end: Point,
    /// Bearing in radians, clockwise from north.
    pub bearing: f64,
}

/// Find the first segment of `geometry` containing `anchor`.
///
/// Rings and lines are both scanned closed, and at most `cap` segments are
/// tested.
pub fn find_owner_segment(geometry: &Geometry, anchor: Point, cap: usize, epsilon: f64) -> Option<OwnerSegment> {
    let segments = geometry.sequences().into_iter().flat_map(|seq| {
        let n = seq.len();
        (0..n).map(move |i| (seq[i], seq[(i + 1) % n]))
    });
    segments
        .take(cap)
        .find(|&(a, b)| point_on_segment(anchor, a, b, epsilon))
        .map(|(start, end)| {
            let d = end - start;
            OwnerSegment {
                start,
                end,
                bearing: d.x.atan2(d.y),
            }
        })
}

/// Owner segment plus four lines from `anchor` at the segment bearing and
/// each quarter turn after it.
pub fn build_guides(owner: &OwnerSegment, anchor: Point, length: f64) -> Vec<Feature> {
    let guide = |geometry: Geometry, kind: &str, color: Color| {
        Feature::new(geometry)
            .with_property(props::USER_MEASUREMENT_GUIDE, true)
            .with_property(props::GUIDE_KIND, kind)
            .with_property(props::STROKE_COLOR, color_hex(color))
    };

    let mut features = vec![guide(
        Geometry::LineString(vec![owner.start, owner.end]),
        OWNER_SEGMENT,
        OWNER_COLOR,
    )];
    for k in 0..4 {
        let angle = owner.bearing + k as f64 * FRAC_PI_2;
        let end = anchor + Vec2::new(angle.sin(), angle.cos()) * length;
        features.push(guide(
            Geometry::LineString(vec![anchor, end]),
            CONSTRUCTION_LINE,
            GUIDE_COLOR,
        ));
    }
    features
}

/// Angle-guide generator.
#[derive(Debug, Default)]
pub struct AngleGuides {
    config: GuideConfig,
    modifiers: Modifiers,
    /// Guides currently on the map, by layer.
    guides: Vec<(LayerId, FeatureUid)>,
}

impl AngleGuides {
    pub fn new(config: GuideConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn set_modifiers(&mut self, modifiers: Modifiers) {
        self.modifiers = modifiers;
    }

    /// Whether the angle-snap key is held.
    pub fn is_active(&self) -> bool {
        self.modifiers.angle_snap()
    }

    pub fn guide_count(&self) -> usize {
        self.guides.len()
    }

    /// A new feature was started in `draw_layer`. Replaces any previous
    /// guides and returns how many were created.
    pub fn on_draw_start<V: MapView + ?Sized>(
        &mut self,
        map: &mut MapModel,
        view: &V,
        draw_layer: LayerId,
        feature: FeatureUid,
    ) -> usize {
        self.clear_guides(map);
        if !self.is_active() {
            return 0;
        }

        let Some(anchor) = map
            .vector_layer(draw_layer)
            .and_then(|layer| layer.source.get(feature))
            .and_then(Feature::geometry)
            .filter(|g| guides_apply_to(g.kind()))
            .and_then(Geometry::first_coordinate)
        else {
            return 0;
        };

        let pixel = view.pixel_from_coordinate(anchor);
        let filter = |_: &VectorLayer, f: &Feature| {
            f.uid != feature && !f.is_overlay() && f.geometry().is_some_and(|g| guides_apply_to(g.kind()))
        };
        let hits = view.features_at_pixel(map, pixel, self.config.hit_tolerance_px, &filter);
        let Some(owner) = hits
            .first()
            .and_then(|hit| map.vector_layer(hit.layer)?.source.get(hit.feature))
            .and_then(Feature::geometry)
            .and_then(|g| find_owner_segment(g, anchor, self.config.segment_cap, self.config.on_line_epsilon))
        else {
            log::debug!("guides: no owning segment under anchor");
            return 0;
        };

        let Some(layer) = map.vector_layer_mut(draw_layer) else {
            return 0;
        };
        for guide in build_guides(&owner, anchor, self.config.guide_length) {
            let uid = layer.source.add_feature(guide);
            self.guides.push((draw_layer, uid));
        }
        log::debug!("guides: bearing {:.2} deg", owner.bearing.to_degrees());
        self.guides.len()
    }

    /// Remove every tracked guide, and any stray guide feature left in
    /// the layers that held them.
    pub fn clear_guides(&mut self, map: &mut MapModel) {
        let mut layers: Vec<LayerId> = self.guides.drain(..).map(|(layer, _)| layer).collect();
        layers.dedup();
        for id in layers {
            if let Some(layer) = map.vector_layer_mut(id) {
                layer.source.remove_where(Feature::is_guide);
                layer.changed();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Layer;
    use crate::viewport::Viewport;
    use kurbo::Size;

    fn ctrl() -> Modifiers {
        Modifiers { ctrl: true, ..Modifiers::NONE }
    }

    /// Square from (0,0) to (100,100), a draw layer holding a line whose
    /// first point sits on the bottom edge.
    fn setup() -> (MapModel, Viewport, LayerId, FeatureUid) {
        let square = Feature::new(Geometry::Polygon(vec![vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(0.0, 100.0),
            Point::new(0.0, 0.0),
        ]]));
        let sketch = Feature::new(Geometry::LineString(vec![Point::new(50.0, 0.0), Point::new(50.0, 0.0)]));
        let sketch_uid = sketch.uid;
        let mut map = MapModel::new();
        map.add_layer(Layer::Vector(VectorLayer::new("parcels").with_features(vec![square])));
        let draw = map.add_layer(Layer::Vector(VectorLayer::new("draw").with_features(vec![sketch])));
        let view = Viewport::new(Point::new(50.0, 50.0), 1.0, Size::new(400.0, 400.0));
        (map, view, draw, sketch_uid)
    }

    fn guides_in(map: &MapModel, layer: LayerId) -> Vec<&Feature> {
        map.vector_layer(layer)
            .unwrap()
            .source
            .features()
            .iter()
            .filter(|f| f.is_guide())
            .collect()
    }

    #[test]
    fn test_bearing_convention() {
        let east = Geometry::LineString(vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
        let owner = find_owner_segment(&east, Point::new(5.0, 0.0), 500, 0.001).unwrap();
        assert!((owner.bearing - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_wraparound_segment_found() {
        // Open ring: the closing edge only exists through wrap-around.
        let ring = Geometry::Polygon(vec![vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
        ]]);
        let owner = find_owner_segment(&ring, Point::new(5.0, 5.0), 500, 0.001).unwrap();
        assert_eq!(owner.start, Point::new(10.0, 10.0));
        assert_eq!(owner.end, Point::new(0.0, 0.0));
    }

    #[test]
    fn test_segment_cap() {
        let line = Geometry::LineString(vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(20.0, 0.0)]);
        assert!(find_owner_segment(&line, Point::new(15.0, 0.0), 1, 0.001).is_none());
        assert!(find_owner_segment(&line, Point::new(15.0, 0.0), 2, 0.001).is_some());
    }

    #[test]
    fn test_guides_parallel_and_perpendicular() {
        let owner = OwnerSegment {
            start: Point::new(0.0, 0.0),
            end: Point::new(10.0, 0.0),
            bearing: FRAC_PI_2,
        };
        let guides = build_guides(&owner, Point::new(5.0, 0.0), 100.0);
        assert_eq!(guides.len(), 5);
        let ends: Vec<Point> = guides[1..]
            .iter()
            .map(|g| match g.geometry() {
                Some(Geometry::LineString(pts)) => pts[1],
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        let expected = [(105.0, 0.0), (5.0, -100.0), (-95.0, 0.0), (5.0, 100.0)];
        for (end, (x, y)) in ends.iter().zip(expected) {
            assert!((end.x - x).abs() < 1e-9 && (end.y - y).abs() < 1e-9, "{end:?}");
        }
        assert!(guides.iter().all(Feature::is_guide));
    }

    #[test]
    fn test_draw_start_creates_guides() {
        let (mut map, view, draw, uid) = setup();
        let mut guides = AngleGuides::new(GuideConfig::default());
        guides.set_modifiers(ctrl());
        assert_eq!(guides.on_draw_start(&mut map, &view, draw, uid), 5);
        let placed = guides_in(&map, draw);
        assert_eq!(placed.len(), 5);
        assert_eq!(
            placed[0].property(props::GUIDE_KIND).and_then(|v| v.as_str()),
            Some(OWNER_SEGMENT)
        );
        assert_eq!(
            placed[0].property(props::STROKE_COLOR).and_then(|v| v.as_str()),
            Some("#ff5e00ff")
        );
    }

    #[test]
    fn test_inactive_without_modifier() {
        let (mut map, view, draw, uid) = setup();
        let mut guides = AngleGuides::new(GuideConfig::default());
        assert_eq!(guides.on_draw_start(&mut map, &view, draw, uid), 0);
        assert!(guides_in(&map, draw).is_empty());
    }

    #[test]
    fn test_point_drawing_gets_no_guides() {
        let (mut map, view, draw, _) = setup();
        let point = Feature::new(Geometry::Point(Point::new(50.0, 0.0)));
        let uid = map.vector_layer_mut(draw).unwrap().source.add_feature(point);
        let mut guides = AngleGuides::new(GuideConfig::default());
        guides.set_modifiers(ctrl());
        assert_eq!(guides.on_draw_start(&mut map, &view, draw, uid), 0);
    }

    #[test]
    fn test_anchor_off_any_segment() {
        let (mut map, view, draw, uid) = setup();
        if let Some(f) = map.feature_mut(draw, uid) {
            f.set_geometry(Geometry::LineString(vec![Point::new(50.0, 50.0)]));
        }
        let mut guides = AngleGuides::new(GuideConfig::default());
        guides.set_modifiers(ctrl());
        // Inside the square: hit, but no segment passes through the anchor.
        assert_eq!(guides.on_draw_start(&mut map, &view, draw, uid), 0);
    }

    #[test]
    fn test_clear_guides_removes_all() {
        let (mut map, view, draw, uid) = setup();
        let mut guides = AngleGuides::new(GuideConfig::default());
        guides.set_modifiers(ctrl());
        guides.on_draw_start(&mut map, &view, draw, uid);
        guides.clear_guides(&mut map);
        assert!(guides_in(&map, draw).is_empty());
        assert_eq!(guides.guide_count(), 0);
        assert!(map.vector_layer(draw).unwrap().source.get(uid).is_some());
        // Second clear is a no-op.
        guides.clear_guides(&mut map);
    }

    #[test]
    fn test_next_draw_start_replaces_guides() {
        let (mut map, view, draw, uid) = setup();
        let mut guides = AngleGuides::new(GuideConfig::default());
        guides.set_modifiers(ctrl());
        guides.on_draw_start(&mut map, &view, draw, uid);
        guides.on_draw_start(&mut map, &view, draw, uid);
        assert_eq!(guides_in(&map, draw).len(), 5);
    }
}
