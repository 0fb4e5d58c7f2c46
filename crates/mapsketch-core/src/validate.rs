//! Self-intersection ("kink") detection and the warnings it raises.

use crate::error::{SketchError, SketchResult};
use crate::feature::{Feature, FeatureUid, props};
use crate::geometry::{Geometry, segment_intersection};
use crate::identity::matches_suffix;
use crate::layer::{LayerId, MapModel};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    Info,
    Warning,
}

/// A user-facing notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

/// Warning text for `count` self-intersections.
pub fn kink_warning(count: usize) -> String {
    let noun = if count == 1 { "självkorsning" } else { "självkorsningar" };
    format!("Geometrin har {count} {noun}.")
}

/// Groups of coordinate sequences whose segments are tested against each other.
fn components(geometry: &Geometry) -> Vec<Vec<&[Point]>> {
    match geometry {
        Geometry::LineString(line) => vec![vec![line.as_slice()]],
        Geometry::MultiLineString(lines) => vec![lines.iter().map(Vec::as_slice).collect()],
        Geometry::Polygon(rings) => vec![rings.iter().map(Vec::as_slice).collect()],
        Geometry::MultiPolygon(polygons) => polygons
            .iter()
            .map(|rings| rings.iter().map(Vec::as_slice).collect())
            .collect(),
        Geometry::Point(_) | Geometry::MultiPoint(_) => Vec::new(),
    }
}

#[derive(Clone, Copy)]
struct Segment {
    seq: usize,
    index: usize,
    a: Point,
    b: Point,
}

/// Self-intersection points of a line or polygon geometry.
///
/// Segments that share a vertex by construction (neighbours in a sequence,
/// and the first and last segments of a closed ring) are not compared.
pub fn find_kinks(geometry: &Geometry) -> SketchResult<Vec<Point>> {
    let mut kinks = Vec::new();
    for component in components(geometry) {
        let mut segments = Vec::new();
        let mut closed = Vec::with_capacity(component.len());
        for (seq, coords) in component.iter().enumerate() {
            if coords.iter().any(|p| !p.is_finite()) {
                return Err(SketchError::InvalidGeometry("non-finite coordinate".into()));
            }
            closed.push(coords.len() > 3 && coords.first() == coords.last());
            segments.extend(coords.windows(2).enumerate().map(|(index, w)| Segment {
                seq,
                index,
                a: w[0],
                b: w[1],
            }));
        }

        for (i, s) in segments.iter().enumerate() {
            for t in &segments[i + 1..] {
                if s.seq == t.seq {
                    let last = component[s.seq].len() - 2;
                    let neighbours = t.index == s.index + 1 || (closed[s.seq] && s.index == 0 && t.index == last);
                    if neighbours {
                        continue;
                    }
                }
                if let Some(p) = segment_intersection(s.a, s.b, t.a, t.b) {
                    kinks.push(p);
                }
            }
        }
    }
    Ok(kinks)
}

/// Runs kink detection and collects warnings and markers.
#[derive(Debug, Default)]
pub struct GeometryValidator {
    /// Place a marker point at each intersection.
    pub mark_kinks: bool,
    /// Layer markers go into. Without one, markers land next to the
    /// validated feature unless it lives in an attribute-editor layer.
    marker_layer: Option<LayerId>,
    markers: Vec<(LayerId, FeatureUid)>,
    toasts: Vec<Toast>,
}

impl GeometryValidator {
    pub fn new(mark_kinks: bool) -> Self {
        Self {
            mark_kinks,
            ..Default::default()
        }
    }

    pub fn with_marker_layer(mut self, layer: LayerId) -> Self {
        self.marker_layer = Some(layer);
        self
    }

    pub fn marker_layer(&self) -> Option<LayerId> {
        self.marker_layer
    }

    /// Intersection points of `feature`; empty for points, guides and errors.
    fn kinks_of(feature: &Feature) -> Vec<Point> {
        if feature.is_overlay() {
            return Vec::new();
        }
        let Some(geometry) = feature.geometry().filter(|g| g.kind().is_linear_or_areal()) else {
            return Vec::new();
        };
        find_kinks(geometry).unwrap_or_else(|e| {
            log::warn!("validation failed for feature {}: {}", feature.uid, e);
            Vec::new()
        })
    }

    /// Validate one feature, raising a warning toast when it self-intersects.
    /// Returns the number of self-intersections found.
    pub fn validate(&mut self, feature: &Feature) -> usize {
        let count = Self::kinks_of(feature).len();
        if count > 0 {
            self.toasts.push(Toast {
                level: ToastLevel::Warning,
                message: kink_warning(count),
            });
        }
        count
    }

    /// Validate a feature in place, refreshing kink markers in its layer.
    pub fn validate_in_layer(&mut self, map: &mut MapModel, layer: LayerId, uid: FeatureUid) -> usize {
        let Some(feature) = map.vector_layer(layer).and_then(|l| l.source.get(uid)) else {
            log::debug!("validate: feature {} not in layer {}", uid, layer);
            return 0;
        };
        let kinks = Self::kinks_of(feature);
        let count = self.validate(feature);
        if self.mark_kinks {
            self.clear_markers(map);
            self.place_markers(map, layer, &kinks);
        }
        count
    }

    /// Revalidate attribute-editor features matching `id` after an edit.
    pub fn on_geometry_edited(&mut self, map: &mut MapModel, id: &str) -> usize {
        let targets: Vec<(LayerId, FeatureUid)> = map
            .vector_layers()
            .into_iter()
            .filter(|(l, _)| l.is_attribute_editor())
            .flat_map(|(l, _)| {
                l.source
                    .features()
                    .iter()
                    .filter(|f| matches_suffix(f, id))
                    .map(move |f| (l.id, f.uid))
            })
            .collect();
        targets
            .into_iter()
            .map(|(layer, uid)| self.validate_in_layer(map, layer, uid))
            .sum()
    }

    fn place_markers(&mut self, map: &mut MapModel, source: LayerId, kinks: &[Point]) {
        let layer = match self.marker_layer {
            Some(layer) => layer,
            None if map.vector_layer(source).is_some_and(|l| !l.is_attribute_editor()) => source,
            None => {
                log::debug!("validate: no marker layer for kinks in layer {}", source);
                return;
            }
        };
        let Some(target) = map.vector_layer_mut(layer) else {
            return;
        };
        for &p in kinks {
            let marker = Feature::new(Geometry::Point(p)).with_property(props::KINK_MARKER, true);
            let uid = target.source.add_feature(marker);
            self.markers.push((layer, uid));
        }
    }

    /// Remove previously placed kink markers.
    pub fn clear_markers(&mut self, map: &mut MapModel) {
        for (layer, uid) in self.markers.drain(..) {
            if let Some(l) = map.vector_layer_mut(layer) {
                l.source.remove_feature(uid);
            }
        }
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    /// Drain pending toasts.
    pub fn take_toasts(&mut self) -> Vec<Toast> {
        std::mem::take(&mut self.toasts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{ATTRIBUTE_EDITOR_LAYER, Layer, VectorLayer};

    fn pts(coords: &[(f64, f64)]) -> Vec<Point> {
        coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    fn bowtie() -> Geometry {
        Geometry::Polygon(vec![pts(&[(0.0, 0.0), (10.0, 10.0), (10.0, 0.0), (0.0, 10.0), (0.0, 0.0)])])
    }

    fn square() -> Geometry {
        Geometry::Polygon(vec![pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)])])
    }

    #[test]
    fn test_bowtie_has_kink() {
        let mut v = GeometryValidator::default();
        assert!(v.validate(&Feature::new(bowtie())) >= 1);
        let toasts = v.take_toasts();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].level, ToastLevel::Warning);
        assert_eq!(toasts[0].message, "Geometrin har 1 självkorsning.");
    }

    #[test]
    fn test_square_is_clean() {
        let mut v = GeometryValidator::default();
        assert_eq!(v.validate(&Feature::new(square())), 0);
        assert!(v.take_toasts().is_empty());
    }

    #[test]
    fn test_kink_location() {
        let kinks = find_kinks(&bowtie()).unwrap();
        assert_eq!(kinks.len(), 1);
        assert!((kinks[0].x - 5.0).abs() < 1e-9 && (kinks[0].y - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_zigzag_line_plural() {
        // Crosses the horizontal first leg twice.
        let line = Geometry::LineString(pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 5.0), (7.0, -5.0), (3.0, 5.0), (3.0, -5.0)]));
        let mut v = GeometryValidator::default();
        let count = v.validate(&Feature::new(line));
        assert!(count >= 2);
        assert!(v.take_toasts()[0].message.ends_with("självkorsningar."));
    }

    #[test]
    fn test_multilinestring_parts_compared() {
        let lines = Geometry::MultiLineString(vec![
            pts(&[(0.0, 0.0), (10.0, 10.0)]),
            pts(&[(0.0, 10.0), (10.0, 0.0)]),
        ]);
        assert_eq!(find_kinks(&lines).unwrap().len(), 1);
    }

    #[test]
    fn test_multipolygon_parts_independent() {
        let rings = |dx: f64| vec![pts(&[(dx, 0.0), (dx + 10.0, 0.0), (dx + 10.0, 10.0), (dx, 10.0), (dx, 0.0)])];
        // Overlapping squares are separate polygons, not kinks.
        let mp = Geometry::MultiPolygon(vec![rings(0.0), rings(5.0)]);
        assert!(find_kinks(&mp).unwrap().is_empty());
    }

    #[test]
    fn test_points_and_guides_skipped() {
        let mut v = GeometryValidator::default();
        assert_eq!(v.validate(&Feature::new(Geometry::Point(Point::ZERO))), 0);
        let guide = Feature::new(bowtie()).with_property(props::USER_MEASUREMENT_GUIDE, true);
        assert_eq!(v.validate(&guide), 0);
    }

    #[test]
    fn test_invalid_coordinates_not_fatal() {
        let line = Geometry::LineString(pts(&[(0.0, 0.0), (f64::NAN, 1.0), (2.0, 0.0)]));
        assert!(find_kinks(&line).is_err());
        let mut v = GeometryValidator::default();
        assert_eq!(v.validate(&Feature::new(line)), 0);
        assert!(v.take_toasts().is_empty());
    }

    #[test]
    fn test_edited_feature_found_by_suffix_with_markers() {
        let f = Feature::new(bowtie()).with_property("@_fid", "parcels.7");
        let layer = VectorLayer::new(ATTRIBUTE_EDITOR_LAYER).with_features(vec![f]);
        let layer_id = layer.id;
        let mut map = MapModel::new();
        map.add_layer(Layer::Vector(layer));
        map.add_layer(Layer::Vector(
            VectorLayer::new("other").with_features(vec![Feature::new(bowtie()).with_property("fid", "7")]),
        ));
        let overlay = map.add_layer(Layer::Vector(VectorLayer::new("markers")));

        let mut v = GeometryValidator::new(true).with_marker_layer(overlay);
        assert_eq!(v.on_geometry_edited(&mut map, "7"), 1);
        assert_eq!(v.marker_count(), 1);
        let marker = &map.vector_layer(overlay).unwrap().source.features()[0];
        assert!(marker.flag(props::KINK_MARKER));
        assert_eq!(map.vector_layer(layer_id).unwrap().source.len(), 1);

        // Revalidation replaces rather than accumulates markers.
        v.on_geometry_edited(&mut map, "7");
        assert_eq!(map.vector_layer(overlay).unwrap().source.len(), 1);

        v.clear_markers(&mut map);
        assert!(map.vector_layer(overlay).unwrap().source.is_empty());
        assert_eq!(v.on_geometry_edited(&mut map, "missing"), 0);
    }

    #[test]
    fn test_markers_never_added_to_attribute_editor_layer() {
        let layer = VectorLayer::new(ATTRIBUTE_EDITOR_LAYER).with_features(vec![Feature::new(bowtie()).with_id("p")]);
        let layer_id = layer.id;
        let mut map = MapModel::new();
        map.add_layer(Layer::Vector(layer));

        let mut v = GeometryValidator::new(true);
        assert_eq!(v.on_geometry_edited(&mut map, "p"), 1);
        assert_eq!(v.marker_count(), 0);
        assert_eq!(map.vector_layer(layer_id).unwrap().source.len(), 1);
    }

    #[test]
    fn test_markers_beside_drawn_feature_without_marker_layer() {
        let mut map = MapModel::new();
        let mut draw = VectorLayer::new("draw");
        let uid = draw.source.add_feature(Feature::new(bowtie()));
        let draw_id = map.add_layer(Layer::Vector(draw));

        let mut v = GeometryValidator::new(true);
        assert_eq!(v.validate_in_layer(&mut map, draw_id, uid), 1);
        assert_eq!(map.vector_layer(draw_id).unwrap().source.len(), 2);
    }
}
