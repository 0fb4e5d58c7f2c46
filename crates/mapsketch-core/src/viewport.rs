//! Map view: coordinate/pixel conversion and hit-testing.

use crate::feature::{Feature, FeatureUid, props};
use crate::geometry::{Geometry, closest_point_on_segment, polygon_contains};
use crate::layer::{LayerId, MapModel, VectorLayer};
use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// A feature found under a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureHit {
    pub layer: LayerId,
    pub feature: FeatureUid,
}

/// Projection and hit-testing provided by the host map engine.
pub trait MapView {
    /// Convert a map coordinate to a screen pixel.
    fn pixel_from_coordinate(&self, coordinate: Point) -> Point;

    /// Convert a screen pixel to a map coordinate.
    fn coordinate_from_pixel(&self, pixel: Point) -> Point;

    /// Features under `pixel` within `tolerance` pixels, topmost first.
    ///
    /// Only visible vector layers are considered, and hidden features are
    /// skipped. `filter` narrows the candidates further.
    fn features_at_pixel(
        &self,
        map: &MapModel,
        pixel: Point,
        tolerance: f64,
        filter: &dyn Fn(&VectorLayer, &Feature) -> bool,
    ) -> Vec<FeatureHit> {
        let tol_sq = tolerance * tolerance;
        let mut hits = Vec::new();
        for layer in map.visible_vector_layers().into_iter().rev() {
            for feature in layer.source.features().iter().rev() {
                if feature.flag(props::HIDDEN) || !filter(layer, feature) {
                    continue;
                }
                let Some(geometry) = feature.geometry() else {
                    continue;
                };
                if geometry_hit(self, geometry, pixel, tol_sq) {
                    hits.push(FeatureHit { layer: layer.id, feature: feature.uid });
                }
            }
        }
        hits
    }
}

/// Pixel-space hit test for a single geometry.
fn geometry_hit<V: MapView + ?Sized>(view: &V, geometry: &Geometry, pixel: Point, tol_sq: f64) -> bool {
    let near = |p: Point| (view.pixel_from_coordinate(p) - pixel).hypot2() <= tol_sq;
    if geometry.vertices().into_iter().any(near) {
        return true;
    }
    let coordinate = view.coordinate_from_pixel(pixel);
    let on_edge = geometry.edges().into_iter().any(|(a, b)| {
        let pa = view.pixel_from_coordinate(a);
        let pb = view.pixel_from_coordinate(b);
        (closest_point_on_segment(pixel, pa, pb) - pixel).hypot2() <= tol_sq
    });
    if on_edge {
        return true;
    }
    match geometry {
        Geometry::Polygon(rings) => polygon_contains(rings, coordinate),
        Geometry::MultiPolygon(polygons) => polygons.iter().any(|rings| polygon_contains(rings, coordinate)),
        _ => false,
    }
}

/// Orthographic map viewport.
///
/// Map y grows upward, pixel y grows downward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    /// Map coordinate at the centre of the screen.
    pub center: Point,
    /// Map units per pixel.
    pub resolution: f64,
    /// Screen size in pixels.
    pub size: Size,
    pub min_resolution: f64,
    pub max_resolution: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            center: Point::ZERO,
            resolution: 1.0,
            size: Size::new(800.0, 600.0),
            min_resolution: 0.01,
            max_resolution: 100_000.0,
        }
    }
}

impl Viewport {
    pub fn new(center: Point, resolution: f64, size: Size) -> Self {
        Self {
            center,
            resolution,
            size,
            ..Self::default()
        }
    }

    /// Transform from map coordinates to pixels.
    pub fn transform(&self) -> Affine {
        Affine::translate(Vec2::new(self.size.width / 2.0, self.size.height / 2.0))
            * Affine::scale_non_uniform(1.0 / self.resolution, -1.0 / self.resolution)
            * Affine::translate(-self.center.to_vec2())
    }

    /// Transform from pixels to map coordinates.
    pub fn inverse_transform(&self) -> Affine {
        self.transform().inverse()
    }

    /// Zoom by `factor` keeping the given pixel fixed. Factors above 1 zoom in.
    pub fn zoom_at(&mut self, pixel: Point, factor: f64) {
        let new_resolution = (self.resolution / factor).clamp(self.min_resolution, self.max_resolution);
        if (new_resolution - self.resolution).abs() < f64::EPSILON {
            return;
        }
        let anchor = self.coordinate_from_pixel(pixel);
        self.resolution = new_resolution;
        let drift = anchor - self.coordinate_from_pixel(pixel);
        self.center += drift;
    }

    /// Pan by a pixel delta.
    pub fn pan(&mut self, delta: Vec2) {
        self.center += Vec2::new(-delta.x * self.resolution, delta.y * self.resolution);
    }

    /// Fit the view to a map extent with pixel padding.
    pub fn fit_to_extent(&mut self, extent: Rect, padding: f64) {
        let width = (self.size.width - padding * 2.0).max(1.0);
        let height = (self.size.height - padding * 2.0).max(1.0);
        self.center = extent.center();
        if extent.width() > 0.0 || extent.height() > 0.0 {
            self.resolution = (extent.width() / width)
                .max(extent.height() / height)
                .clamp(self.min_resolution, self.max_resolution);
        }
    }
}

impl MapView for Viewport {
    fn pixel_from_coordinate(&self, coordinate: Point) -> Point {
        self.transform() * coordinate
    }

    fn coordinate_from_pixel(&self, pixel: Point) -> Point {
        self.inverse_transform() * pixel
    }
}
