//! Selection set and edit snapshots.

use crate::bus::GeometryEdit;
use crate::geometry::Geometry;
use crate::identity::CanonicalId;
use crate::timer::unix_millis;
use kurbo::{Affine, Point, Vec2};

/// Ordered set of canonical ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: Vec<CanonicalId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[CanonicalId] {
        &self.ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|s| s == id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Replace the whole selection, dropping duplicates but keeping order.
    pub fn replace(&mut self, ids: impl IntoIterator<Item = CanonicalId>) {
        self.ids.clear();
        for id in ids {
            if !self.contains(&id) {
                self.ids.push(id);
            }
        }
    }

    /// Add `id` if absent, remove it if present.
    pub fn toggle(&mut self, id: CanonicalId) {
        match self.ids.iter().position(|s| *s == id) {
            Some(pos) => {
                self.ids.remove(pos);
            }
            None => self.ids.push(id),
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

/// Which interaction an edit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Translate,
    Modify,
    Transform,
}

/// Geometry captured when an edit starts, one entry per canonical id.
#[derive(Debug, Clone)]
pub struct EditSnapshot {
    pub kind: EditKind,
    originals: Vec<(CanonicalId, Option<Geometry>)>,
}

impl EditSnapshot {
    pub fn new(kind: EditKind) -> Self {
        Self {
            kind,
            originals: Vec::new(),
        }
    }

    /// Record the pre-edit geometry for `id`. Later parts sharing the id
    /// keep the first capture.
    pub fn capture(&mut self, id: CanonicalId, geometry: Option<Geometry>) {
        if !self.originals.iter().any(|(existing, _)| *existing == id) {
            self.originals.push((id, geometry));
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &CanonicalId> {
        self.originals.iter().map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    /// One edit record per captured id, with `after` looked up by id.
    pub fn finish(self, mut after: impl FnMut(&str) -> Option<Geometry>) -> Vec<GeometryEdit> {
        let when = unix_millis();
        self.originals
            .into_iter()
            .map(|(id, before)| GeometryEdit {
                after: after(&id),
                id,
                before,
                when,
            })
            .collect()
    }
}

/// Offset for moving `distance` map units along a compass bearing in degrees.
pub fn bearing_offset(distance: f64, angle_deg: f64) -> Vec2 {
    let angle = angle_deg.to_radians();
    Vec2::new(distance * angle.sin(), distance * angle.cos())
}

/// Rotation about `center`; positive degrees turn counter-clockwise.
pub fn rotation_about(center: Point, degrees: f64, clockwise: bool) -> Affine {
    let signed = if clockwise { -degrees } else { degrees };
    Affine::rotate_about(signed.to_radians(), center)
}
