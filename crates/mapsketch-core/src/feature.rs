//! Map features: identity, geometry and a mutable property bag.

use crate::geometry::Geometry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Internal handle for a feature, stable for its lifetime in a source.
///
/// Distinct from the feature's identity fields, which are what the bus
/// protocol talks about.
pub type FeatureUid = Uuid;

/// Property flags and well-known keys.
pub mod props {
    /// Feature was drawn by the user in the sketch surface.
    pub const USER_DRAWN: &str = "USER_DRAWN";
    /// Feature is selected in the attribute editor (renders node handles).
    pub const EDIT_ACTIVE: &str = "EDIT_ACTIVE";
    pub const HIDDEN: &str = "HIDDEN";
    /// Point marking a self-intersection.
    pub const KINK_MARKER: &str = "KINK_MARKER";
    /// Transient snapping aid; never persisted, snapped to or validated.
    pub const USER_MEASUREMENT_GUIDE: &str = "USER_MEASUREMENT_GUIDE";
    pub const DRAW_METHOD: &str = "DRAW_METHOD";
    /// Rendering-time measurement text.
    pub const MEASUREMENT_LABEL: &str = "MEASUREMENT_LABEL";
    /// Guide role ("owner" or "guide").
    pub const GUIDE_KIND: &str = "GUIDE_KIND";
    /// Stroke color as `#rrggbbaa`.
    pub const STROKE_COLOR: &str = "STROKE_COLOR";

    /// Foreign-key-style identity fields, in lookup order.
    pub const FID_FIELDS: [&str; 2] = ["@_fid", "fid"];
    /// Generic identity property.
    pub const ID_FIELD: &str = "id";
}

/// A map feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default = "Uuid::new_v4")]
    pub uid: FeatureUid,
    /// Explicit identifier, if the feature has one.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Bumped on every non-silent property or geometry change.
    #[serde(skip)]
    revision: u64,
}

impl Feature {
    /// Create a feature with a fresh uid and no identity.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            uid: Uuid::new_v4(),
            id: None,
            geometry: Some(geometry),
            properties: Map::new(),
            revision: 0,
        }
    }

    /// Builder: set the explicit identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder: set a property.
    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = Some(geometry);
        self.revision += 1;
    }

    /// Owned copy of the current geometry.
    pub fn clone_geometry(&self) -> Option<Geometry> {
        self.geometry.clone()
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Set a property, raising a change.
    pub fn set_property(&mut self, key: &str, value: impl Into<Value>) {
        self.properties.insert(key.to_string(), value.into());
        self.revision += 1;
    }

    /// Set a property without raising a change.
    pub fn set_property_silent(&mut self, key: &str, value: impl Into<Value>) {
        self.properties.insert(key.to_string(), value.into());
    }

    /// Whether a boolean flag property is set to `true`.
    pub fn flag(&self, key: &str) -> bool {
        self.properties.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_guide(&self) -> bool {
        self.flag(props::USER_MEASUREMENT_GUIDE)
    }

    /// Guides and kink markers: visual aids, never real geometry.
    pub fn is_overlay(&self) -> bool {
        self.is_guide() || self.flag(props::KINK_MARKER)
    }

    /// Foreign-key-style identity value (`@_fid` or `fid`).
    pub fn fid(&self) -> Option<String> {
        props::FID_FIELDS
            .iter()
            .find_map(|key| self.properties.get(*key).and_then(value_to_id))
    }

    /// Generic `id` property value.
    pub fn id_property(&self) -> Option<String> {
        self.properties.get(props::ID_FIELD).and_then(value_to_id)
    }

    /// Every identity value this feature carries, most specific first.
    pub fn identity_values(&self) -> Vec<String> {
        [self.id.clone(), self.fid(), self.id_property()]
            .into_iter()
            .flatten()
            .collect()
    }

    /// The raw identity used to derive a canonical id.
    pub fn raw_identity(&self) -> Option<String> {
        self.identity_values().into_iter().next()
    }
}

/// Convert an id-like JSON value to its string form.
fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
