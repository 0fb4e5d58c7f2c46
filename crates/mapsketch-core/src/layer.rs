//! Layer tree and vector sources owned by the host map.

use crate::feature::{Feature, FeatureUid};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known name of layers the synchronizer attaches interactions to.
pub const ATTRIBUTE_EDITOR_LAYER: &str = "attributeeditor";

/// Unique identifier for layers.
pub type LayerId = Uuid;

/// Ordered container of features.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorSource {
    features: Vec<Feature>,
}

impl VectorSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_features(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn features_mut(&mut self) -> impl Iterator<Item = &mut Feature> {
        self.features.iter_mut()
    }

    /// Add a feature, returning its uid.
    pub fn add_feature(&mut self, feature: Feature) -> FeatureUid {
        let uid = feature.uid;
        self.features.push(feature);
        uid
    }

    pub fn remove_feature(&mut self, uid: FeatureUid) -> Option<Feature> {
        let pos = self.features.iter().position(|f| f.uid == uid)?;
        Some(self.features.remove(pos))
    }

    /// Remove every feature matching the predicate, returning how many went.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&Feature) -> bool) -> usize {
        let before = self.features.len();
        self.features.retain(|f| !predicate(f));
        before - self.features.len()
    }

    pub fn get(&self, uid: FeatureUid) -> Option<&Feature> {
        self.features.iter().find(|f| f.uid == uid)
    }

    pub fn get_mut(&mut self, uid: FeatureUid) -> Option<&mut Feature> {
        self.features.iter_mut().find(|f| f.uid == uid)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// A named, visibility-flagged container of features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorLayer {
    #[serde(default = "Uuid::new_v4")]
    pub id: LayerId,
    pub name: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub source: VectorSource,
    /// Bumped whenever a redraw is forced.
    #[serde(skip)]
    revision: u64,
}

fn default_visible() -> bool {
    true
}

impl VectorLayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            visible: true,
            source: VectorSource::new(),
            revision: 0,
        }
    }

    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.source = VectorSource::from_features(features);
        self
    }

    pub fn is_attribute_editor(&self) -> bool {
        self.name == ATTRIBUTE_EDITOR_LAYER
    }

    /// Force a redraw of the layer.
    pub fn changed(&mut self) {
        self.revision += 1;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Group of nested layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerGroup {
    #[serde(default = "Uuid::new_v4")]
    pub id: LayerId,
    pub name: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

/// Raster/tile layer. Has no features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileLayer {
    #[serde(default = "Uuid::new_v4")]
    pub id: LayerId,
    pub name: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

/// A node in the host's layer tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layer {
    Vector(VectorLayer),
    Group(LayerGroup),
    Tile(TileLayer),
}

impl Layer {
    pub fn id(&self) -> LayerId {
        match self {
            Layer::Vector(l) => l.id,
            Layer::Group(g) => g.id,
            Layer::Tile(t) => t.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Layer::Vector(l) => &l.name,
            Layer::Group(g) => &g.name,
            Layer::Tile(t) => &t.name,
        }
    }

    pub fn is_visible(&self) -> bool {
        match self {
            Layer::Vector(l) => l.visible,
            Layer::Group(g) => g.visible,
            Layer::Tile(t) => t.visible,
        }
    }

    fn set_visible(&mut self, visible: bool) {
        match self {
            Layer::Vector(l) => l.visible = visible,
            Layer::Group(g) => g.visible = visible,
            Layer::Tile(t) => t.visible = visible,
        }
    }

    /// The vector capability of this layer, if it has one.
    pub fn as_vector(&self) -> Option<&VectorLayer> {
        match self {
            Layer::Vector(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_vector_mut(&mut self) -> Option<&mut VectorLayer> {
        match self {
            Layer::Vector(l) => Some(l),
            _ => None,
        }
    }
}

/// The host map's layer tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapModel {
    #[serde(default)]
    pub layers: Vec<Layer>,
}

impl MapModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer at the top level, returning its id.
    pub fn add_layer(&mut self, layer: Layer) -> LayerId {
        let id = layer.id();
        self.layers.push(layer);
        id
    }

    /// Remove a layer anywhere in the tree.
    pub fn remove_layer(&mut self, id: LayerId) -> Option<Layer> {
        fn remove(layers: &mut Vec<Layer>, id: LayerId) -> Option<Layer> {
            if let Some(pos) = layers.iter().position(|l| l.id() == id) {
                return Some(layers.remove(pos));
            }
            layers.iter_mut().find_map(|l| match l {
                Layer::Group(g) => remove(&mut g.layers, id),
                _ => None,
            })
        }
        remove(&mut self.layers, id)
    }

    /// Set a layer's own visibility flag. Returns false if no such layer.
    pub fn set_visible(&mut self, id: LayerId, visible: bool) -> bool {
        fn walk(layers: &mut [Layer], id: LayerId, visible: bool) -> bool {
            for layer in layers.iter_mut() {
                if layer.id() == id {
                    layer.set_visible(visible);
                    return true;
                }
                if let Layer::Group(g) = layer {
                    if walk(&mut g.layers, id, visible) {
                        return true;
                    }
                }
            }
            false
        }
        walk(&mut self.layers, id, visible)
    }

    /// Every vector layer paired with its effective visibility
    /// (own flag and all ancestor groups).
    pub fn vector_layers(&self) -> Vec<(&VectorLayer, bool)> {
        fn collect<'a>(layers: &'a [Layer], parent_visible: bool, out: &mut Vec<(&'a VectorLayer, bool)>) {
            for layer in layers {
                match layer {
                    Layer::Vector(l) => out.push((l, parent_visible && l.visible)),
                    Layer::Group(g) => collect(&g.layers, parent_visible && g.visible, out),
                    Layer::Tile(_) => {}
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.layers, true, &mut out);
        out
    }

    /// Vector layers that are currently visible.
    pub fn visible_vector_layers(&self) -> Vec<&VectorLayer> {
        self.vector_layers()
            .into_iter()
            .filter_map(|(l, visible)| visible.then_some(l))
            .collect()
    }

    pub fn vector_layer(&self, id: LayerId) -> Option<&VectorLayer> {
        self.vector_layers()
            .into_iter()
            .map(|(l, _)| l)
            .find(|l| l.id == id)
    }

    pub fn vector_layer_mut(&mut self, id: LayerId) -> Option<&mut VectorLayer> {
        fn find(layers: &mut [Layer], id: LayerId) -> Option<&mut VectorLayer> {
            for layer in layers.iter_mut() {
                match layer {
                    Layer::Vector(l) if l.id == id => return Some(l),
                    Layer::Group(g) => {
                        if let Some(found) = find(&mut g.layers, id) {
                            return Some(found);
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        find(&mut self.layers, id)
    }

    /// First vector layer with the given name.
    pub fn vector_layer_by_name(&self, name: &str) -> Option<&VectorLayer> {
        self.vector_layers()
            .into_iter()
            .map(|(l, _)| l)
            .find(|l| l.name == name)
    }

    /// Locate a feature by uid across all vector layers.
    pub fn find_feature(&self, uid: FeatureUid) -> Option<(LayerId, &Feature)> {
        self.vector_layers()
            .into_iter()
            .find_map(|(l, _)| l.source.get(uid).map(|f| (l.id, f)))
    }

    pub fn feature_mut(&mut self, layer: LayerId, uid: FeatureUid) -> Option<&mut Feature> {
        self.vector_layer_mut(layer)?.source.get_mut(uid)
    }
}
