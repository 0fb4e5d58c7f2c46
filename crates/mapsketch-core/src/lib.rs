//! MapSketch Core Library
//!
//! Platform-agnostic snapping, angle guides, measurement, validation and
//! attribute-editor selection sync for map sketching.

pub mod bus;
pub mod config;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod guides;
pub mod identity;
pub mod input;
pub mod layer;
pub mod measure;
pub mod registry;
pub mod selection;
pub mod session;
pub mod snap;
pub mod synchronizer;
pub mod timer;
pub mod validate;
pub mod viewport;

pub use bus::{BusMessage, EventBus, GeometryEdit, SelectMode, Topic};
pub use config::SketchConfig;
pub use error::{SketchError, SketchResult};
pub use feature::{Feature, FeatureUid};
pub use geometry::Geometry;
pub use guides::AngleGuides;
pub use identity::{AttributeSnapshot, CanonicalId};
pub use input::{MapEvent, Modifiers};
pub use layer::{Layer, LayerId, MapModel, VectorLayer};
pub use measure::{MeasurementSettings, measure};
pub use registry::Activity;
pub use session::SketchSession;
pub use snap::{SnapEngine, SnapHit, SnapTargetKind};
pub use synchronizer::Synchronizer;
pub use validate::{GeometryValidator, Toast};
pub use viewport::{MapView, Viewport};
