//! Cross-component event bus.
//!
//! Messages are a closed set of topics with typed payloads. Publishing
//! invokes every matching subscriber synchronously, in subscription order,
//! before returning.

use crate::geometry::{Geometry, GeometryKind};
use crate::identity::{CanonicalId, SnapshotRow};
use crate::layer::LayerId;
use serde::{Deserialize, Serialize};

/// `source` value for selections originating from map clicks.
pub const SOURCE_MAP: &str = "map";

/// How an incoming id list combines with the current selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectMode {
    #[default]
    Replace,
    Toggle,
}

/// Which interactions a host allows on an external layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowInteractions {
    pub select: bool,
    pub translate: bool,
    pub modify: bool,
}

impl Default for AllowInteractions {
    fn default() -> Self {
        Self {
            select: true,
            translate: true,
            modify: true,
        }
    }
}

/// Geometry capability reported by the attribute service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSchema {
    pub service_id: String,
    #[serde(default)]
    pub geometry_kind: Option<GeometryKind>,
    #[serde(default = "default_true")]
    pub geometry_editable: bool,
}

fn default_true() -> bool {
    true
}

/// Before/after record of one feature's geometry edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryEdit {
    pub id: CanonicalId,
    pub before: Option<Geometry>,
    pub after: Option<Geometry>,
    /// Milliseconds since the Unix epoch.
    pub when: u64,
}

/// Bus topic names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    SelectIds,
    FocusId,
    ToggleDeleteIds,
    RequestSchema,
    SchemaLoaded,
    Snapshot,
    GeometryEdited,
    AeTranslate,
    AeRotate,
    AttachExternalLayer,
    DisableInteractions,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::SelectIds => "attrib:select-ids",
            Topic::FocusId => "attrib:focus-id",
            Topic::ToggleDeleteIds => "attrib:toggle-delete-ids",
            Topic::RequestSchema => "attrib:request-schema",
            Topic::SchemaLoaded => "attrib:schema-loaded",
            Topic::Snapshot => "attrib:snapshot",
            Topic::GeometryEdited => "sketch:geometry-edited",
            Topic::AeTranslate => "sketch:ae-translate",
            Topic::AeRotate => "sketch:ae-rotate",
            Topic::AttachExternalLayer => "sketch.attachExternalLayer",
            Topic::DisableInteractions => "sketch:disable-ae-interactions",
        }
    }
}

/// A message on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "detail")]
pub enum BusMessage {
    #[serde(rename = "attrib:select-ids")]
    SelectIds {
        ids: Vec<CanonicalId>,
        #[serde(default)]
        source: String,
        #[serde(default)]
        mode: SelectMode,
    },
    #[serde(rename = "attrib:focus-id")]
    FocusId {
        #[serde(default)]
        id: Option<CanonicalId>,
    },
    #[serde(rename = "attrib:toggle-delete-ids")]
    ToggleDeleteIds { ids: Vec<CanonicalId>, source: String },
    #[serde(rename = "attrib:request-schema")]
    RequestSchema {
        #[serde(rename = "serviceId")]
        service_id: String,
    },
    #[serde(rename = "attrib:schema-loaded")]
    SchemaLoaded(LayerSchema),
    #[serde(rename = "attrib:snapshot")]
    Snapshot { rows: Vec<SnapshotRow> },
    #[serde(rename = "sketch:geometry-edited")]
    GeometryEdited(GeometryEdit),
    #[serde(rename = "sketch:ae-translate")]
    AeTranslate {
        distance: f64,
        #[serde(rename = "angleDeg")]
        angle_deg: f64,
    },
    #[serde(rename = "sketch:ae-rotate")]
    AeRotate {
        degrees: f64,
        #[serde(default)]
        clockwise: bool,
    },
    #[serde(rename = "sketch.attachExternalLayer")]
    AttachExternalLayer {
        layer: LayerId,
        #[serde(default)]
        allow: AllowInteractions,
        #[serde(default, rename = "serviceId", skip_serializing_if = "Option::is_none")]
        service_id: Option<String>,
    },
    #[serde(rename = "sketch:disable-ae-interactions")]
    DisableInteractions { disable: bool },
}

impl BusMessage {
    pub fn topic(&self) -> Topic {
        match self {
            BusMessage::SelectIds { .. } => Topic::SelectIds,
            BusMessage::FocusId { .. } => Topic::FocusId,
            BusMessage::ToggleDeleteIds { .. } => Topic::ToggleDeleteIds,
            BusMessage::RequestSchema { .. } => Topic::RequestSchema,
            BusMessage::SchemaLoaded(_) => Topic::SchemaLoaded,
            BusMessage::Snapshot { .. } => Topic::Snapshot,
            BusMessage::GeometryEdited(_) => Topic::GeometryEdited,
            BusMessage::AeTranslate { .. } => Topic::AeTranslate,
            BusMessage::AeRotate { .. } => Topic::AeRotate,
            BusMessage::AttachExternalLayer { .. } => Topic::AttachExternalLayer,
            BusMessage::DisableInteractions { .. } => Topic::DisableInteractions,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&BusMessage)>;

struct Subscriber {
    id: SubscriptionId,
    /// None receives every topic.
    topic: Option<Topic>,
    handler: Handler,
}

/// Synchronous fan-out pub/sub.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one topic, or to all topics with `None`.
    pub fn subscribe(&mut self, topic: Option<Topic>, handler: impl FnMut(&BusMessage) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(Subscriber {
            id,
            topic,
            handler: Box::new(handler),
        });
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        before != self.subscribers.len()
    }

    /// Deliver `message` to every matching subscriber. Returns the number reached.
    pub fn publish(&mut self, message: &BusMessage) -> usize {
        let topic = message.topic();
        let mut delivered = 0;
        for sub in self.subscribers.iter_mut() {
            if sub.topic.is_none_or(|t| t == topic) {
                (sub.handler)(message);
                delivered += 1;
            }
        }
        log::trace!("bus: {} -> {} subscriber(s)", topic.as_str(), delivered);
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
