//! Pointer, keyboard and map lifecycle events delivered by the host.

use crate::feature::FeatureUid;
use crate::layer::LayerId;
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Modifier keys state, updated by the host's input layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Self = Self { shift: false, ctrl: false, alt: false, meta: false };

    /// Ctrl or Cmd held; activates angle guides.
    pub fn angle_snap(&self) -> bool {
        self.ctrl || self.meta
    }

    /// Any modifier that turns a click into a selection toggle.
    pub fn toggles_selection(&self) -> bool {
        self.ctrl || self.meta || self.shift
    }
}

/// Event from the host map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MapEvent {
    PointerMove { coordinate: Point },
    /// Pointer left the map or went idle.
    PointerLeave,
    SingleClick {
        pixel: Point,
        #[serde(default)]
        modifiers: Modifiers,
    },
    ModifiersChanged { modifiers: Modifiers },
    TranslateStart { layer: LayerId, features: Vec<FeatureUid> },
    TranslateEnd { layer: LayerId, features: Vec<FeatureUid> },
    ModifyStart { layer: LayerId, features: Vec<FeatureUid> },
    ModifyEnd { layer: LayerId, features: Vec<FeatureUid> },
    LayerAdded { layer: LayerId },
    LayerRemoved { layer: LayerId },
    LayerVisibilityChanged { layer: LayerId },
    /// A new sketch feature started; its first coordinate is the anchor.
    DrawStart { layer: LayerId, feature: FeatureUid },
    DrawAbort,
    /// A finished feature was added to a source.
    FeatureAdded { layer: LayerId, feature: FeatureUid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_roles() {
        let ctrl = Modifiers { ctrl: true, ..Modifiers::NONE };
        let shift = Modifiers { shift: true, ..Modifiers::NONE };
        let alt = Modifiers { alt: true, ..Modifiers::NONE };
        assert!(ctrl.angle_snap() && ctrl.toggles_selection());
        assert!(!shift.angle_snap() && shift.toggles_selection());
        assert!(!alt.angle_snap() && !alt.toggles_selection());
    }

    #[test]
    fn test_event_json() {
        let json = r#"{"event":"single_click","pixel":{"x":1.0,"y":2.0}}"#;
        let event: MapEvent = serde_json::from_str(json).unwrap();
        match event {
            MapEvent::SingleClick { pixel, modifiers } => {
                assert_eq!(pixel, Point::new(1.0, 2.0));
                assert_eq!(modifiers, Modifiers::NONE);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
