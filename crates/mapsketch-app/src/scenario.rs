//! Scripted scenarios: a map, a view and timed steps to replay against a
//! sketch session.

use kurbo::Point;
use mapsketch_core::bus::BusMessage;
use mapsketch_core::validate::Toast;
use mapsketch_core::{
    Activity, MapEvent, MapModel, MapView, Modifiers, SketchConfig, SketchError, SketchResult, SketchSession,
    Viewport,
};
use mapsketch_core::timer::{Duration, Instant};
use serde::{Deserialize, Serialize};

/// One scripted action.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Activity { activity: Activity },
    Window { visible: bool },
    Snap {
        #[serde(default)]
        enabled: Option<bool>,
        #[serde(default)]
        tolerance: Option<f64>,
    },
    /// Raw host map event.
    Map { event: MapEvent },
    /// Message published on the bus by another surface.
    Bus { message: BusMessage },
    /// Click the first vertex of a feature, found by identity in a named layer.
    Click {
        layer: String,
        feature: String,
        #[serde(default)]
        modifiers: Modifiers,
    },
    RotateStart {
        degrees: f64,
        #[serde(default)]
        clockwise: bool,
    },
    RotateStop,
    /// Snap a coordinate and report the result.
    SnapPoint { coordinate: Point },
    /// Report the measurement label of a feature.
    Measure { layer: String, feature: String },
    /// Advance timers only.
    Tick,
}

/// A step with its offset from the scenario start.
#[derive(Debug, Clone, Deserialize)]
pub struct TimedStep {
    #[serde(default)]
    pub at_ms: u64,
    #[serde(flatten)]
    pub step: Step,
}

/// A complete scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: SketchConfig,
    #[serde(default)]
    pub view: Viewport,
    #[serde(default)]
    pub map: MapModel,
    #[serde(default)]
    pub steps: Vec<TimedStep>,
}

impl Scenario {
    pub fn from_json(json: &str) -> SketchResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One line of replay output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputLine {
    Bus { at_ms: u64, message: BusMessage },
    Toast { at_ms: u64, toast: Toast },
    Snap { at_ms: u64, input: Point, snapped: Point },
    Measurement { at_ms: u64, feature: String, label: String },
}

/// Replay `scenario`, returning every observable output in order.
pub fn replay(scenario: Scenario) -> SketchResult<Vec<OutputLine>> {
    let Scenario { config, view, map, steps } = scenario;
    let mut session = SketchSession::new(config, map, view);
    let start = Instant::now();
    let mut out = Vec::new();

    for TimedStep { at_ms, step } in steps {
        let now = start + Duration::from_millis(at_ms);
        session.tick(now);
        match step {
            Step::Activity { activity } => session.set_activity(activity),
            Step::Window { visible } => session.set_window_visible(visible),
            Step::Snap { enabled, tolerance } => {
                if let Some(enabled) = enabled {
                    session.set_snap_enabled(enabled);
                }
                if let Some(tolerance) = tolerance {
                    session.set_snap_tolerance(tolerance);
                }
            }
            Step::Map { event } => session.handle_map_event(&event, now),
            Step::Bus { message } => session.publish(message),
            Step::Click { layer, feature, modifiers } => {
                let (_, coordinate) = locate(&session, &layer, &feature)?;
                let pixel = session.view.pixel_from_coordinate(coordinate);
                session.handle_map_event(&MapEvent::SingleClick { pixel, modifiers }, now);
            }
            Step::RotateStart { degrees, clockwise } => session.start_rotate(degrees, clockwise, now),
            Step::RotateStop => session.stop_rotate(),
            Step::SnapPoint { coordinate } => out.push(OutputLine::Snap {
                at_ms,
                input: coordinate,
                snapped: session.snap_coordinate(coordinate),
            }),
            Step::Measure { layer, feature } => {
                let (uid, _) = locate(&session, &layer, &feature)?;
                let label = session.measure_feature(uid).unwrap_or_default();
                out.push(OutputLine::Measurement { at_ms, feature, label });
            }
            Step::Tick => {}
        }
        drain(&mut session, at_ms, &mut out);
    }

    session.teardown();
    Ok(out)
}

fn drain(session: &mut SketchSession, at_ms: u64, out: &mut Vec<OutputLine>) {
    out.extend(
        session
            .take_outgoing()
            .into_iter()
            .map(|message| OutputLine::Bus { at_ms, message }),
    );
    out.extend(
        session
            .take_toasts()
            .into_iter()
            .map(|toast| OutputLine::Toast { at_ms, toast }),
    );
}

/// Find a feature by any identity value in the named layer.
fn locate(session: &SketchSession, layer: &str, feature: &str) -> SketchResult<(mapsketch_core::FeatureUid, Point)> {
    let layer = session
        .map
        .vector_layer_by_name(layer)
        .ok_or_else(|| SketchError::LayerNotFound(layer.to_string()))?;
    layer
        .source
        .features()
        .iter()
        .find(|f| f.identity_values().iter().any(|v| v == feature))
        .and_then(|f| Some((f.uid, f.geometry()?.first_coordinate()?)))
        .ok_or_else(|| SketchError::FeatureNotFound(feature.to_string()))
}
