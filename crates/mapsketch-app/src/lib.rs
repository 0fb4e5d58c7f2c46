//! MapSketch Application
//!
//! Replay shell: loads a scripted scenario, drives a sketch session with it
//! and reports every bus message and toast the session produces.

mod scenario;

pub use scenario::{OutputLine, Scenario, Step, TimedStep, replay};

use mapsketch_core::SketchError;
use std::io::Write;
use thiserror::Error;

/// Errors surfaced by the shell.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Sketch(#[from] SketchError),
}

/// Replay the scenario in `json` and write one JSON object per output line.
pub fn run(json: &str, mut writer: impl Write) -> Result<usize, AppError> {
    let scenario = Scenario::from_json(json)?;
    log::info!("Replaying {} step(s)", scenario.steps.len());
    let lines = replay(scenario)?;
    for line in &lines {
        let encoded = serde_json::to_string(line).map_err(SketchError::from)?;
        writeln!(writer, "{encoded}")?;
    }
    Ok(lines.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO: &str = include_str!("../scenarios/select_rotate.json");

    #[test]
    fn test_demo_scenario_emits_json_lines() {
        let mut buf = Vec::new();
        let count = run(DEMO, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), count);
        for line in text.lines() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("kind").is_some());
        }
        // Editing the bowtie parcel raises a self-intersection warning.
        assert!(text.contains("självkorsning"));
        assert!(text.contains("sketch:geometry-edited"));
    }

    #[test]
    fn test_invalid_json_reports_error() {
        let err = run("{", Vec::new()).unwrap_err();
        assert!(matches!(err, AppError::Sketch(SketchError::Serialization(_))));
    }
}
