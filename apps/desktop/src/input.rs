//! One JSON document per stdin line: a detector frame or a control line.

use client_core::{CoreError, DetectionCycle, DetectorAdapter};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Control {
    Pause,
    Resume,
}

#[derive(Debug, Deserialize)]
struct ControlLine {
    control: Control,
}

#[derive(Debug, PartialEq)]
pub enum InputLine {
    Cycle(DetectionCycle),
    Control(Control),
    Blank,
}

pub fn parse_line(line: &str, adapter: &dyn DetectorAdapter) -> Result<InputLine, CoreError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(InputLine::Blank);
    }

    let value: serde_json::Value = serde_json::from_str(line)?;
    if value.get("control").is_some() {
        let control: ControlLine = serde_json::from_value(value)?;
        return Ok(InputLine::Control(control.control));
    }
    adapter.adapt_json(line).map(InputLine::Cycle)
}
