use std::path::Path;

use anyhow::{bail, Context};
use evl_types::{ClusterEvent, NamespacedName};
use serde_json::Value;

/// Read cluster events from a file.
pub fn load_events(path: &Path) -> anyhow::Result<Vec<ClusterEvent>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading events from {}", path.display()))?;
    parse_events(&text).with_context(|| format!("parsing events in {}", path.display()))
}

/// Accepts a JSON array of events, an event list object with `items`
/// (as printed by the orchestrator's `get events -o json`), a single event
/// object, or one event per line.
pub fn parse_events(text: &str) -> anyhow::Result<Vec<ClusterEvent>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return match value {
            Value::Array(_) => Ok(serde_json::from_value(value)?),
            Value::Object(mut map) => match map.remove("items") {
                Some(items) => Ok(serde_json::from_value(items)?),
                None => Ok(vec![serde_json::from_value(Value::Object(map))?]),
            },
            _ => bail!("expected an event, a list of events, or JSON lines"),
        };
    }

    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", i + 1))
        })
        .collect()
}

/// Keep only the named events. An empty selection keeps everything.
pub fn select_events(events: Vec<ClusterEvent>, names: &[NamespacedName]) -> Vec<ClusterEvent> {
    if names.is_empty() {
        return events;
    }
    events
        .into_iter()
        .filter(|event| names.contains(&event.namespaced_name()))
        .collect()
}
