//! Rendering of events and node lists for the command line.

use crate::bus::NodeInfo;
use crate::error::Result;
use crate::monitor::{LifecycleEvent, SubscriptionId};
use chrono::{DateTime, Local, Utc};
use clap::ValueEnum;
use serde::Serialize;
use std::fmt;
use std::io::Write;

/// Output format for events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One human-readable line per event.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Serialize)]
struct EventRecord<'a> {
    received_at: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a LifecycleEvent,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    subscriptions: &'a [SubscriptionId],
}

/// Writes events and node lists in the selected format.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    format: OutputFormat,
    timestamps: bool,
}

impl Renderer {
    /// Creates a renderer. `timestamps` only affects text output.
    pub fn new(format: OutputFormat, timestamps: bool) -> Self {
        Self { format, timestamps }
    }

    /// Renders one event received at `received_at`, without a trailing newline.
    ///
    /// `subscriptions` lists the subscriptions the event falls under. Only
    /// JSON output carries them.
    pub fn render_event(
        &self,
        event: &LifecycleEvent,
        subscriptions: &[SubscriptionId],
        received_at: DateTime<Utc>,
    ) -> Result<String> {
        match self.format {
            OutputFormat::Text if self.timestamps => Ok(format!(
                "{} {}",
                received_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S%.3f"),
                event
            )),
            OutputFormat::Text => Ok(event.to_string()),
            OutputFormat::Json => Ok(serde_json::to_string(&EventRecord {
                received_at,
                event,
                subscriptions,
            })?),
        }
    }

    /// Writes one event line to `out`.
    pub fn write_event<W: Write>(
        &self,
        out: &mut W,
        event: &LifecycleEvent,
        subscriptions: &[SubscriptionId],
    ) -> Result<()> {
        let line = self.render_event(event, subscriptions, Utc::now())?;
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }

    /// Writes a node list to `out`.
    pub fn write_nodes<W: Write>(&self, out: &mut W, nodes: &[NodeInfo]) -> Result<()> {
        match self.format {
            OutputFormat::Text => {
                let width = nodes.iter().map(|n| n.name.len()).max().unwrap_or(0).max(4);
                writeln!(out, "{:<width$}  STATUS", "NODE", width = width)?;
                for node in nodes {
                    writeln!(out, "{:<width$}  {}", node.name, node.status, width = width)?;
                }
            }
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(nodes)?;
                writeln!(out, "{}", json)?;
            }
        }
        Ok(())
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(OutputFormat::Text, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event() -> LifecycleEvent {
        LifecycleEvent::UnitRemoved {
            node_name: "worker1".to_string(),
            unit_name: "nginx.service".to_string(),
            reason: "real".to_string(),
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_text_line() {
        let line = Renderer::default().render_event(&event(), &[], at()).unwrap();
        assert_eq!(line, "Removed Unit nginx.service on node worker1, reason: real");
    }

    #[test]
    fn test_text_line_with_timestamp() {
        let line = Renderer::new(OutputFormat::Text, true)
            .render_event(&event(), &[], at())
            .unwrap();
        assert!(line.ends_with(" Removed Unit nginx.service on node worker1, reason: real"));
        assert!(line.len() > "Removed Unit nginx.service on node worker1, reason: real".len());
    }

    #[test]
    fn test_json_record() {
        let line = Renderer::new(OutputFormat::Json, true)
            .render_event(&event(), &[], at())
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(json["event"], "unit_removed");
        assert_eq!(json["node_name"], "worker1");
        assert_eq!(json["unit_name"], "nginx.service");
        assert_eq!(json["received_at"], "2024-03-01T12:30:00Z");
        assert!(json.get("subscriptions").is_none());
    }

    #[test]
    fn test_json_record_lists_subscriptions() {
        let ids = [SubscriptionId(3), SubscriptionId(7)];
        let line = Renderer::new(OutputFormat::Json, false)
            .render_event(&event(), &ids, at())
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(json["subscriptions"], serde_json::json!([3, 7]));

        let text = Renderer::default().render_event(&event(), &ids, at()).unwrap();
        assert_eq!(text, "Removed Unit nginx.service on node worker1, reason: real");
    }

    #[test]
    fn test_write_event_appends_newline() {
        let mut out = Vec::new();
        Renderer::default().write_event(&mut out, &event(), &[]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("reason: real\n"));
    }

    #[test]
    fn test_write_nodes_text() {
        let nodes = vec![
            NodeInfo {
                name: "worker1".to_string(),
                object_path: "/org/eclipse/bluechi/node/worker1".to_string(),
                status: "online".to_string(),
            },
            NodeInfo {
                name: "w2".to_string(),
                object_path: "/org/eclipse/bluechi/node/w2".to_string(),
                status: "offline".to_string(),
            },
        ];

        let mut out = Vec::new();
        Renderer::default().write_nodes(&mut out, &nodes).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "NODE     STATUS");
        assert_eq!(lines[1], "worker1  online");
        assert_eq!(lines[2], "w2       offline");
    }

    #[test]
    fn test_write_nodes_json() {
        let nodes = vec![NodeInfo {
            name: "worker1".to_string(),
            object_path: "/org/eclipse/bluechi/node/worker1".to_string(),
            status: "online".to_string(),
        }];

        let mut out = Vec::new();
        Renderer::new(OutputFormat::Json, false)
            .write_nodes(&mut out, &nodes)
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json[0]["status"], "online");
    }
}
