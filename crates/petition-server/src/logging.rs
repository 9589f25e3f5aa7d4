use std::{collections::VecDeque, sync::Arc};

use tokio::sync::broadcast;

/// Lines kept for late SSE subscribers and `/api/logs/recent`.
pub(crate) const RING_CAPACITY: usize = 500;

pub(crate) type LogRing = Arc<std::sync::Mutex<VecDeque<String>>>;

/// Mirrors every event as a JSON line into a broadcast channel and a
/// bounded ring.
pub(crate) struct BroadcastLayer {
    pub tx: broadcast::Sender<String>,
    pub ring: LogRing,
}

struct MessageVisitor<'a> {
    message: &'a mut String,
    session_id: &'a mut Option<String>,
}

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => *self.message = value.to_string(),
            "session_id" => *self.session_id = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        use std::fmt::Write;
        match field.name() {
            "message" => {
                self.message.clear();
                let _ = write!(self.message, "{value:?}");
                // Strip surrounding quotes added by Debug on &str
                if self.message.len() >= 2 && self.message.starts_with('"') && self.message.ends_with('"') {
                    *self.message = self.message[1..self.message.len() - 1].to_string();
                }
            }
            "session_id" => {
                let mut s = String::new();
                let _ = write!(s, "{value:?}");
                *self.session_id = Some(s.trim_matches('"').to_string());
            }
            _ => {}
        }
    }
}

/// Dashboard category for an event target (a module path).
pub(crate) fn category(target: &str) -> &'static str {
    if target.contains("retrieval") || target.contains("index") || target.contains("embed") {
        "retrieval"
    } else if target.contains("generator")
        || target.contains("petition_agent")
        || target.contains("ollama")
        || target.contains("gemini")
    {
        "generation"
    } else if target.contains("workflow") || target.contains("feedback") || target.contains("validate") {
        "workflow"
    } else {
        "system"
    }
}

pub(crate) fn push_bounded(ring: &mut VecDeque<String>, line: String) {
    ring.push_back(line);
    while ring.len() > RING_CAPACITY {
        ring.pop_front();
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for BroadcastLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = match *event.metadata().level() {
            tracing::Level::ERROR => "err",
            tracing::Level::WARN => "warn",
            tracing::Level::INFO => "info",
            tracing::Level::DEBUG => "debug",
            tracing::Level::TRACE => return,
        };

        let mut message = String::new();
        let mut session_id = None;
        event.record(&mut MessageVisitor {
            message: &mut message,
            session_id: &mut session_id,
        });

        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut json = serde_json::json!({
            "ts": ts,
            "level": level,
            "message": message,
            "category": category(event.metadata().target()),
        });
        if let Some(id) = session_id {
            json["session_id"] = serde_json::Value::String(id);
        }
        let json = json.to_string();

        let _ = self.tx.send(json.clone());
        if let Ok(mut ring) = self.ring.lock() {
            push_bounded(&mut ring, json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_map_to_categories() {
        assert_eq!(category("petition_core::workflow"), "workflow");
        assert_eq!(category("petition_core::feedback"), "workflow");
        assert_eq!(category("petition_core::retrieval"), "retrieval");
        assert_eq!(category("petition_core::index"), "retrieval");
        assert_eq!(category("petition_core::generator"), "generation");
        assert_eq!(category("petition_agent::ollama"), "generation");
        assert_eq!(category("tower_http::trace::on_response"), "system");
    }

    #[test]
    fn ring_drops_oldest_lines() {
        let mut ring = VecDeque::new();
        for i in 0..RING_CAPACITY + 3 {
            push_bounded(&mut ring, i.to_string());
        }
        assert_eq!(ring.len(), RING_CAPACITY);
        assert_eq!(ring.front().map(String::as_str), Some("3"));
    }

    #[test]
    fn layer_captures_message_and_session() {
        use tracing_subscriber::prelude::*;

        let (tx, mut rx) = broadcast::channel(16);
        let ring: LogRing = Arc::default();
        let layer = BroadcastLayer {
            tx,
            ring: Arc::clone(&ring),
        };
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(session_id = "pet-1", "structure retrieval degraded");
        });

        let line = rx.try_recv().unwrap();
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["level"], "warn");
        assert_eq!(v["message"], "structure retrieval degraded");
        assert_eq!(v["session_id"], "pet-1");
        assert_eq!(ring.lock().unwrap().len(), 1);
    }
}
