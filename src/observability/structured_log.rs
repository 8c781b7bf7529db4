/// 構造化JSON形式ログ。
use serde_json::json;
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// INFO 以上のイベントを `service` 付きの1行 JSON として stderr に書く。
pub(crate) struct StructuredLogLayer;

#[derive(Default)]
struct JsonVisitor {
    message: Option<String>,
    values: serde_json::Map<String, serde_json::Value>,
}

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.values.insert(field.name().to_string(), json!(rendered));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.values.insert(field.name().to_string(), json!(value));
        }
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.values.insert(field.name().to_string(), json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.values.insert(field.name().to_string(), json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.values.insert(field.name().to_string(), json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.values.insert(field.name().to_string(), json!(value));
    }
}

fn render_entry(
    level: &tracing::Level,
    target: &str,
    visitor: JsonVisitor,
) -> serde_json::Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "level": level.as_str(),
        "service": "fake-news-detector",
        "target": target,
        "message": visitor.message.unwrap_or_default(),
        "fields": visitor.values,
    })
}

impl<S: Subscriber> Layer<S> for StructuredLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = event.metadata().level();
        if *level > tracing::Level::INFO {
            return;
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let entry = render_entry(level, event.metadata().target(), visitor);
        eprintln!("{}", serde_json::to_string(&entry).unwrap_or_default());
    }
}
