pub(crate) mod metrics;
pub(crate) mod structured_log;
pub(crate) mod tracing;

use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{Encoder, Registry, TextEncoder};

pub use self::metrics::Metrics;
pub use self::tracing::{TracingSettings, init as init_tracing};

/// Telemetry（メトリクスとトレーシング）を管理する構造体。
#[derive(Debug, Clone)]
pub struct Telemetry {
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
}

impl Telemetry {
    /// トレーシングとメトリクスを初期化する。
    ///
    /// # Errors
    /// サブスクライバ初期化やメトリクス登録に失敗した場合。
    pub fn new(settings: &TracingSettings) -> Result<Self> {
        tracing::init(settings)?;
        Self::metrics_only()
    }

    /// グローバルなサブスクライバに触れずにメトリクスだけを用意する（テスト用）。
    ///
    /// # Errors
    /// メトリクス登録に失敗した場合。
    pub fn metrics_only() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        let metrics =
            Arc::new(Metrics::new(Arc::clone(&registry)).context("failed to register metrics")?);
        Ok(Self { registry, metrics })
    }

    /// メトリクスへのアクセスを提供する。
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// 準備完了プローブを記録する。
    pub fn record_ready_probe(&self, ready: bool) {
        ::tracing::debug!(ready, "service ready probe");
    }

    /// ライブプローブを記録する。
    pub fn record_live_probe(&self) {
        ::tracing::debug!("service live probe");
    }

    /// 再学習呼び出しを記録する。
    pub fn record_retrain_invocation(&self) {
        ::tracing::warn!("admin retrain invoked");
    }

    /// Prometheusメトリクスをレンダリングする。
    pub fn render_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(error) = encoder.encode(&metric_families, &mut buffer) {
            ::tracing::warn!(%error, "failed to encode prometheus metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metrics() {
        let telemetry = Telemetry::metrics_only().expect("telemetry");
        telemetry.metrics().set_model_loaded(true);
        let rendered = telemetry.render_prometheus();
        assert!(rendered.contains("fake_news_model_loaded 1"));
        assert!(rendered.contains("fake_news_predictions_total"));
    }
}
