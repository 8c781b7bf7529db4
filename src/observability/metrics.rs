/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

use crate::classification::Label;

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub predictions_total: Counter,
    pub predictions_fake: Counter,
    pub predictions_real: Counter,
    pub retrain_total: Counter,
    pub retrain_failed: Counter,

    // ヒストグラム
    pub prediction_duration: Histogram,
    pub training_duration: Histogram,

    // ゲージ
    pub model_loaded: Gauge,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            predictions_total: register_counter_with_registry!(
                "fake_news_predictions_total",
                "Total number of predictions served",
                registry
            )?,
            predictions_fake: register_counter_with_registry!(
                "fake_news_predictions_fake_total",
                "Number of predictions labelled FAKE",
                registry
            )?,
            predictions_real: register_counter_with_registry!(
                "fake_news_predictions_real_total",
                "Number of predictions labelled REAL",
                registry
            )?,
            retrain_total: register_counter_with_registry!(
                "fake_news_retrain_total",
                "Total number of retrain requests that ran",
                registry
            )?,
            retrain_failed: register_counter_with_registry!(
                "fake_news_retrain_failed_total",
                "Number of retrain runs that failed",
                registry
            )?,
            prediction_duration: register_histogram_with_registry!(
                "fake_news_prediction_duration_seconds",
                "Duration of a single prediction",
                vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25],
                registry
            )?,
            training_duration: register_histogram_with_registry!(
                "fake_news_training_duration_seconds",
                "Duration of a full training run",
                vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0],
                registry
            )?,
            model_loaded: register_gauge_with_registry!(
                "fake_news_model_loaded",
                "1 when trained artifacts are loaded, 0 otherwise",
                registry
            )?,
        })
    }

    /// 予測1件を記録する。
    pub fn record_prediction(&self, label: Label, seconds: f64) {
        self.predictions_total.inc();
        match label {
            Label::Fake => self.predictions_fake.inc(),
            Label::Real => self.predictions_real.inc(),
        }
        self.prediction_duration.observe(seconds);
    }

    pub fn set_model_loaded(&self, loaded: bool) {
        self.model_loaded.set(if loaded { 1.0 } else { 0.0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_prediction_counts_by_label() {
        let metrics = Metrics::new(Arc::new(Registry::new())).expect("metrics");
        metrics.record_prediction(Label::Fake, 0.002);
        metrics.record_prediction(Label::Real, 0.001);
        metrics.record_prediction(Label::Fake, 0.003);

        assert!((metrics.predictions_total.get() - 3.0).abs() < f64::EPSILON);
        assert!((metrics.predictions_fake.get() - 2.0).abs() < f64::EPSILON);
        assert!((metrics.predictions_real.get() - 1.0).abs() < f64::EPSILON);
        assert_eq!(metrics.prediction_duration.get_sample_count(), 3);
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = Arc::new(Registry::new());
        let _first = Metrics::new(Arc::clone(&registry)).expect("metrics");
        assert!(Metrics::new(registry).is_err());
    }
}
