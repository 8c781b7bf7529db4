use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::classification::Label;

#[derive(Debug, Default, Clone, Copy)]
struct LabelStats {
    true_positive: usize,
    false_positive: usize,
    false_negative: usize,
    support: usize, // 正解データに含まれるそのラベルの個数
}

/// 1クラス分の指標。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// 平均指標。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// 分類メトリクス。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub per_class: BTreeMap<Label, ClassMetrics>,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
    pub total: usize,
}

impl Default for ClassificationMetrics {
    fn default() -> Self {
        Self {
            accuracy: 0.0,
            per_class: BTreeMap::new(),
            macro_avg: AveragedMetrics::default(),
            weighted_avg: AveragedMetrics::default(),
            total: 0,
        }
    }
}

impl fmt::Display for ClassificationMetrics {
    /// 4桁の分類レポート表。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for (label, metrics) in &self.per_class {
            writeln!(
                f,
                "{:>14} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                label.as_str(),
                metrics.precision,
                metrics.recall,
                metrics.f1,
                metrics.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.4} {:>10}",
            "accuracy", "", "", self.accuracy, self.total
        )?;
        for (name, avg) in [("macro avg", self.macro_avg), ("weighted avg", self.weighted_avg)] {
            writeln!(
                f,
                "{:>14} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                name, avg.precision, avg.recall, avg.f1, self.total
            )?;
        }
        Ok(())
    }
}

/// 評価用データに対するメトリクス集計器。
#[derive(Debug, Default)]
pub struct MetricsCalculator {
    per_label: BTreeMap<Label, LabelStats>,
    total_samples: usize,
    correct_samples: usize,
}

impl MetricsCalculator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 期待ラベルと予測ラベルを登録する。
    pub fn push(&mut self, expected: Label, predicted: Label) {
        self.total_samples += 1;
        self.per_label.entry(expected).or_default().support += 1;

        if expected == predicted {
            self.correct_samples += 1;
            self.per_label.entry(expected).or_default().true_positive += 1;
        } else {
            self.per_label.entry(expected).or_default().false_negative += 1;
            self.per_label.entry(predicted).or_default().false_positive += 1;
        }
    }

    #[must_use]
    pub fn finalize(&self) -> ClassificationMetrics {
        if self.per_label.is_empty() {
            return ClassificationMetrics::default();
        }

        let per_class: BTreeMap<Label, ClassMetrics> = self
            .per_label
            .iter()
            .map(|(label, stats)| (*label, class_metrics(stats)))
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let counted_labels = per_class.len() as f64;
        let total_support: usize = per_class.values().map(|m| m.support).sum();

        let mut macro_avg = AveragedMetrics::default();
        let mut weighted_avg = AveragedMetrics::default();
        for metrics in per_class.values() {
            macro_avg.precision += metrics.precision / counted_labels;
            macro_avg.recall += metrics.recall / counted_labels;
            macro_avg.f1 += metrics.f1 / counted_labels;

            if total_support > 0 {
                #[allow(clippy::cast_precision_loss)]
                let share = metrics.support as f64 / total_support as f64;
                weighted_avg.precision += metrics.precision * share;
                weighted_avg.recall += metrics.recall * share;
                weighted_avg.f1 += metrics.f1 * share;
            }
        }

        ClassificationMetrics {
            accuracy: ratio(self.correct_samples, self.total_samples),
            per_class,
            macro_avg,
            weighted_avg,
            total: self.total_samples,
        }
    }
}

fn class_metrics(stats: &LabelStats) -> ClassMetrics {
    let precision = ratio(
        stats.true_positive,
        stats.true_positive + stats.false_positive,
    );
    let recall = ratio(
        stats.true_positive,
        stats.true_positive + stats.false_negative,
    );
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    ClassMetrics {
        precision,
        recall,
        f1,
        support: stats.support,
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
