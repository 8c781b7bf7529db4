//! CSV 形式の学習データ読み込み。
//!
//! 列名は前後空白を除いて小文字化して扱う。本文は `text`（なければ `content`）、
//! ラベルは `label`、`title` は任意。
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};

use super::error::{ClassificationError, Result};
use super::{Label, LabeledExample};

/// 埋め込みのサンプルデータ（REAL 10件 / FAKE 10件）。
pub const SAMPLE_CSV: &str = include_str!("../../data/train.csv");

#[derive(Debug, Clone, Copy)]
struct ColumnLayout {
    title: Option<usize>,
    text: usize,
    label: usize,
}

impl ColumnLayout {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let position = |name: &str| normalized.iter().position(|column| column == name);

        let text = position("text")
            .or_else(|| position("content"))
            .ok_or(ClassificationError::MissingColumn("text or content"))?;
        let label = position("label").ok_or(ClassificationError::MissingColumn("label"))?;
        Ok(Self {
            title: position("title"),
            text,
            label,
        })
    }
}

/// CSV ファイルから学習データを読み込む。
///
/// # Errors
/// ファイルが開けない、必須列がない、ラベルが REAL/FAKE 以外の場合はエラーを返す。
pub fn load_csv(path: &Path) -> Result<Vec<LabeledExample>> {
    let file = File::open(path).map_err(|source| ClassificationError::io(path, source))?;
    let examples = read_csv(file)?;
    tracing::info!(
        path = %path.display(),
        rows = examples.len(),
        "dataset loaded"
    );
    Ok(examples)
}

/// 任意のリーダーから CSV を読み込む。
///
/// # Errors
/// [`load_csv`] と同じ。
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<LabeledExample>> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(reader);
    let layout = ColumnLayout::resolve(reader.headers()?)?;

    let mut examples = Vec::new();
    for (offset, record) in reader.records().enumerate() {
        let record = record?;
        let row = offset + 1;
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        let body = cell(layout.text);
        let text = match layout.title {
            Some(title_idx) => format!("{}. {}", cell(title_idx), body),
            None => body.to_string(),
        };
        let raw_label = cell(layout.label);
        let label = raw_label
            .parse::<Label>()
            .map_err(|value| ClassificationError::InvalidLabel { row, value })?;

        examples.push(LabeledExample { text, label });
    }
    Ok(examples)
}

/// 埋め込みサンプルをパースする。
#[must_use]
pub fn sample_dataset() -> Vec<LabeledExample> {
    // 埋め込みデータはテストで検証済みのため失敗しない
    read_csv(SAMPLE_CSV.as_bytes()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_dataset_is_balanced() {
        let samples = sample_dataset();
        assert_eq!(samples.len(), 20);
        let fake = samples.iter().filter(|s| s.label == Label::Fake).count();
        assert_eq!(fake, 10);
        assert!(
            samples[0]
                .text
                .starts_with("ISRO launches new satellite for weather monitoring. ")
        );
    }

    #[test]
    fn headers_are_trimmed_and_case_insensitive() {
        let csv = " Title ,CONTENT, Label \nHeadline,Body text,fake\n";
        let examples = read_csv(csv.as_bytes()).expect("parse");
        assert_eq!(
            examples,
            vec![LabeledExample::new("Headline. Body text", Label::Fake)]
        );
    }

    #[test]
    fn text_is_used_verbatim_without_title() {
        let csv = "text,label\nOnly the body,Real\n";
        let examples = read_csv(csv.as_bytes()).expect("parse");
        assert_eq!(examples[0].text, "Only the body");
        assert_eq!(examples[0].label, Label::Real);
    }

    #[test]
    fn text_column_wins_over_content() {
        let csv = "content,text,label\nignored,chosen,REAL\n";
        let examples = read_csv(csv.as_bytes()).expect("parse");
        assert_eq!(examples[0].text, "chosen");
    }

    #[test]
    fn empty_title_still_joins() {
        let csv = "title,text,label\n,Body,REAL\n";
        let examples = read_csv(csv.as_bytes()).expect("parse");
        assert_eq!(examples[0].text, ". Body");
    }

    #[test]
    fn invalid_label_reports_row() {
        let csv = "text,label\nfine,REAL\nbad,satire\n";
        let err = read_csv(csv.as_bytes()).expect_err("invalid label");
        match err {
            ClassificationError::InvalidLabel { row, value } => {
                assert_eq!(row, 2);
                assert_eq!(value, "satire");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_label_column_is_reported() {
        let err = read_csv("title,text\na,b\n".as_bytes()).expect_err("missing label");
        assert!(matches!(err, ClassificationError::MissingColumn("label")));
    }
}
