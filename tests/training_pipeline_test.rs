/// 学習パイプラインの結合テスト（分割・学習・保存・再読み込み）。
use std::fs;

use fake_news_detector::classification::dataset::{SAMPLE_CSV, sample_dataset};
use fake_news_detector::classification::split::{DEFAULT_SEED, DEFAULT_TEST_SIZE, stratified_split};
use fake_news_detector::classification::{
    ArtifactStore, ClassificationError, ClassifierConfig, EstimatorKind, Label, LabeledExample,
    MODEL_FILE, PredictionService, TrainingConfig, TrainingPipeline, VECTORIZER_FILE,
    train_from_csv,
};
use rstest::rstest;
use tempfile::TempDir;

const ISRO_HEADLINE: &str = "ISRO launches new satellite for weather monitoring";
const TAJ_HEADLINE: &str = "Taj Mahal to be demolished for shopping mall!";

fn train_sample(config: TrainingConfig) -> (TempDir, PredictionService) {
    let dir = TempDir::new().expect("tempdir");
    TrainingPipeline::new(config)
        .train(&sample_dataset(), dir.path())
        .expect("train");
    let service = PredictionService::load(dir.path()).expect("load");
    (dir, service)
}

#[rstest]
#[case(EstimatorKind::LogisticRegression)]
#[case(EstimatorKind::LinearSvm)]
fn sample_headlines_are_classified(#[case] estimator: EstimatorKind) {
    let (_dir, service) = train_sample(TrainingConfig {
        classifier: ClassifierConfig {
            estimator,
            ..ClassifierConfig::default()
        },
        ..TrainingConfig::default()
    });

    let real = service.predict(ISRO_HEADLINE).expect("predict");
    assert_eq!(real.label, Label::Real, "{real:?}");
    assert!(real.probability_fake < 0.5);

    let fake = service.predict(TAJ_HEADLINE).expect("predict");
    assert_eq!(fake.label, Label::Fake, "{fake:?}");
    assert!(fake.probability_fake >= 0.5);
}

#[test]
fn training_rows_are_predicted_as_their_own_label() {
    let samples = sample_dataset();
    let labels: Vec<Label> = samples.iter().map(|s| s.label).collect();
    let split = stratified_split(&labels, DEFAULT_TEST_SIZE, DEFAULT_SEED).expect("split");
    let (_dir, service) = train_sample(TrainingConfig::default());

    for idx in split.train {
        let result = service.predict(&samples[idx].text).expect("predict");
        assert_eq!(result.label, samples[idx].label, "row {idx}: {result:?}");
        assert!((0.0..=1.0).contains(&result.probability_fake));
        assert!((0.0..=1.0).contains(&result.confidence));
    }
}

#[test]
fn training_is_deterministic() {
    let (_first_dir, first) = train_sample(TrainingConfig::default());
    let (_second_dir, second) = train_sample(TrainingConfig::default());

    for sample in sample_dataset() {
        assert_eq!(
            first.predict(&sample.text).expect("predict"),
            second.predict(&sample.text).expect("predict")
        );
    }
    assert_ne!(first.version(), second.version());
}

#[test]
fn single_label_dataset_writes_no_artifacts() {
    let dir = TempDir::new().expect("tempdir");
    let examples: Vec<LabeledExample> = sample_dataset()
        .into_iter()
        .filter(|s| s.label == Label::Real)
        .collect();

    let err = TrainingPipeline::default()
        .train(&examples, dir.path())
        .expect_err("one label must fail");

    assert!(matches!(err, ClassificationError::LabelCardinality { found: 1 }));
    assert!(!dir.path().join(VECTORIZER_FILE).exists());
    assert!(!dir.path().join(MODEL_FILE).exists());
}

#[test]
fn failed_retrain_keeps_previous_artifacts() {
    let dir = TempDir::new().expect("tempdir");
    let report = TrainingPipeline::default()
        .train(&sample_dataset(), dir.path())
        .expect("train");

    let broken = vec![
        LabeledExample::new("only fake", Label::Fake),
        LabeledExample::new("still fake", Label::Fake),
    ];
    assert!(TrainingPipeline::default().train(&broken, dir.path()).is_err());

    let service = PredictionService::load(dir.path()).expect("previous pair still loads");
    assert_eq!(service.version(), report.version);
}

#[test]
fn train_from_csv_creates_nested_output_dir() {
    let dir = TempDir::new().expect("tempdir");
    let dataset = dir.path().join("train.csv");
    fs::write(&dataset, SAMPLE_CSV).expect("write dataset");
    let out_dir = dir.path().join("artifacts").join("v1");

    let report =
        train_from_csv(&dataset, &out_dir, &TrainingConfig::default()).expect("train from csv");

    assert!(ArtifactStore::new(&out_dir).exists());
    assert_eq!(report.train_size + report.test_size, 20);
    assert!((0.0..=1.0).contains(&report.accuracy()));
}

#[test]
fn train_from_csv_reports_invalid_label_row() {
    let dir = TempDir::new().expect("tempdir");
    let dataset = dir.path().join("bad.csv");
    fs::write(&dataset, "title,text,label\na,b,REAL\nc,d,SATIRE\n").expect("write dataset");

    let err = train_from_csv(&dataset, dir.path(), &TrainingConfig::default())
        .expect_err("invalid label");

    match err {
        ClassificationError::InvalidLabel { row, value } => {
            assert_eq!(row, 2);
            assert_eq!(value, "SATIRE");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
