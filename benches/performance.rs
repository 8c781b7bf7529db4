/// 1k 記事規模での TF-IDF 学習・変換と推論の性能ベンチマーク。
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use fake_news_detector::classification::dataset::sample_dataset;
use fake_news_detector::classification::{
    Label, LinearClassifier, TfidfVectorizer, VectorizerConfig,
};

/// サンプル記事を語順を変えながら複製して `n` 件のコーパスを作る。
fn synthetic_corpus(n: usize) -> (Vec<String>, Vec<Label>) {
    let samples = sample_dataset();
    (0..n)
        .map(|i| {
            let sample = &samples[i % samples.len()];
            let mut words: Vec<&str> = sample.text.split_whitespace().collect();
            words.rotate_left(i % words.len().max(1));
            (format!("{} item{}", words.join(" "), i % 97), sample.label)
        })
        .unzip()
}

fn bench_vectorizer_fit(c: &mut Criterion) {
    let (texts, _) = synthetic_corpus(1024);
    let vectorizer = TfidfVectorizer::new(VectorizerConfig::default());
    c.bench_function("tfidf_fit_1k", |b| {
        b.iter(|| {
            let vocabulary = vectorizer.fit(&texts).expect("fit");
            black_box(vocabulary.len());
        });
    });
}

fn bench_vectorizer_transform(c: &mut Criterion) {
    let (texts, _) = synthetic_corpus(1024);
    let vocabulary = TfidfVectorizer::new(VectorizerConfig::default())
        .fit(&texts)
        .expect("fit");
    c.bench_function("tfidf_transform_1k", |b| {
        b.iter(|| {
            let vectors = vocabulary.transform(&texts);
            black_box(vectors.len());
        });
    });
}

fn bench_predict(c: &mut Criterion) {
    let (texts, labels) = synthetic_corpus(512);
    let vocabulary = TfidfVectorizer::new(VectorizerConfig::default())
        .fit(&texts)
        .expect("fit");
    let vectors = vocabulary.transform(&texts);
    let model = LinearClassifier::default()
        .fit(&vectors, &labels)
        .expect("fit");
    c.bench_function("predict_single_article", |b| {
        b.iter(|| {
            let vector = vocabulary.transform_one(black_box(&texts[7]));
            black_box(model.predict_proba(&vector).expect("proba"));
        });
    });
}

criterion_group!(
    benches,
    bench_vectorizer_fit,
    bench_vectorizer_transform,
    bench_predict
);
criterion_main!(benches);
