//! 記事テキストから TF-IDF 特徴量を抽出する。
use std::cmp::Ordering;
use std::collections::BTreeMap;

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use sprs::CsVec;
use xxhash_rust::xxh3::xxh3_64;

use super::error::{ClassificationError, Result};
use super::tokenizer::TokenPipeline;

pub const DEFAULT_MAX_FEATURES: usize = 5000;
pub const DEFAULT_MAX_DF: f64 = 0.9;

/// ベクトライザのハイパーパラメータ。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorizerConfig {
    pub max_features: usize,
    /// この割合を超える文書に出現する語は捨てる。
    pub max_df: f64,
    pub min_df: usize,
    pub tokens: TokenPipeline,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            max_features: DEFAULT_MAX_FEATURES,
            max_df: DEFAULT_MAX_DF,
            min_df: 1,
            tokens: TokenPipeline::default(),
        }
    }
}

/// 学習済み語彙。語は辞書順に並び、その位置が列インデックスになる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredVocabulary")]
pub struct Vocabulary {
    terms: Vec<String>,
    idf: Vec<f64>,
    tokens: TokenPipeline,
    #[serde(skip)]
    index: FxHashMap<String, usize>,
}

/// 永続化形式。読み込み時に索引を組み立てる。
#[derive(Deserialize)]
struct StoredVocabulary {
    terms: Vec<String>,
    idf: Vec<f64>,
    tokens: TokenPipeline,
}

impl From<StoredVocabulary> for Vocabulary {
    fn from(stored: StoredVocabulary) -> Self {
        Self::new(stored.terms, stored.idf, stored.tokens)
    }
}

impl Vocabulary {
    fn new(terms: Vec<String>, idf: Vec<f64>, tokens: TokenPipeline) -> Self {
        let mut vocabulary = Self {
            terms,
            idf,
            tokens,
            index: FxHashMap::default(),
        };
        vocabulary.rebuild_index();
        vocabulary
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .terms
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.clone(), idx))
            .collect();
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.terms.len() != self.idf.len() {
            return Err(ClassificationError::DimensionMismatch {
                expected: self.terms.len(),
                got: self.idf.len(),
            });
        }
        if self.terms.is_empty() {
            return Err(ClassificationError::EmptyCorpus);
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    #[must_use]
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    #[must_use]
    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    #[must_use]
    pub fn term(&self, index: usize) -> Option<&str> {
        self.terms.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    #[must_use]
    pub fn token_pipeline(&self) -> TokenPipeline {
        self.tokens
    }

    /// 語彙の指紋。モデル成果物との対応確認に使う。
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        xxh3_64(self.terms.join("\n").as_bytes())
    }

    /// 1文書を L2 正規化済み TF-IDF ベクトルへ変換する。語彙外の語は無視する。
    #[must_use]
    pub fn transform_one(&self, text: &str) -> FeatureVector {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in self.tokens.analyze(text) {
            if let Some(&idx) = self.index.get(&term) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        let (indices, mut data): (Vec<usize>, Vec<f64>) = counts
            .into_iter()
            .map(|(idx, count)| (idx, count * self.idf[idx]))
            .unzip();
        let norm = data.iter().map(|value| value * value).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in &mut data {
                *value /= norm;
            }
        }

        FeatureVector {
            inner: CsVec::new(self.terms.len(), indices, data),
        }
    }

    #[must_use]
    pub fn transform<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Vec<FeatureVector> {
        texts
            .par_iter()
            .map(|text| self.transform_one(text.as_ref()))
            .collect()
    }
}

/// 疎な TF-IDF ベクトル。
#[derive(Debug, Clone)]
pub struct FeatureVector {
    inner: CsVec<f64>,
}

impl FeatureVector {
    #[must_use]
    pub fn dim(&self) -> usize {
        self.inner.dim()
    }

    #[must_use]
    pub fn nnz(&self) -> usize {
        self.inner.nnz()
    }

    /// 非ゼロ要素 `(列, 値)` を列の昇順で返す。
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.inner.iter().map(|(idx, value)| (idx, *value))
    }

    #[must_use]
    pub fn get(&self, index: usize) -> f64 {
        self.inner.get(index).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn squared_norm(&self) -> f64 {
        self.iter().map(|(_, value)| value * value).sum()
    }

    #[must_use]
    pub fn dot_dense(&self, dense: &[f64]) -> f64 {
        self.iter()
            .map(|(idx, value)| value * dense.get(idx).copied().unwrap_or(0.0))
            .sum()
    }
}

#[derive(Debug, Default)]
struct TermStats {
    doc_freq: usize,
    corpus_count: usize,
}

/// 語彙を学習する TF-IDF ベクトライザ。
#[derive(Debug, Clone, Default)]
pub struct TfidfVectorizer {
    config: VectorizerConfig,
}

impl TfidfVectorizer {
    #[must_use]
    pub fn new(config: VectorizerConfig) -> Self {
        Self { config }
    }

    /// コーパスから語彙を構築する。
    ///
    /// 1. 各文書の n-gram について文書頻度（DF）と総出現数を数える
    /// 2. `max_df` 超過・`min_df` 未満の語を捨てる
    /// 3. `総出現数 × IDF` の降順（同点は辞書順）で上位 `max_features` 語を残す
    /// 4. 残った語を辞書順に並べて列インデックスとする
    ///
    /// # Errors
    /// コーパスが空、もしくは語が1つも残らない場合は [`ClassificationError::EmptyCorpus`]。
    pub fn fit<S: AsRef<str>>(&self, corpus: &[S]) -> Result<Vocabulary> {
        if corpus.is_empty() {
            return Err(ClassificationError::EmptyCorpus);
        }
        let pipeline = self.config.tokens;
        let total_docs = corpus.len();

        let mut stats: FxHashMap<String, TermStats> = FxHashMap::default();
        for doc in corpus {
            let terms = pipeline.analyze(doc.as_ref());
            let mut seen: FxHashSet<&str> = FxHashSet::default();
            for term in &terms {
                let entry = stats.entry(term.clone()).or_default();
                entry.corpus_count += 1;
                if seen.insert(term.as_str()) {
                    entry.doc_freq += 1;
                }
            }
        }
        let unique_terms = stats.len();

        #[allow(clippy::cast_precision_loss)]
        let n = total_docs as f64;
        let max_doc_count = self.config.max_df * n;
        let mut scored: Vec<(String, f64, f64)> = stats
            .into_iter()
            .filter(|(_, stat)| {
                #[allow(clippy::cast_precision_loss)]
                let df = stat.doc_freq as f64;
                df <= max_doc_count && stat.doc_freq >= self.config.min_df
            })
            .map(|(term, stat)| {
                #[allow(clippy::cast_precision_loss)]
                let idf = smoothed_idf(n, stat.doc_freq as f64);
                #[allow(clippy::cast_precision_loss)]
                let score = stat.corpus_count as f64 * idf;
                (term, score, idf)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(self.config.max_features);
        scored.sort_by(|a, b| a.0.cmp(&b.0));

        if scored.is_empty() {
            return Err(ClassificationError::EmptyCorpus);
        }

        let (terms, idf): (Vec<String>, Vec<f64>) =
            scored.into_iter().map(|(term, _, idf)| (term, idf)).unzip();

        tracing::info!(
            total_docs,
            unique_terms,
            selected_vocab_size = terms.len(),
            "tf-idf vocabulary fitted"
        );

        Ok(Vocabulary::new(terms, idf, pipeline))
    }
}

/// `ln((1 + n) / (1 + df)) + 1`
fn smoothed_idf(n_docs: f64, doc_freq: f64) -> f64 {
    ((1.0 + n_docs) / (1.0 + doc_freq)).ln() + 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectorizer(max_features: usize, max_df: f64) -> TfidfVectorizer {
        TfidfVectorizer::new(VectorizerConfig {
            max_features,
            max_df,
            min_df: 1,
            tokens: TokenPipeline::new((1, 1), true),
        })
    }

    #[test]
    fn fit_rejects_empty_corpus() {
        let corpus: Vec<&str> = Vec::new();
        assert!(matches!(
            vectorizer(10, 1.0).fit(&corpus),
            Err(ClassificationError::EmptyCorpus)
        ));
    }

    #[test]
    fn fit_rejects_corpus_of_stop_words() {
        assert!(matches!(
            vectorizer(10, 1.0).fit(&["the and of", "to be or not"]),
            Err(ClassificationError::EmptyCorpus)
        ));
    }

    #[test]
    fn max_df_drops_near_universal_terms() {
        let corpus = ["news alpha", "news beta", "news gamma"];
        let vocab = vectorizer(10, 0.9).fit(&corpus).expect("fit");
        assert!(vocab.index_of("news").is_none());
        assert_eq!(vocab.terms(), &["alpha", "beta", "gamma"]);
    }

    #[test]
    fn max_features_keeps_highest_scoring_terms_with_lexicographic_ties() {
        let corpus = ["rocket rocket orbit", "rocket moon", "zebra apple"];
        let vocab = vectorizer(2, 1.0).fit(&corpus).expect("fit");
        // rocket: count 3; 残りは count 1 で idf が同じ群の中から辞書順で apple
        assert_eq!(vocab.terms(), &["apple", "rocket"]);
    }

    #[test]
    fn transform_is_l2_normalized_and_ignores_unknown_terms() {
        let vocab = vectorizer(10, 1.0)
            .fit(&["satellite launch", "mall demolished"])
            .expect("fit");
        let vector = vocab.transform_one("satellite satellite unknownword");
        assert_eq!(vector.dim(), vocab.len());
        assert_eq!(vector.nnz(), 1);
        assert!((vector.squared_norm() - 1.0).abs() < 1e-12);

        let empty = vocab.transform_one("nothing known here");
        assert_eq!(empty.nnz(), 0);
    }

    #[test]
    fn fit_is_deterministic() {
        let corpus = ["isro satellite weather", "taj mahal mall", "metro rail project"];
        let first = vectorizer(5, 1.0).fit(&corpus).expect("fit");
        let second = vectorizer(5, 1.0).fit(&corpus).expect("fit");
        assert_eq!(first.terms(), second.terms());
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn deserialized_vocabulary_transforms_like_the_original() {
        let vocab = vectorizer(10, 1.0)
            .fit(&["satellite launch", "mall demolished"])
            .expect("fit");
        let json = serde_json::to_string(&vocab).expect("serialize");
        let restored: Vocabulary = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(restored.index_of("satellite"), vocab.index_of("satellite"));
        let vector = restored.transform_one("satellite launch");
        assert_eq!(vector.nnz(), 2);
        assert_eq!(restored, vocab);
    }
}
