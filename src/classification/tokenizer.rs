//! 英語記事のトークナイズと n-gram 生成。
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use super::stopwords::is_stop_word;

fn normalize_text(input: &str) -> String {
    input.nfc().collect::<String>().to_lowercase()
}

/// トークナイザ設定。語彙と一緒に永続化され、予測時も同じ設定で分割する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPipeline {
    pub ngram_range: (usize, usize),
    pub remove_stop_words: bool,
}

impl TokenPipeline {
    #[must_use]
    pub fn new(ngram_range: (usize, usize), remove_stop_words: bool) -> Self {
        let min_n = ngram_range.0.max(1);
        let max_n = ngram_range.1.max(min_n);
        Self {
            ngram_range: (min_n, max_n),
            remove_stop_words,
        }
    }

    /// 単語単位のトークン列を返す（ストップワード除去済み）。
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        normalize_text(text)
            .split_word_bounds()
            .filter(|token| token.chars().count() >= 2)
            .filter(|token| token.chars().any(char::is_alphanumeric))
            .filter(|token| !(self.remove_stop_words && is_stop_word(token)))
            .map(ToString::to_string)
            .collect()
    }

    /// n-gram の語を列挙する。n の昇順、同じ n 内では出現順。
    #[must_use]
    pub fn analyze(&self, text: &str) -> Vec<String> {
        let tokens = self.tokenize(text);
        let (min_n, max_n) = self.ngram_range;
        let mut terms = Vec::new();
        for n in min_n..=max_n {
            if n > tokens.len() {
                break;
            }
            if n == 1 {
                terms.extend(tokens.iter().cloned());
                continue;
            }
            terms.extend(tokens.windows(n).map(|window| window.join(" ")));
        }
        terms
    }
}

impl Default for TokenPipeline {
    fn default() -> Self {
        Self::new((1, 2), true)
    }
}
