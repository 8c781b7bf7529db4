//! 記事冒頭2文の抜き出し。
const SENTENCE_SEPARATOR: &str = ". ";
const LEAD_SENTENCES: usize = 2;

/// 先頭2文を `". "` で区切って返す。末尾に `.` がなければ補う。
#[must_use]
pub fn lead_summary(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut summary = trimmed
        .split(SENTENCE_SEPARATOR)
        .take(LEAD_SENTENCES)
        .collect::<Vec<_>>()
        .join(SENTENCE_SEPARATOR)
        .trim_end()
        .to_string();
    if !summary.ends_with('.') {
        summary.push('.');
    }
    summary
}
