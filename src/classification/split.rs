//! ラベル比率を保った学習/評価分割。
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::Label;
use super::error::{ClassificationError, Result};

pub const DEFAULT_TEST_SIZE: f64 = 0.3;
pub const DEFAULT_SEED: u64 = 42;

/// 分割結果（元データ上のインデックス、いずれも昇順）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// 層化分割を行う。各クラスを固定シードでシャッフルし、`round(test_size × n_c)` 件を
/// 評価側に回す。どちらの側にも各クラスが最低1件残るよう調整する。
///
/// # Errors
/// `test_size` が (0, 1) の外、もしくはメンバーが2件未満のクラスがある場合。
pub fn stratified_split(labels: &[Label], test_size: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ClassificationError::InvalidSplit(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for class in Label::ALL {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == class)
            .map(|(idx, _)| idx)
            .collect();
        if members.is_empty() {
            continue;
        }
        if members.len() < 2 {
            return Err(ClassificationError::InvalidSplit(format!(
                "class {class} has only {} member(s); at least 2 are required",
                members.len()
            )));
        }

        members.shuffle(&mut rng);
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let n_test = ((members.len() as f64 * test_size).round() as usize)
            .clamp(1, members.len() - 1);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(SplitIndices { train, test })
}
