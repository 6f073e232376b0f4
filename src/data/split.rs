//! シャッフルと学習/テスト分割

use rand::seq::SliceRandom;
use rand::Rng;

use super::corpus::Corpus;
use super::error::DatasetError;

/// 分割後の片側（ベクトルとone-hotのみ保持）
#[derive(Debug, Clone, PartialEq)]
pub struct Subset {
    pub feature_len: usize,
    pub num_classes: usize,
    pub vectors: Vec<f32>,
    pub one_hot: Vec<i32>,
}

impl Subset {
    fn with_capacity(feature_len: usize, num_classes: usize, rows: usize) -> Self {
        Self {
            feature_len,
            num_classes,
            vectors: Vec::with_capacity(rows * feature_len),
            one_hot: Vec::with_capacity(rows * num_classes),
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len() / self.feature_len
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    fn one_hot_rows(&self) -> usize {
        self.one_hot.len() / self.num_classes
    }

    /// 行範囲 `[start, end)` のベクトルとone-hot
    pub fn rows(&self, start: usize, end: usize) -> (&[f32], &[i32]) {
        (
            &self.vectors[start * self.feature_len..end * self.feature_len],
            &self.one_hot[start * self.num_classes..end * self.num_classes],
        )
    }
}

#[derive(Debug, Clone)]
pub struct Split {
    pub train: Subset,
    pub test: Subset,
}

/// 学習側に割り当てる件数（0.5は学習側へ丸める）
pub fn train_count(total: usize, train_ratio: f32) -> usize {
    ((total as f64 * train_ratio as f64).round() as usize).min(total)
}

/// ベクトルとone-hotを同じ順列でシャッフルし、先頭を学習用・残りをテスト用に分割
pub fn shuffle_and_split<R: Rng + ?Sized>(
    corpus: &Corpus,
    train_ratio: f32,
    rng: &mut R,
) -> Result<Split, DatasetError> {
    if !(train_ratio > 0.0 && train_ratio <= 1.0) {
        return Err(DatasetError::InvalidConfig(format!(
            "train ratio must be in (0, 1], got {}",
            train_ratio
        )));
    }

    let total = corpus.len();
    if total != corpus.one_hot_rows() || corpus.vectors.len() != total * corpus.feature_len {
        return Err(DatasetError::ShapeMismatch(format!(
            "cannot shuffle {} vectors against {} one-hot rows",
            total,
            corpus.one_hot_rows()
        )));
    }

    let mut order: Vec<usize> = (0..total).collect();
    order.shuffle(rng);

    let n_train = train_count(total, train_ratio);
    let mut train = Subset::with_capacity(corpus.feature_len, corpus.num_classes, n_train);
    let mut test = Subset::with_capacity(corpus.feature_len, corpus.num_classes, total - n_train);

    for (position, &index) in order.iter().enumerate() {
        let target = if position < n_train { &mut train } else { &mut test };
        target.vectors.extend_from_slice(corpus.vector(index));
        target.one_hot.extend_from_slice(corpus.one_hot_row(index));
    }

    if train.len() != train.one_hot_rows()
        || test.len() != test.one_hot_rows()
        || train.len() + test.len() != total
    {
        return Err(DatasetError::ShapeMismatch(format!(
            "split produced train={}/{} test={}/{} from {}",
            train.len(),
            train.one_hot_rows(),
            test.len(),
            test.one_hot_rows(),
            total
        )));
    }

    Ok(Split { train, test })
}
