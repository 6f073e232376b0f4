//! 正規化済みコーパス（キャッシュ単位）

use super::error::DatasetError;

/// 拡張・正規化済みの全サンプルと統計量
///
/// - `vectors`: `num_samples * feature_len` の行優先フラット配列
/// - `labels`: 0始まりのクラス番号
/// - `one_hot`: `num_samples * num_classes` の行優先フラット配列
/// - `mean` / `std`: 特徴量ごとの平均と標準偏差（正規化前の値で計算）
#[derive(Debug, Clone, PartialEq)]
pub struct Corpus {
    pub feature_len: usize,
    pub num_classes: usize,
    pub vectors: Vec<f32>,
    pub labels: Vec<i32>,
    pub one_hot: Vec<i32>,
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        if self.feature_len == 0 {
            return 0;
        }
        self.vectors.len() / self.feature_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// one-hot の行数
    pub fn one_hot_rows(&self) -> usize {
        if self.num_classes == 0 {
            return 0;
        }
        self.one_hot.len() / self.num_classes
    }

    pub fn vector(&self, index: usize) -> &[f32] {
        &self.vectors[index * self.feature_len..(index + 1) * self.feature_len]
    }

    pub fn one_hot_row(&self, index: usize) -> &[i32] {
        &self.one_hot[index * self.num_classes..(index + 1) * self.num_classes]
    }

    /// クラスごとのサンプル数
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes];
        for &label in &self.labels {
            if let Some(count) = usize::try_from(label).ok().and_then(|l| counts.get_mut(l)) {
                *count += 1;
            }
        }
        counts
    }

    /// 形状の整合性を確認する
    pub fn validate(&self) -> Result<(), DatasetError> {
        if self.feature_len == 0 || self.num_classes == 0 {
            return Err(DatasetError::ShapeMismatch(format!(
                "feature_len={} num_classes={}",
                self.feature_len, self.num_classes
            )));
        }
        if self.vectors.len() % self.feature_len != 0 {
            return Err(DatasetError::ShapeMismatch(format!(
                "vector buffer of {} values is not a multiple of {}",
                self.vectors.len(),
                self.feature_len
            )));
        }
        if self.one_hot.len() % self.num_classes != 0 {
            return Err(DatasetError::ShapeMismatch(format!(
                "one-hot buffer of {} values is not a multiple of {}",
                self.one_hot.len(),
                self.num_classes
            )));
        }

        let rows = self.len();
        if rows != self.labels.len() || rows != self.one_hot_rows() {
            return Err(DatasetError::ShapeMismatch(format!(
                "vectors={} labels={} one_hot={}",
                rows,
                self.labels.len(),
                self.one_hot_rows()
            )));
        }
        if self.mean.len() != self.feature_len || self.std.len() != self.feature_len {
            return Err(DatasetError::ShapeMismatch(format!(
                "mean={} std={} expected {}",
                self.mean.len(),
                self.std.len(),
                self.feature_len
            )));
        }
        Ok(())
    }
}

/// ラベル列をone-hotに変換（行優先フラット）
pub fn one_hot_encode(labels: &[i32], num_classes: usize) -> Vec<i32> {
    let mut one_hot = vec![0i32; labels.len() * num_classes];
    for (row, &label) in labels.iter().enumerate() {
        if let Ok(label) = usize::try_from(label) {
            if label < num_classes {
                one_hot[row * num_classes + label] = 1;
            }
        }
    }
    one_hot
}

/// 特徴量ごとの平均と母標準偏差を計算する
///
/// 標準偏差が0の列は1に置き換える（定数列の0除算回避）。
pub fn feature_statistics(vectors: &[f32], feature_len: usize) -> (Vec<f32>, Vec<f32>) {
    let rows = vectors.len() / feature_len;
    if rows == 0 {
        return (vec![0.0; feature_len], vec![1.0; feature_len]);
    }

    let mut sum = vec![0.0f64; feature_len];
    for row in vectors.chunks_exact(feature_len) {
        for (acc, &v) in sum.iter_mut().zip(row) {
            *acc += v as f64;
        }
    }
    let mean: Vec<f64> = sum.iter().map(|s| s / rows as f64).collect();

    let mut sq = vec![0.0f64; feature_len];
    for row in vectors.chunks_exact(feature_len) {
        for ((acc, &v), m) in sq.iter_mut().zip(row).zip(&mean) {
            let d = v as f64 - m;
            *acc += d * d;
        }
    }

    let std = sq
        .iter()
        .map(|s| {
            let sd = (s / rows as f64).sqrt();
            if sd > 0.0 {
                sd as f32
            } else {
                1.0
            }
        })
        .collect();

    (mean.into_iter().map(|m| m as f32).collect(), std)
}

/// `(x - mean) / std` をその場で適用
pub fn normalize_in_place(vectors: &mut [f32], mean: &[f32], std: &[f32]) {
    for row in vectors.chunks_exact_mut(mean.len()) {
        for ((v, m), s) in row.iter_mut().zip(mean).zip(std) {
            *v = (*v - m) / s;
        }
    }
}
