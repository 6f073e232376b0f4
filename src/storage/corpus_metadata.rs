//! コーパスキャッシュのメタデータ定義
//!
//! tar.gz内の `metadata.json` として保存され、各バイナリエントリの
//! 型と形状、構築元ディレクトリのフィンガープリントを記録します。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::{AugmentOptions, Corpus};

/// キャッシュ形式のバージョン（形式を変えたら上げる）
pub const CORPUS_FORMAT_VERSION: u32 = 1;

/// バイナリエントリの要素型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    F32,
    I32,
}

impl Dtype {
    pub fn size(&self) -> usize {
        4
    }
}

/// 1フィールド分の型と形状
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldShape {
    /// tar内のエントリ名（例: "vectors.bin"）
    pub name: String,
    pub dtype: Dtype,
    pub shape: Vec<usize>,
}

impl FieldShape {
    pub fn new(name: &str, dtype: Dtype, shape: Vec<usize>) -> Self {
        Self {
            name: name.to_string(),
            dtype,
            shape,
        }
    }

    /// 要素数（オーバーフローする形状は `None`）
    pub fn element_count(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    pub fn byte_len(&self) -> Option<usize> {
        self.element_count()?.checked_mul(self.dtype.size())
    }
}

/// コーパスメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - vectors.bin / labels.bin / one_hot.bin / mean.bin / std.bin: リトルエンディアンの配列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusMetadata {
    pub format_version: u32,

    /// サンプル数（拡張後）
    pub num_samples: usize,

    /// 1サンプルの特徴量数（W * H * 3）
    pub feature_len: usize,

    pub num_classes: usize,

    pub image_width: u32,
    pub image_height: u32,

    /// 各バイナリエントリの型と形状
    pub fields: Vec<FieldShape>,

    /// クラスごとのサンプル数
    pub class_counts: Vec<usize>,

    /// 構築元の画像ディレクトリ
    pub source_dir: String,

    /// 構築元ディレクトリのフィンガープリント
    #[serde(default)]
    pub fingerprint: Option<String>,

    /// 構築時の拡張オプション
    #[serde(default)]
    pub augment: AugmentOptions,

    /// 構築時のラベル抽出規則
    #[serde(default)]
    pub label_source: Option<String>,

    /// 構築時刻（ISO8601形式）
    pub built_at: String,
}

impl CorpusMetadata {
    /// コーパスからメタデータを作成
    pub fn new(
        corpus: &Corpus,
        image_width: u32,
        image_height: u32,
        source_dir: String,
        fingerprint: Option<String>,
    ) -> Self {
        let built_at = chrono::Local::now().to_rfc3339();

        Self {
            format_version: CORPUS_FORMAT_VERSION,
            num_samples: corpus.len(),
            feature_len: corpus.feature_len,
            num_classes: corpus.num_classes,
            image_width,
            image_height,
            fields: field_shapes(corpus.len(), corpus.feature_len, corpus.num_classes),
            class_counts: corpus.class_counts(),
            source_dir,
            fingerprint,
            augment: AugmentOptions::default(),
            label_source: None,
            built_at,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldShape> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize corpus metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize corpus metadata from JSON")
    }
}

pub const VECTORS_ENTRY: &str = "vectors.bin";
pub const LABELS_ENTRY: &str = "labels.bin";
pub const ONE_HOT_ENTRY: &str = "one_hot.bin";
pub const MEAN_ENTRY: &str = "mean.bin";
pub const STD_ENTRY: &str = "std.bin";

/// 5フィールドの期待される形状
pub fn field_shapes(num_samples: usize, feature_len: usize, num_classes: usize) -> Vec<FieldShape> {
    vec![
        FieldShape::new(VECTORS_ENTRY, Dtype::F32, vec![num_samples, feature_len]),
        FieldShape::new(LABELS_ENTRY, Dtype::I32, vec![num_samples]),
        FieldShape::new(ONE_HOT_ENTRY, Dtype::I32, vec![num_samples, num_classes]),
        FieldShape::new(MEAN_ENTRY, Dtype::F32, vec![feature_len]),
        FieldShape::new(STD_ENTRY, Dtype::F32, vec![feature_len]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::corpus::one_hot_encode;

    fn sample_corpus() -> Corpus {
        Corpus {
            feature_len: 3,
            num_classes: 3,
            vectors: vec![0.5; 6],
            labels: vec![0, 2],
            one_hot: one_hot_encode(&[0, 2], 3),
            mean: vec![0.0; 3],
            std: vec![1.0; 3],
        }
    }

    #[test]
    fn test_metadata_from_corpus() {
        let metadata = CorpusMetadata::new(&sample_corpus(), 1, 1, "images/".to_string(), None);
        assert_eq!(metadata.format_version, CORPUS_FORMAT_VERSION);
        assert_eq!(metadata.num_samples, 2);
        assert_eq!(metadata.class_counts, vec![1, 0, 1]);
        assert_eq!(metadata.field(ONE_HOT_ENTRY).unwrap().shape, vec![2, 3]);
        assert_eq!(metadata.field(VECTORS_ENTRY).unwrap().byte_len(), Some(24));
        assert!(metadata.field("missing.bin").is_none());
    }

    #[test]
    fn test_oversized_shape_has_no_byte_len() {
        let field = FieldShape::new(VECTORS_ENTRY, Dtype::F32, vec![usize::MAX / 2, 3072]);
        assert_eq!(field.element_count(), None);
        assert_eq!(field.byte_len(), None);

        let field = FieldShape::new(LABELS_ENTRY, Dtype::I32, vec![usize::MAX / 2]);
        assert_eq!(field.element_count(), Some(usize::MAX / 2));
        assert_eq!(field.byte_len(), None);
    }

    #[test]
    fn test_metadata_json_roundtrip() {
        let metadata = CorpusMetadata::new(
            &sample_corpus(),
            1,
            1,
            "images/".to_string(),
            Some("deadbeef:2".to_string()),
        );
        let json = metadata.to_json_string().unwrap();
        assert!(json.contains("\"dtype\": \"f32\""));

        let restored = CorpusMetadata::from_json_string(&json).unwrap();
        assert_eq!(restored.fields, metadata.fields);
        assert_eq!(restored.fingerprint, metadata.fingerprint);
        assert_eq!(restored.built_at, metadata.built_at);
        assert_eq!(restored.augment, metadata.augment);
    }

    #[test]
    fn test_metadata_without_build_settings() {
        let metadata = CorpusMetadata::new(&sample_corpus(), 1, 1, "images/".to_string(), None);
        let mut json: serde_json::Value = serde_json::from_str(&metadata.to_json_string().unwrap()).unwrap();
        let object = json.as_object_mut().unwrap();
        object.remove("augment");
        object.remove("label_source");

        let restored = CorpusMetadata::from_json_string(&json.to_string()).unwrap();
        assert_eq!(restored.augment, AugmentOptions::default());
        assert_eq!(restored.label_source, None);
    }
}
