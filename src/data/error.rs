use std::path::PathBuf;

use thiserror::Error;

/// コーパス構築・分割・キャッシュで発生するエラー
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 個別ファイルのデコード失敗（ビルダーはスキップして続行する）
    #[error("Failed to decode image {}: {source}", .path.display())]
    DecodeFailure {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Corpus cache {} is corrupt: {reason}", .path.display())]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("Failed to write corpus cache {}: {reason}", .path.display())]
    CacheWrite { path: PathBuf, reason: String },

    #[error("No usable images found in {}", .0.display())]
    EmptyCorpus(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
