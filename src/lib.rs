//! 画像ディレクトリから拡張・正規化済みコーパスを作り、小さなCNNを学習する

pub mod config;
pub mod data;
pub mod logging;
#[cfg(feature = "ml")]
pub mod ml;
pub mod storage;
