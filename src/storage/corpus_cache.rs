//! 構築済みコーパスのキャッシュ
//!
//! キャッシュがあれば復元し、なければ構築して保存してから返す。
//! 構築元ディレクトリの内容が変わっていれば作り直す。

use std::path::{Path, PathBuf};

use flate2::Crc;
use tracing::{info, warn};

use crate::data::{list_image_files, Corpus, DatasetBuilder, DatasetError};
use crate::storage::corpus_metadata::CorpusMetadata;
use crate::storage::corpus_storage::{load_corpus, save_corpus_with_metadata};

#[derive(Debug, Clone)]
pub struct CorpusCache {
    path: PathBuf,
    rebuild_on_corrupt: bool,
}

impl CorpusCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rebuild_on_corrupt: false,
        }
    }

    /// 壊れたキャッシュをエラーにせず作り直す
    pub fn rebuild_on_corrupt(mut self, enabled: bool) -> Self {
        self.rebuild_on_corrupt = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_build(
        &self,
        dir: &Path,
        builder: &mut DatasetBuilder,
    ) -> Result<Corpus, DatasetError> {
        let fingerprint = fingerprint_directory(dir)?;

        if self.path.exists() {
            match load_corpus(&self.path) {
                Ok((metadata, corpus)) => {
                    if let Some(reason) = stale_reason(&metadata, fingerprint.as_deref(), builder) {
                        warn!("[cache] キャッシュを再構築します ({}): {}", reason, self.path.display());
                    } else {
                        if fingerprint.is_none() {
                            info!(
                                "[cache] 構築元 {} が見つからないためキャッシュをそのまま使用します",
                                dir.display()
                            );
                        }
                        info!(
                            "[cache] キャッシュから {} サンプルを読み込みました: {}",
                            corpus.len(),
                            self.path.display()
                        );
                        return Ok(corpus);
                    }
                }
                Err(e) if self.rebuild_on_corrupt => {
                    warn!("[cache] 壊れたキャッシュを再構築します: {:#}", e);
                }
                Err(e) => {
                    return Err(DatasetError::CacheCorrupt {
                        path: self.path.clone(),
                        reason: format!("{:#}", e),
                    });
                }
            }
        }

        let corpus = builder.build(dir)?;
        let options = builder.options();
        let mut metadata = CorpusMetadata::new(
            &corpus,
            options.image_width,
            options.image_height,
            dir.display().to_string(),
            fingerprint,
        );
        metadata.augment = options.augment;
        metadata.label_source = builder.label_source();
        save_corpus_with_metadata(&self.path, &metadata, &corpus).map_err(|e| {
            DatasetError::CacheWrite {
                path: self.path.clone(),
                reason: format!("{:#}", e),
            }
        })?;
        info!("[cache] コーパスを保存しました: {}", self.path.display());

        Ok(corpus)
    }
}

/// キャッシュを使えない理由（使えるなら None）
fn stale_reason(
    metadata: &CorpusMetadata,
    fingerprint: Option<&str>,
    builder: &DatasetBuilder,
) -> Option<String> {
    let options = builder.options();
    if metadata.image_width != options.image_width
        || metadata.image_height != options.image_height
        || metadata.num_classes != options.num_classes
    {
        return Some(format!(
            "image {}x{} / {} classes, configured {}x{} / {} classes",
            metadata.image_width,
            metadata.image_height,
            metadata.num_classes,
            options.image_width,
            options.image_height,
            options.num_classes
        ));
    }

    if metadata.augment != options.augment {
        return Some(format!(
            "augment options {:?}, configured {:?}",
            metadata.augment, options.augment
        ));
    }

    // 表記を持たない抽出規則同士は比較しない
    if let (Some(stored), Some(current)) = (metadata.label_source.as_deref(), builder.label_source()) {
        if stored != current {
            return Some(format!("label source {}, configured {}", stored, current));
        }
    }

    match (fingerprint, metadata.fingerprint.as_deref()) {
        (Some(current), Some(stored)) if current != stored => Some(format!(
            "source changed: fingerprint {} -> {}",
            stored, current
        )),
        _ => None,
    }
}

/// 画像ファイルの名前とサイズからディレクトリのフィンガープリントを計算
///
/// 形式は `"{crc32:08x}:{ファイル数}"`。ディレクトリが無ければ `None`。
pub fn fingerprint_directory(dir: &Path) -> Result<Option<String>, DatasetError> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let files = list_image_files(dir)?;
    let mut crc = Crc::new();
    for path in &files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let size = std::fs::metadata(path)?.len();
        crc.update(format!("{}:{}\n", name, size).as_bytes());
    }

    Ok(Some(format!("{:08x}:{}", crc.sum(), files.len())))
}
