//! コーパスとメタデータの永続化
//!
//! Tar.gz形式でコーパスとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（形状、クラス数、フィンガープリントなど）
//! - vectors.bin     - 正規化済みベクトル (f32, [N, F])
//! - labels.bin      - クラス番号 (i32, [N])
//! - one_hot.bin     - one-hotラベル (i32, [N, C])
//! - mean.bin        - 特徴量ごとの平均 (f32, [F])
//! - std.bin         - 特徴量ごとの標準偏差 (f32, [F])

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::{Archive, Builder};

use crate::data::Corpus;
use crate::storage::corpus_metadata::{
    field_shapes, CorpusMetadata, CORPUS_FORMAT_VERSION, LABELS_ENTRY, MEAN_ENTRY,
    ONE_HOT_ENTRY, STD_ENTRY, VECTORS_ENTRY,
};

const METADATA_ENTRY: &str = "metadata.json";

/// メタデータと共にコーパスをTar.gz形式で保存
///
/// 一時ファイルに書き出してからリネームするため、途中で失敗しても
/// 既存のキャッシュは壊れない。
pub fn save_corpus_with_metadata(
    output_path: &Path,
    metadata: &CorpusMetadata,
    corpus: &Corpus,
) -> Result<()> {
    // 親ディレクトリが存在しない場合は作成
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create parent directory: {:?}", parent))?;
        }
    }

    let tmp_path = output_path.with_extension("partial");
    let tar_gz_file = File::create(&tmp_path)
        .context(format!("Failed to create tar.gz file: {:?}", tmp_path))?;

    // Gzip圧縮を設定
    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut tar_builder, METADATA_ENTRY, json_str.as_bytes())?;
    append_entry(&mut tar_builder, VECTORS_ENTRY, &f32_to_bytes(&corpus.vectors))?;
    append_entry(&mut tar_builder, LABELS_ENTRY, &i32_to_bytes(&corpus.labels))?;
    append_entry(&mut tar_builder, ONE_HOT_ENTRY, &i32_to_bytes(&corpus.one_hot))?;
    append_entry(&mut tar_builder, MEAN_ENTRY, &f32_to_bytes(&corpus.mean))?;
    append_entry(&mut tar_builder, STD_ENTRY, &f32_to_bytes(&corpus.std))?;

    // tarアーカイブとgzipストリームを完成させる
    let encoder = tar_builder
        .into_inner()
        .context("Failed to finalize tar.gz archive")?;
    encoder
        .finish()
        .context("Failed to finish gzip stream")?;

    std::fs::rename(&tmp_path, output_path)
        .context(format!("Failed to move {:?} to {:?}", tmp_path, output_path))?;

    Ok(())
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, bytes: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, bytes)
        .context(format!("Failed to add {} to tar", name))
}

/// Tar.gzからコーパスメタデータのみを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<CorpusMetadata> {
    let tar_gz_file = File::open(tar_gz_path)
        .context(format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;

    let decoder = GzDecoder::new(tar_gz_file);
    let mut archive = Archive::new(decoder);

    // metadata.jsonを探す
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;

        if path.to_str() == Some(METADATA_ENTRY) {
            let mut json_str = String::new();
            entry.read_to_string(&mut json_str)?;
            return CorpusMetadata::from_json_string(&json_str);
        }
    }

    Err(anyhow::anyhow!("metadata.json not found in tar.gz archive"))
}

/// メタデータとコーパスを共に読み込む
pub fn load_corpus(tar_gz_path: &Path) -> Result<(CorpusMetadata, Corpus)> {
    let tar_gz_file = File::open(tar_gz_path)
        .context(format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;

    let decoder = GzDecoder::new(tar_gz_file);
    let mut archive = Archive::new(decoder);

    let mut metadata_opt: Option<CorpusMetadata> = None;
    let mut blobs: HashMap<String, Vec<u8>> = HashMap::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().to_string();

        if name == METADATA_ENTRY {
            let mut json_str = String::new();
            entry.read_to_string(&mut json_str)?;
            metadata_opt = Some(CorpusMetadata::from_json_string(&json_str)?);
        } else {
            let mut buffer = Vec::new();
            entry.read_to_end(&mut buffer)?;
            blobs.insert(name, buffer);
        }
    }

    let metadata = metadata_opt.context("metadata.json not found in tar.gz archive")?;
    if metadata.format_version != CORPUS_FORMAT_VERSION {
        bail!(
            "unsupported corpus format version {} (expected {})",
            metadata.format_version,
            CORPUS_FORMAT_VERSION
        );
    }

    // メタデータの形状とバイナリの長さを突き合わせる
    for expected in field_shapes(metadata.num_samples, metadata.feature_len, metadata.num_classes) {
        let recorded = metadata
            .field(&expected.name)
            .context(format!("{} is not described in metadata.json", expected.name))?;
        if recorded != &expected {
            bail!(
                "{} has shape {:?}/{:?}, expected {:?}/{:?}",
                expected.name,
                recorded.dtype,
                recorded.shape,
                expected.dtype,
                expected.shape
            );
        }
        let byte_len = expected
            .byte_len()
            .context(format!("{} has an oversized shape {:?}", expected.name, expected.shape))?;
        let bytes = blobs
            .get(&expected.name)
            .context(format!("{} not found in tar.gz archive", expected.name))?;
        if bytes.len() != byte_len {
            bail!(
                "{} holds {} bytes, expected {}",
                expected.name,
                bytes.len(),
                byte_len
            );
        }
    }

    let take = |name: &str| blobs.get(name).map(Vec::as_slice).unwrap_or_default();
    let corpus = Corpus {
        feature_len: metadata.feature_len,
        num_classes: metadata.num_classes,
        vectors: bytes_to_f32(take(VECTORS_ENTRY)),
        labels: bytes_to_i32(take(LABELS_ENTRY)),
        one_hot: bytes_to_i32(take(ONE_HOT_ENTRY)),
        mean: bytes_to_f32(take(MEAN_ENTRY)),
        std: bytes_to_f32(take(STD_ENTRY)),
    };
    corpus.validate()?;

    Ok((metadata, corpus))
}

fn f32_to_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn i32_to_bytes(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn bytes_to_i32(bytes: &[u8]) -> Vec<i32> {
    bytes
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// メタデータをコンソールに表示
pub fn print_corpus_info(metadata: &CorpusMetadata) {
    println!("\n=== コーパスメタデータ ===");
    println!("形式バージョン: {}", metadata.format_version);
    println!("画像サイズ: {}x{}", metadata.image_width, metadata.image_height);
    println!("サンプル数: {}", metadata.num_samples);
    println!("特徴量数: {}", metadata.feature_len);
    println!("クラス数: {}", metadata.num_classes);
    for (class, count) in metadata.class_counts.iter().enumerate() {
        println!("  クラス {}: {} サンプル", class + 1, count);
    }
    println!("フィールド:");
    for field in &metadata.fields {
        println!("  {}: {:?} {:?}", field.name, field.dtype, field.shape);
    }
    println!("構築元: {}", metadata.source_dir);
    println!(
        "フィンガープリント: {}",
        metadata.fingerprint.as_deref().unwrap_or("(なし)")
    );
    println!("拡張オプション: {:?}", metadata.augment);
    println!(
        "ラベル抽出: {}",
        metadata.label_source.as_deref().unwrap_or("(不明)")
    );
    println!("構築日時: {}", metadata.built_at);
    println!("==========================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::builder::test_support::temp_dir;
    use crate::data::corpus::one_hot_encode;

    fn sample_corpus() -> Corpus {
        let labels = vec![0, 1, 2, 1];
        Corpus {
            feature_len: 3,
            num_classes: 3,
            vectors: vec![
                -1.5, 0.0, 2.25, 1e-7, -0.0, 3.5, f32::MIN_POSITIVE, 7.0, -8.0, 0.1, 0.2, 0.3,
            ],
            one_hot: one_hot_encode(&labels, 3),
            labels,
            mean: vec![0.25, 0.5, 0.75],
            std: vec![1.0, 2.0, 0.125],
        }
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = temp_dir("storage_roundtrip");
        let path = dir.join("nested").join("corpus.tar.gz");
        let corpus = sample_corpus();
        let metadata = CorpusMetadata::new(&corpus, 1, 1, "images/".to_string(), None);

        save_corpus_with_metadata(&path, &metadata, &corpus).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("partial").exists());

        let (loaded_metadata, loaded) = load_corpus(&path).unwrap();
        assert_eq!(loaded, corpus);
        assert_eq!(loaded_metadata.class_counts, vec![1, 2, 1]);

        let only_metadata = load_metadata(&path).unwrap();
        assert_eq!(only_metadata.num_samples, 4);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = temp_dir("storage_garbage");
        let path = dir.join("corpus.tar.gz");
        std::fs::write(&path, b"this is not gzip").unwrap();

        assert!(load_corpus(&path).is_err());
        assert!(load_metadata(&path).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_rejects_shape_disagreement() {
        let dir = temp_dir("storage_shape");
        let path = dir.join("corpus.tar.gz");
        let corpus = sample_corpus();
        let mut metadata = CorpusMetadata::new(&corpus, 1, 1, "images/".to_string(), None);
        metadata.num_samples = 5;

        save_corpus_with_metadata(&path, &metadata, &corpus).unwrap();
        let err = load_corpus(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("shape"), "{:#}", err);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_rejects_oversized_shapes() {
        let dir = temp_dir("storage_oversized");
        let path = dir.join("corpus.tar.gz");
        let corpus = sample_corpus();
        let mut metadata = CorpusMetadata::new(&corpus, 1, 1, "images/".to_string(), None);
        metadata.num_samples = usize::MAX / 2;
        metadata.fields = field_shapes(metadata.num_samples, metadata.feature_len, metadata.num_classes);

        save_corpus_with_metadata(&path, &metadata, &corpus).unwrap();
        let err = load_corpus(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("oversized"), "{:#}", err);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_byte_conversion_is_little_endian() {
        assert_eq!(i32_to_bytes(&[1, -1]), vec![1, 0, 0, 0, 255, 255, 255, 255]);
        assert_eq!(bytes_to_f32(&1.5f32.to_le_bytes()), vec![1.5]);
    }
}
