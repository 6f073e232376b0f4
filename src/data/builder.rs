//! ディレクトリから拡張・正規化済みコーパスを構築

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::augment::{AugmentOptions, Augmenter};
use super::corpus::{feature_statistics, normalize_in_place, one_hot_encode, Corpus};
use super::error::DatasetError;
use super::image_loader::{list_image_files, load_image, FilenameDigitLabel, LabelExtractor};

/// コーパス構築の設定
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub image_width: u32,
    pub image_height: u32,
    pub num_classes: usize,
    pub augment: AugmentOptions,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            image_width: 32,
            image_height: 32,
            num_classes: 3,
            augment: AugmentOptions::default(),
        }
    }
}

impl BuildOptions {
    pub fn feature_len(&self) -> usize {
        self.image_width as usize * self.image_height as usize * 3
    }
}

/// 画像ディレクトリ → Corpus
pub struct DatasetBuilder {
    options: BuildOptions,
    augmenter: Augmenter,
    label_extractor: Box<dyn LabelExtractor>,
    rng: StdRng,
}

impl DatasetBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            augmenter: Augmenter::new(options.image_width, options.image_height, options.augment),
            label_extractor: Box::new(FilenameDigitLabel::default()),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_label_extractor(mut self, extractor: impl LabelExtractor + 'static) -> Self {
        self.label_extractor = Box::new(extractor);
        self
    }

    /// ノイズ拡張の乱数シードを固定
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// ラベル抽出規則の表記
    pub fn label_source(&self) -> Option<String> {
        self.label_extractor.describe()
    }

    pub fn build(&mut self, dir: &Path) -> Result<Corpus, DatasetError> {
        let feature_len = self.options.feature_len();
        let num_classes = self.options.num_classes;
        let files = list_image_files(dir)?;

        info!("[dataset] {} 件の画像ファイルを処理します: {}", files.len(), dir.display());

        let mut vectors: Vec<f32> = Vec::new();
        let mut labels: Vec<i32> = Vec::new();
        let mut used_images = 0usize;
        let mut skipped = 0usize;

        for path in &files {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let label = match self.label_extractor.extract(&file_name) {
                Some(label) if label < num_classes => label,
                other => {
                    warn!("[dataset] ラベルを決定できないためスキップ: {} ({:?})", file_name, other);
                    skipped += 1;
                    continue;
                }
            };

            let img = match load_image(path) {
                Ok(img) => img,
                Err(e) => {
                    warn!("[dataset] 画像読み込み失敗のためスキップ: {}", e);
                    skipped += 1;
                    continue;
                }
            };

            for sample in self.augmenter.augment(&img, label, &mut self.rng) {
                if sample.pixels.len() != feature_len {
                    return Err(DatasetError::ShapeMismatch(format!(
                        "{} produced a vector of length {} (expected {})",
                        file_name,
                        sample.pixels.len(),
                        feature_len
                    )));
                }
                vectors.extend_from_slice(&sample.pixels);
                labels.push(sample.label as i32);
            }
            used_images += 1;
            debug!("[dataset] {} -> label {}", file_name, label);
        }

        if labels.is_empty() {
            return Err(DatasetError::EmptyCorpus(dir.to_path_buf()));
        }

        let (mean, std) = feature_statistics(&vectors, feature_len);
        normalize_in_place(&mut vectors, &mean, &std);
        let one_hot = one_hot_encode(&labels, num_classes);

        let corpus = Corpus {
            feature_len,
            num_classes,
            vectors,
            labels,
            one_hot,
            mean,
            std,
        };
        corpus.validate()?;

        info!(
            "[dataset] 構築完了: 画像 {} 枚 (スキップ {}) -> サンプル {} 件",
            used_images,
            skipped,
            corpus.len()
        );
        for (class, count) in corpus.class_counts().iter().enumerate() {
            info!("[dataset]   クラス {}: {} サンプル", class + 1, count);
        }

        Ok(corpus)
    }
}

/// 乱数シードを決定（未指定なら生成してログに残す）
pub fn resolve_seed(seed: Option<u64>) -> u64 {
    match seed {
        Some(seed) => seed,
        None => {
            let seed = rand::thread_rng().gen();
            info!("[dataset] シード未指定のため生成しました: {}", seed);
            seed
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::data::augment::SAMPLES_PER_IMAGE;

    #[test]
    fn test_build_counts_and_labels() {
        let dir = temp_dir("build_counts");
        write_labeled_images(&dir, 6);

        let corpus = DatasetBuilder::new(BuildOptions::default())
            .with_seed(1)
            .build(&dir)
            .unwrap();

        assert_eq!(corpus.len(), 6 * SAMPLES_PER_IMAGE);
        assert_eq!(corpus.labels.len(), corpus.one_hot_rows());
        assert_eq!(corpus.feature_len, 32 * 32 * 3);
        assert_eq!(corpus.class_counts(), vec![12, 12, 12]);
        // ファイル名順: 1_img_00, 1_img_03, 2_img_01, ...
        assert_eq!(&corpus.labels[..12], &[0; 12]);
        assert_eq!(&corpus.labels[12..24], &[1; 12]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_build_skips_corrupt_file() {
        let dir = temp_dir("build_corrupt");
        write_labeled_images(&dir, 9);
        std::fs::write(dir.join("2_corrupt.png"), b"not an image").unwrap();

        let corpus = DatasetBuilder::new(BuildOptions::default())
            .with_seed(2)
            .build(&dir)
            .unwrap();

        assert_eq!(corpus.len(), 54);
        assert_eq!(corpus.labels.len(), 54);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_build_normalized_statistics() {
        let dir = temp_dir("build_stats");
        write_labeled_images(&dir, 5);

        let corpus = DatasetBuilder::new(BuildOptions::default())
            .with_seed(3)
            .build(&dir)
            .unwrap();

        let rows = corpus.len() as f64;
        for f in 0..corpus.feature_len {
            let column: Vec<f64> = (0..corpus.len()).map(|r| corpus.vector(r)[f] as f64).collect();
            let mean = column.iter().sum::<f64>() / rows;
            let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / rows;
            assert!(mean.abs() < 1e-3, "feature {f} mean {mean}");
            // 定数列は全て0になる
            assert!((var.sqrt() - 1.0).abs() < 1e-3 || var < 1e-9, "feature {f} std {}", var.sqrt());
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_build_empty_directory() {
        let dir = temp_dir("build_empty");
        std::fs::write(dir.join("1_corrupt.jpg"), b"garbage").unwrap();

        let result = DatasetBuilder::new(BuildOptions::default()).build(&dir);
        assert!(matches!(result, Err(DatasetError::EmptyCorpus(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_build_skips_unlabeled_files() {
        let dir = temp_dir("build_unlabeled");
        write_labeled_images(&dir, 3);
        write_image(&dir, "cat.png", 99);
        write_image(&dir, "7_out_of_range.png", 98);

        let corpus = DatasetBuilder::new(BuildOptions::default())
            .with_seed(4)
            .build(&dir)
            .unwrap();
        assert_eq!(corpus.len(), 3 * SAMPLES_PER_IMAGE);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_build_with_custom_label_extractor() {
        let dir = temp_dir("build_custom_label");
        write_image(&dir, "dog_a.png", 1);
        write_image(&dir, "cat_a.png", 2);

        let corpus = DatasetBuilder::new(BuildOptions::default())
            .with_label_extractor(|name: &str| Some(usize::from(name.starts_with("dog"))))
            .with_seed(5)
            .build(&dir)
            .unwrap();

        // cat_a.png が先（ソート順）
        assert_eq!(corpus.labels[0], 0);
        assert_eq!(corpus.labels[SAMPLES_PER_IMAGE], 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
