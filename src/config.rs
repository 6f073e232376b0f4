//! アプリケーション設定管理モジュール
//!
//! 計算デバイス、データ準備、モデル、学習の設定をJSON形式で保存・読み込みします。
//! 省略されたフィールドはデフォルト値で補われます。

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::data::{AugmentOptions, BuildOptions, CropBound, FilenameDigitLabel};

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    Wgpu,
    /// NdArray (CPU) バックエンド
    #[default]
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// データ準備の設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// 学習画像のディレクトリ
    pub data_dir: String,
    /// コーパスキャッシュ（tar.gz）のパス
    pub cache_path: String,
    /// 縮小後の画像サイズ（正方形）
    pub image_size: u32,
    /// 分類クラス数
    pub num_classes: usize,
    /// 学習用に回すサンプルの割合
    pub train_ratio: f32,
    /// シャッフルとノイズ拡張の乱数シード（未指定なら毎回生成）
    pub seed: Option<u64>,
    /// ファイル名の何文字目をクラス番号として読むか
    pub label_digit_position: usize,
    /// ノイズ付加後に0..255へ丸めるか
    pub clamp_noise: bool,
    /// 中央切り出しの右端の決め方
    pub crop_bound: CropBound,
    /// 壊れたキャッシュを自動で作り直すか
    pub rebuild_on_corrupt_cache: bool,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            data_dir: "images/".to_string(),
            cache_path: "training-data.tar.gz".to_string(),
            image_size: 32,
            num_classes: 3,
            train_ratio: 0.75,
            seed: None,
            label_digit_position: 0,
            clamp_noise: false,
            crop_bound: CropBound::default(),
            rebuild_on_corrupt_cache: false,
        }
    }
}

impl DataSettings {
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            image_width: self.image_size,
            image_height: self.image_size,
            num_classes: self.num_classes,
            augment: AugmentOptions {
                clamp_noise: self.clamp_noise,
                crop_bound: self.crop_bound,
            },
        }
    }

    pub fn label_extractor(&self) -> FilenameDigitLabel {
        FilenameDigitLabel::new(self.label_digit_position)
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// 学習時のドロップアウト率（全結合層）
    pub dropout_prob: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self { dropout_prob: 0.5 }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// 学習ステップ数（1ステップ = 1バッチ）
    pub max_steps: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// 学習率
    pub learning_rate: f64,
    /// 学習バッチの精度を出力する間隔
    pub train_log_interval: usize,
    /// テスト精度を出力する間隔
    pub test_log_interval: usize,
    /// テスト評価時のチャンクサイズ
    pub eval_batch_size: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            max_steps: 50500,
            batch_size: 50,
            learning_rate: 1e-3,
            train_log_interval: 100,
            test_log_interval: 1000,
            eval_batch_size: 500,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 計算デバイスの種類
    pub device_type: DeviceType,
    /// データ準備の設定
    pub data: DataSettings,
    /// モデル設定
    pub model: ModelSettings,
    /// トレーニング設定
    pub training: TrainingSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = serde_json::from_str(&content)
            .context(format!("Failed to parse config file: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// デフォルトパスから設定を読み込む、存在しない場合はデフォルト設定を返す
    pub fn load_or_default() -> Self {
        Self::load_or_default_from(Self::default_path())
    }

    /// 指定パスから設定を読み込む、失敗した場合はデフォルト設定を返す
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    info!("設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    warn!(
                        "設定ファイルの読み込みに失敗しました ({}): {:#}",
                        path.display(),
                        e
                    );
                    warn!("デフォルト設定を使用します");
                    Self::default()
                }
            }
        } else {
            info!("設定ファイルが存在しません。デフォルト設定を使用します");
            Self::default()
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 値の範囲を確認する
    pub fn validate(&self) -> anyhow::Result<()> {
        let data = &self.data;
        // プーリング2回で1x1以上残る大きさが必要
        if data.image_size < 4 {
            bail!("data.image_size must be at least 4, got {}", data.image_size);
        }
        if data.num_classes == 0 {
            bail!("data.num_classes must be positive");
        }
        if !(data.train_ratio > 0.0 && data.train_ratio <= 1.0) {
            bail!("data.train_ratio must be in (0, 1], got {}", data.train_ratio);
        }
        if !(0.0..1.0).contains(&self.model.dropout_prob) {
            bail!("model.dropout_prob must be in [0, 1), got {}", self.model.dropout_prob);
        }

        let training = &self.training;
        if training.batch_size == 0 || training.eval_batch_size == 0 {
            bail!("training.batch_size and training.eval_batch_size must be positive");
        }
        if training.train_log_interval == 0 || training.test_log_interval == 0 {
            bail!("training log intervals must be positive");
        }
        if !(training.learning_rate > 0.0) {
            bail!("training.learning_rate must be positive, got {}", training.learning_rate);
        }
        Ok(())
    }

    /// 設定情報を表示
    pub fn display(&self) {
        println!("=== アプリケーション設定 ===");
        println!("計算デバイス: {}", self.device_type);
        println!("\n--- データ設定 ---");
        println!("画像ディレクトリ: {}", self.data.data_dir);
        println!("キャッシュ: {}", self.data.cache_path);
        println!("画像サイズ: {}x{}", self.data.image_size, self.data.image_size);
        println!("分類クラス数: {}", self.data.num_classes);
        println!("学習データの割合: {}", self.data.train_ratio);
        match self.data.seed {
            Some(seed) => println!("シード: {}", seed),
            None => println!("シード: (自動生成)"),
        }
        println!("ノイズのクランプ: {}", self.data.clamp_noise);
        println!("切り出し境界: {:?}", self.data.crop_bound);
        println!("\n--- モデル設定 ---");
        println!("ドロップアウト率: {}", self.model.dropout_prob);
        println!("\n--- トレーニング設定 ---");
        println!("ステップ数: {}", self.training.max_steps);
        println!("バッチサイズ: {}", self.training.batch_size);
        println!("学習率: {}", self.training.learning_rate);
        println!(
            "ログ間隔: 学習 {} / テスト {}",
            self.training.train_log_interval, self.training.test_log_interval
        );
        println!("========================\n");
    }
}
