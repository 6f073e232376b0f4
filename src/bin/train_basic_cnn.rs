//! 画像ディレクトリからコーパスを用意してCNNを学習するバイナリ
//!
//! 使い方: train_basic_cnn [config.json] [data_dir]

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::backend::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use burn_wgpu::{Wgpu, WgpuDevice};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use basic_cnn_lib::config::{AppConfig, DeviceType};
use basic_cnn_lib::data::{resolve_seed, shuffle_and_split, DatasetBuilder};
use basic_cnn_lib::logging::init_tracing;
use basic_cnn_lib::ml::{train_model, TrainingReport};
use basic_cnn_lib::storage::{load_metadata, print_corpus_info, CorpusCache};

fn main() -> Result<()> {
    init_tracing()?;

    // コマンドライン引数を取得
    let args: Vec<String> = std::env::args().collect();
    let mut config = match args.get(1) {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_or_default(),
    };
    if let Some(data_dir) = args.get(2) {
        config.data.data_dir = data_dir.clone();
    }
    config.validate()?;
    config.display();

    let seed = resolve_seed(config.data.seed);
    let data_dir = PathBuf::from(&config.data.data_dir);
    let cache_path = PathBuf::from(&config.data.cache_path);

    let mut builder = DatasetBuilder::new(config.data.build_options())
        .with_label_extractor(config.data.label_extractor())
        .with_seed(seed);
    let cache = CorpusCache::new(&cache_path).rebuild_on_corrupt(config.data.rebuild_on_corrupt_cache);
    let corpus = cache
        .load_or_build(&data_dir, &mut builder)
        .context(format!("Failed to prepare corpus from {:?}", data_dir))?;

    let metadata = load_metadata(&cache_path)?;
    print_corpus_info(&metadata);

    let mut rng = StdRng::seed_from_u64(seed);
    let split = shuffle_and_split(&corpus, config.data.train_ratio, &mut rng)?;
    println!("Size of training set: {}", split.train.len());
    println!("Size of test set: {}", split.test.len());

    let report = match config.device_type {
        DeviceType::Wgpu => {
            let device = WgpuDevice::default();
            train_model::<Autodiff<Wgpu>>(&config, &split, &device)?.1
        }
        DeviceType::Cpu => {
            let device = NdArrayDevice::Cpu;
            train_model::<Autodiff<NdArray>>(&config, &split, &device)?.1
        }
    };

    print_report(&report);
    info!("学習が完了しました");
    Ok(())
}

fn print_report(report: &TrainingReport) {
    println!("\n=== 学習結果 ===");
    println!("ステップ数: {}", report.steps);
    if let Some(last) = report.train_history.last() {
        println!("最終学習バッチ精度 (step {}): {:.4}", last.step, last.accuracy);
    }
    for eval in &report.test_history {
        println!("  step {}: test accuracy {:.4}", eval.step, eval.accuracy);
    }
    println!("Final test accuracy {:.4}", report.final_test_accuracy);
    println!("================");
}
