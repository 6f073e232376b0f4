//! キャッシュ済みコーパスのメタデータを表示するバイナリ
//!
//! 使い方: inspect_corpus [cache.tar.gz]

use std::path::PathBuf;

use basic_cnn_lib::config::AppConfig;
use basic_cnn_lib::storage::{fingerprint_directory, load_corpus, load_metadata, print_corpus_info};

fn main() {
    println!("=== Corpus Inspector ===\n");

    // コマンドライン引数を取得
    let args: Vec<String> = std::env::args().collect();
    let cache_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(AppConfig::default().data.cache_path),
    };

    println!("Test 1: メタデータ読み込み");
    let metadata = match load_metadata(&cache_path) {
        Ok(metadata) => {
            println!("✓ メタデータ読み込み成功: {}", cache_path.display());
            print_corpus_info(&metadata);
            metadata
        }
        Err(e) => {
            eprintln!("✗ エラー: {:#}", e);
            std::process::exit(1);
        }
    };

    println!("\n{}\n", "=".repeat(50));

    println!("Test 2: 構築元ディレクトリとの照合");
    match fingerprint_directory(&PathBuf::from(&metadata.source_dir)) {
        Ok(Some(current)) if Some(&current) == metadata.fingerprint.as_ref() => {
            println!("✓ 構築元の内容は変わっていません ({})", current);
        }
        Ok(Some(current)) => {
            println!("✗ 構築元の内容が変わっています: {} (キャッシュは再構築されます)", current);
        }
        Ok(None) => {
            println!("- 構築元 {} が見つかりません", metadata.source_dir);
        }
        Err(e) => {
            eprintln!("✗ エラー: {}", e);
        }
    }

    println!("\n{}\n", "=".repeat(50));

    println!("Test 3: 配列の整合性チェック");
    match load_corpus(&cache_path) {
        Ok((_, corpus)) => {
            println!("✓ {} サンプルを読み込みました", corpus.len());
            println!("  平均の範囲: {:.3} .. {:.3}", min(&corpus.mean), max(&corpus.mean));
            println!("  標準偏差の範囲: {:.3} .. {:.3}", min(&corpus.std), max(&corpus.std));
        }
        Err(e) => {
            eprintln!("✗ エラー: {:#}", e);
        }
    }
}

fn min(values: &[f32]) -> f32 {
    values.iter().copied().fold(f32::INFINITY, f32::min)
}

fn max(values: &[f32]) -> f32 {
    values.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}
