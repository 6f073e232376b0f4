//! ステップ単位の学習ループ
//!
//! `BatchCursor` で学習用サブセットからバッチを切り出し、Adamで更新します。
//! 一定間隔で学習バッチ精度とテスト精度をログに出します。

use anyhow::{bail, Result};
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion,
    },
};
use serde::Serialize;
use tracing::info;

use crate::config::AppConfig;
use crate::data::{BatchCursor, Split, Subset};
use crate::ml::cnn_model::{batch_tensors, correct_count, softmax_cross_entropy, BasicCnn, ModelConfig};

/// 学習バッチ評価の記録
#[derive(Debug, Clone, Serialize)]
pub struct StepMetrics {
    pub step: usize,
    pub loss: f32,
    /// 0.0 - 1.0
    pub accuracy: f32,
}

/// テスト評価の記録
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationMetrics {
    pub step: usize,
    pub accuracy: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub steps: usize,
    pub train_history: Vec<StepMetrics>,
    pub test_history: Vec<EvaluationMetrics>,
    pub final_test_accuracy: f32,
}

/// 設定からモデル設定を組み立てる
pub fn model_config(config: &AppConfig) -> ModelConfig {
    ModelConfig::new(config.data.num_classes)
        .with_image_size(config.data.image_size as usize)
        .with_dropout(config.model.dropout_prob)
}

/// モデル学習を実行
///
/// 学習済みモデル（評価用の内側バックエンド）とレポートを返す。
pub fn train_model<B: AutodiffBackend>(
    config: &AppConfig,
    split: &Split,
    device: &B::Device,
) -> Result<(BasicCnn<B::InnerBackend>, TrainingReport)> {
    let training = &config.training;
    let model_config = model_config(config);

    if split.train.is_empty() {
        bail!("training subset is empty");
    }
    if split.train.feature_len != model_config.feature_len() {
        bail!(
            "feature length {} does not match a {}x{} RGB input",
            split.train.feature_len,
            model_config.image_size,
            model_config.image_size
        );
    }

    info!(
        "[train] 学習 {} / テスト {} サンプル, {} ステップ, バッチ {}, 学習率 {}",
        split.train.len(),
        split.test.len(),
        training.max_steps,
        training.batch_size,
        training.learning_rate
    );

    let mut model: BasicCnn<B> = model_config.init(device);
    let mut optimizer = AdamConfig::new().init();
    let mut cursor = BatchCursor::new();

    let mut train_history = Vec::new();
    let mut test_history = Vec::new();

    for step in 0..training.max_steps {
        let batch = cursor.next(&split.train, training.batch_size);
        let (inputs, targets) = batch_tensors::<B>(batch.vectors, batch.one_hot, batch.rows, device);

        if step % training.train_log_interval == 0 {
            // ドロップアウト無しで現在のバッチを評価
            let valid_model = model.valid();
            let (eval_inputs, eval_targets) =
                batch_tensors::<B::InnerBackend>(batch.vectors, batch.one_hot, batch.rows, device);
            let logits = valid_model.forward(eval_inputs);
            let loss = softmax_cross_entropy(logits.clone(), eval_targets.clone())
                .into_scalar()
                .elem::<f32>();
            let accuracy = correct_count(logits, eval_targets) as f32 / batch.rows as f32;

            info!("[train] step {}, training accuracy {:.4} (loss {:.4})", step, accuracy, loss);
            train_history.push(StepMetrics { step, loss, accuracy });
        }

        let logits = model.forward(inputs);
        let loss = softmax_cross_entropy(logits, targets);
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        model = optimizer.step(training.learning_rate, model, grads);

        // 更新後のモデルでテスト精度を評価
        if step % training.test_log_interval == 0 {
            let accuracy = evaluate(&model.valid(), &split.test, training.eval_batch_size, device);
            info!("[train] step {}, test accuracy {:.4}", step, accuracy);
            test_history.push(EvaluationMetrics { step, accuracy });
        }
    }

    let trained = model.valid();
    let final_test_accuracy = evaluate(&trained, &split.test, training.eval_batch_size, device);
    info!("[train] test accuracy {:.4}", final_test_accuracy);

    Ok((
        trained,
        TrainingReport {
            steps: training.max_steps,
            train_history,
            test_history,
            final_test_accuracy,
        },
    ))
}

/// サブセット全体の正解率（`chunk_size` 行ずつ評価）
///
/// 空のサブセットでは0を返す。
pub fn evaluate<B: Backend>(
    model: &BasicCnn<B>,
    subset: &Subset,
    chunk_size: usize,
    device: &B::Device,
) -> f32 {
    let total = subset.len();
    if total == 0 {
        return 0.0;
    }

    let chunk_size = chunk_size.max(1);
    let mut correct = 0usize;
    let mut start = 0usize;
    while start < total {
        let end = (start + chunk_size).min(total);
        let (vectors, one_hot) = subset.rows(start, end);
        let (inputs, targets) = batch_tensors::<B>(vectors, one_hot, end - start, device);
        correct += correct_count(model.forward(inputs), targets);
        start = end;
    }

    correct as f32 / total as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = Autodiff<NdArray<f32>>;

    /// 4x4画像・クラスごとに定数値のサブセット
    fn toy_subset(rows: usize) -> Subset {
        let feature_len = 4 * 4 * 3;
        let mut vectors = Vec::with_capacity(rows * feature_len);
        let mut one_hot = Vec::with_capacity(rows * 3);
        for i in 0..rows {
            let class = i % 3;
            vectors.extend(std::iter::repeat(class as f32 - 1.0).take(feature_len));
            let mut row = [0; 3];
            row[class] = 1;
            one_hot.extend_from_slice(&row);
        }
        Subset {
            feature_len,
            num_classes: 3,
            vectors,
            one_hot,
        }
    }

    fn toy_config(max_steps: usize) -> AppConfig {
        let mut config = AppConfig::default();
        config.data.image_size = 4;
        config.training.max_steps = max_steps;
        config.training.batch_size = 4;
        config.training.train_log_interval = 1;
        config.training.test_log_interval = 2;
        config.training.eval_batch_size = 2;
        config
    }

    #[test]
    fn test_train_few_steps() {
        let device = NdArrayDevice::Cpu;
        let split = Split {
            train: toy_subset(9),
            test: toy_subset(5),
        };

        let (model, report) = train_model::<TestBackend>(&toy_config(3), &split, &device).unwrap();

        assert_eq!(report.steps, 3);
        assert_eq!(report.train_history.len(), 3);
        let test_steps: Vec<usize> = report.test_history.iter().map(|m| m.step).collect();
        assert_eq!(test_steps, vec![0, 2]);
        assert!(report.train_history.iter().all(|m| m.loss.is_finite()));
        assert!((0.0..=1.0).contains(&report.final_test_accuracy));

        let accuracy = evaluate(&model, &split.test, 3, &device);
        assert_eq!(accuracy, report.final_test_accuracy);
    }

    #[test]
    fn test_train_rejects_wrong_feature_len() {
        let device = NdArrayDevice::Cpu;
        let split = Split {
            train: toy_subset(3),
            test: toy_subset(3),
        };
        let mut config = toy_config(1);
        config.data.image_size = 8;

        assert!(train_model::<TestBackend>(&config, &split, &device).is_err());
    }

    #[test]
    fn test_evaluate_empty_subset() {
        let device = NdArrayDevice::Cpu;
        let model = ModelConfig::new(3)
            .with_image_size(4)
            .with_hidden_units(8)
            .init::<NdArray<f32>>(&device);
        let empty = Subset {
            feature_len: 48,
            num_classes: 3,
            vectors: Vec::new(),
            one_hot: Vec::new(),
        };
        assert_eq!(evaluate(&model, &empty, 10, &device), 0.0);
    }
}
