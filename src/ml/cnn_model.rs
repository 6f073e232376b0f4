//! 3クラス分類用の小さなCNN
//!
//! 入力はコーパスのフラットなベクトル（HWC順、正規化済み）で、
//! モデル内部でNCHWに並べ替えて畳み込みにかけます。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Initializer, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation::log_softmax, backend::Backend, Int, Tensor, TensorData},
};

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 入力画像サイズ（正方形）
    #[config(default = 32)]
    pub image_size: usize,
    /// 全結合層のドロップアウト率
    #[config(default = 0.5)]
    pub dropout: f64,
    /// 隠れ全結合層のユニット数
    #[config(default = 1024)]
    pub hidden_units: usize,
    /// 重み初期化の標準偏差
    #[config(default = 0.1)]
    pub init_std: f64,
    /// バイアスの初期値
    #[config(default = 0.1)]
    pub init_bias: f64,
}

impl ModelConfig {
    /// 1サンプルの特徴量数
    pub fn feature_len(&self) -> usize {
        self.image_size * self.image_size * 3
    }

    /// 2回のプーリング後の一辺
    fn pooled_size(&self) -> usize {
        self.image_size / 2 / 2
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> BasicCnn<B> {
        let initializer = Initializer::Normal {
            mean: 0.0,
            std: self.init_std,
        };
        let pooled = self.pooled_size();
        let d = 64 * pooled * pooled;

        tracing::debug!(
            "[Model] 入力 {}x{}x3 -> Conv/Pool x2 -> 64x{}x{} -> FC {} -> {} -> {}",
            self.image_size,
            self.image_size,
            pooled,
            pooled,
            d,
            self.hidden_units,
            self.num_classes
        );

        // 重みは正規分布、バイアスは定数で初期化
        let bias = Initializer::Constant {
            value: self.init_bias,
        };

        // Conv1: 5x5 (same padding) 3 -> 32
        let mut conv1 = Conv2dConfig::new([3, 32], [5, 5])
            .with_padding(PaddingConfig2d::Same)
            .with_initializer(initializer.clone())
            .init(device);
        conv1.bias = Some(bias.init([32], device));

        // Conv2: 5x5 (same padding) 32 -> 64
        let mut conv2 = Conv2dConfig::new([32, 64], [5, 5])
            .with_padding(PaddingConfig2d::Same)
            .with_initializer(initializer.clone())
            .init(device);
        conv2.bias = Some(bias.init([64], device));

        // 全結合層
        let mut fc1 = LinearConfig::new(d, self.hidden_units)
            .with_initializer(initializer.clone())
            .init(device);
        fc1.bias = Some(bias.init([self.hidden_units], device));

        let mut fc2 = LinearConfig::new(self.hidden_units, self.num_classes)
            .with_initializer(initializer)
            .init(device);
        fc2.bias = Some(bias.init([self.num_classes], device));

        BasicCnn {
            conv1,
            pool1: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv2,
            pool2: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc1,
            dropout: DropoutConfig::new(self.dropout).init(),
            fc2,
            activation: Relu::new(),
            image_size: self.image_size,
        }
    }
}

/// 画像分類用CNNモデル
///
/// # アーキテクチャ
/// - {Conv 5x5 (same) + ReLU + MaxPool 2x2} x 2層
/// - Flatten
/// - FC: d -> hidden + ReLU + Dropout
/// - FC: hidden -> num_classes
///
/// ドロップアウトは自動微分バックエンドでのみ有効になる。
/// 評価時は `valid()` で取り出した内側のモデルを使う。
#[derive(Module, Debug)]
pub struct BasicCnn<B: Backend> {
    conv1: Conv2d<B>, // 3 -> 32
    pool1: MaxPool2d,
    conv2: Conv2d<B>, // 32 -> 64
    pool2: MaxPool2d,

    fc1: Linear<B>, // d -> hidden
    dropout: Dropout,
    fc2: Linear<B>, // hidden -> num_classes

    activation: Relu,
    image_size: usize,
}

impl<B: Backend> BasicCnn<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `inputs`: フラットなバッチ [batch_size, size * size * 3]（HWC順）
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch_size, _] = inputs.dims();
        let size = self.image_size;

        // [B, H, W, C] -> [B, C, H, W]
        let x = inputs.reshape([batch_size, size, size, 3]).permute([0, 3, 1, 2]);

        let x = self.conv1.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        // Flatten
        let [_, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        self.fc2.forward(x)
    }

    /// 予測クラスID [batch_size]
    pub fn predict(&self, inputs: Tensor<B, 2>) -> Tensor<B, 1, Int> {
        self.forward(inputs).argmax(1).squeeze_dim(1)
    }
}

/// one-hotターゲットに対するソフトマックス交差エントロピー（バッチ平均）
pub fn softmax_cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    (log_softmax(logits, 1) * targets).sum_dim(1).mean().neg()
}

/// 予測と正解（one-hot）の一致数
pub fn correct_count<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> usize {
    use burn::tensor::ElementConversion;

    logits
        .argmax(1)
        .equal(targets.argmax(1))
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

/// フラットなベクトルとone-hotをテンソルに変換
pub fn batch_tensors<B: Backend>(
    vectors: &[f32],
    one_hot: &[i32],
    rows: usize,
    device: &B::Device,
) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let feature_len = if rows == 0 { 0 } else { vectors.len() / rows };
    let num_classes = if rows == 0 { 0 } else { one_hot.len() / rows };

    let inputs = Tensor::<B, 2>::from_floats(TensorData::new(vectors.to_vec(), [rows, feature_len]), device);
    let targets: Vec<f32> = one_hot.iter().map(|&v| v as f32).collect();
    let targets = Tensor::<B, 2>::from_floats(TensorData::new(targets, [rows, num_classes]), device);

    (inputs, targets)
}
