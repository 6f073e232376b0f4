//! データ拡張
//!
//! 1枚の画像から以下の6サンプルを生成します（順序固定）:
//! 1. そのまま縮小
//! 2. 左右反転
//! 3. ガウスノイズ付加（平均50, 標準偏差50）
//! 4. コントラスト強調（輝度チャネルのみヒストグラム平坦化）
//! 5. 中央切り出し（上下左右10%）
//! 6. 中心回転（反時計回り20度）
//!
//! すべて面積平均で目標解像度に縮小し、`[y][x][RGB]` 順に平坦化します。

use image::{imageops, GrayImage, Luma, Rgb, Rgb32FImage, RgbImage};
use imageproc::contrast::equalize_histogram;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// 1枚の画像から生成されるサンプル数
pub const SAMPLES_PER_IMAGE: usize = 6;

const NOISE_MEAN: f32 = 50.0;
const NOISE_STD: f32 = 50.0;
const CROP_FRACTION: f64 = 0.1;
const ROTATION_DEGREES: f32 = 20.0;

/// 切り出しの水平方向マージンの計算方法
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CropBound {
    /// 左右とも幅の10%
    #[default]
    Width,
    /// 右端のみ高さの10%で計算する旧実装互換モード
    HeightQuirk,
}

/// 拡張の挙動オプション
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AugmentOptions {
    /// ノイズ付加後に0..=255へ丸めるか
    pub clamp_noise: bool,
    pub crop_bound: CropBound,
}

/// 1枚分の拡張結果（ラベル + 平坦化済みピクセル）
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub pixels: Vec<f32>,
    pub label: usize,
}

/// 画像1枚から固定セットの拡張サンプルを生成する
#[derive(Debug, Clone)]
pub struct Augmenter {
    width: u32,
    height: u32,
    options: AugmentOptions,
}

impl Augmenter {
    pub fn new(width: u32, height: u32, options: AugmentOptions) -> Self {
        Self {
            width,
            height,
            options,
        }
    }

    /// 1サンプルあたりの特徴量数 (W*H*3)
    pub fn feature_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn augment<R: Rng + ?Sized>(&self, img: &RgbImage, label: usize, rng: &mut R) -> Vec<Sample> {
        let variants = [
            to_f32(img),
            to_f32(&imageops::flip_horizontal(img)),
            self.add_noise(img, rng),
            to_f32(&equalize_luma(img)),
            to_f32(&center_crop(img, self.options.crop_bound)),
            to_f32(&rotate(img)),
        ];

        variants
            .iter()
            .map(|variant| Sample {
                pixels: resize_area(variant, self.width, self.height),
                label,
            })
            .collect()
    }

    fn add_noise<R: Rng + ?Sized>(&self, img: &RgbImage, rng: &mut R) -> Rgb32FImage {
        let mut noisy = to_f32(img);
        for value in noisy.iter_mut() {
            let z: f32 = rng.sample(StandardNormal);
            *value += NOISE_MEAN + NOISE_STD * z;
            if self.options.clamp_noise {
                *value = value.clamp(0.0, 255.0);
            }
        }
        noisy
    }
}

fn to_f32(img: &RgbImage) -> Rgb32FImage {
    // DynamicImage::to_rgb32f は0..1に正規化してしまうので値域を保ったまま変換する
    Rgb32FImage::from_fn(img.width(), img.height(), |x, y| {
        Rgb(img.get_pixel(x, y).0.map(f32::from))
    })
}

/// 面積平均による縮小
///
/// どちらかの軸が拡大になる場合は両軸とも画素中心基準のバイリニア補間に切り替える。
/// 戻り値は `[y][x][c]` 順に平坦化したピクセル列。
pub fn resize_area(src: &Rgb32FImage, dst_width: u32, dst_height: u32) -> Vec<f32> {
    let (src_width, src_height) = src.dimensions();
    if (src_width, src_height) == (dst_width, dst_height) {
        return src.as_raw().clone();
    }

    let weights: fn(usize, usize) -> Vec<Vec<(usize, f32)>> =
        if dst_width <= src_width && dst_height <= src_height {
            area_weights
        } else {
            linear_weights
        };
    let x_weights = weights(src_width as usize, dst_width as usize);
    let y_weights = weights(src_height as usize, dst_height as usize);
    let src_raw = src.as_raw();

    // 水平方向
    let mut horizontal = vec![0.0f32; src_height as usize * dst_width as usize * 3];
    for y in 0..src_height as usize {
        for (dx, weights) in x_weights.iter().enumerate() {
            let out = (y * dst_width as usize + dx) * 3;
            for &(sx, w) in weights {
                let inp = (y * src_width as usize + sx) * 3;
                for c in 0..3 {
                    horizontal[out + c] += src_raw[inp + c] * w;
                }
            }
        }
    }

    // 垂直方向
    let mut result = vec![0.0f32; dst_height as usize * dst_width as usize * 3];
    for (dy, weights) in y_weights.iter().enumerate() {
        for x in 0..dst_width as usize {
            let out = (dy * dst_width as usize + x) * 3;
            for &(sy, w) in weights {
                let inp = (sy * dst_width as usize + x) * 3;
                for c in 0..3 {
                    result[out + c] += horizontal[inp + c] * w;
                }
            }
        }
    }

    result
}

/// 出力1画素ごとの (入力インデックス, 重み) の一覧。重みの和は1。
fn area_weights(src_len: usize, dst_len: usize) -> Vec<Vec<(usize, f32)>> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|i| {
            let start = i as f64 * scale;
            let end = ((i + 1) as f64 * scale).min(src_len as f64);
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src_len);
            (first..last)
                .filter_map(|s| {
                    let overlap = end.min((s + 1) as f64) - start.max(s as f64);
                    (overlap > 0.0).then(|| (s, (overlap / scale) as f32))
                })
                .collect()
        })
        .collect()
}

/// 画素中心を合わせたバイリニア補間の重み。端は最端画素で打ち切る。
fn linear_weights(src_len: usize, dst_len: usize) -> Vec<Vec<(usize, f32)>> {
    let scale = src_len as f64 / dst_len as f64;
    let last = src_len.saturating_sub(1);
    (0..dst_len)
        .map(|i| {
            let pos = (i as f64 + 0.5) * scale - 0.5;
            let (s0, frac) = if pos <= 0.0 {
                (0, 0.0)
            } else if pos >= last as f64 {
                (last, 0.0)
            } else {
                (pos.floor() as usize, pos - pos.floor())
            };
            let s1 = (s0 + 1).min(last);
            [(s0, 1.0 - frac), (s1, frac)]
                .into_iter()
                .filter(|&(_, w)| w > 0.0)
                .map(|(s, w)| (s, w as f32))
                .collect()
        })
        .collect()
}

/// YUV変換してYのみヒストグラム平坦化し、RGBへ戻す（BT.601係数）
pub fn equalize_luma(img: &RgbImage) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut luma = GrayImage::new(width, height);
    let mut chroma = Vec::with_capacity((width * height) as usize);

    for (x, y, pixel) in img.enumerate_pixels() {
        let [r, g, b] = pixel.0.map(|v| v as f32);
        let y_val = 0.299 * r + 0.587 * g + 0.114 * b;
        let u = (b - y_val) * 0.492 + 128.0;
        let v = (r - y_val) * 0.877 + 128.0;
        luma.put_pixel(x, y, Luma([saturate(y_val)]));
        // U/Vも8bitに丸めてから逆変換する
        chroma.push((saturate(u) as f32, saturate(v) as f32));
    }

    let equalized = equalize_histogram(&luma);

    let mut out = RgbImage::new(width, height);
    for ((x, y, pixel), &(u, v)) in out.enumerate_pixels_mut().zip(chroma.iter()) {
        let y_val = equalized.get_pixel(x, y)[0] as f32;
        let r = y_val + 1.140 * (v - 128.0);
        let g = y_val - 0.395 * (u - 128.0) - 0.581 * (v - 128.0);
        let b = y_val + 2.032 * (u - 128.0);
        *pixel = Rgb([saturate(r), saturate(g), saturate(b)]);
    }
    out
}

fn saturate(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// 切り出し範囲 (x, y, width, height)
pub fn crop_bounds(width: u32, height: u32, bound: CropBound) -> (u32, u32, u32, u32) {
    let margin_y = (CROP_FRACTION * height as f64) as u32;
    let margin_left = (CROP_FRACTION * width as f64) as u32;
    let margin_right = match bound {
        CropBound::Width => margin_left,
        CropBound::HeightQuirk => margin_y,
    };

    let top = margin_y.min(height.saturating_sub(1));
    let bottom = height.saturating_sub(margin_y).max(top + 1);
    let left = margin_left.min(width.saturating_sub(1));
    let right = width.saturating_sub(margin_right).max(left + 1);

    (left, top, right - left, bottom - top)
}

pub fn center_crop(img: &RgbImage, bound: CropBound) -> RgbImage {
    let (x, y, w, h) = crop_bounds(img.width(), img.height(), bound);
    imageops::crop_imm(img, x, y, w, h).to_image()
}

/// キャンバスサイズを保ったまま中心で反時計回りに回転（はみ出し部分は黒）
pub fn rotate(img: &RgbImage) -> RgbImage {
    // imageprocは時計回りが正
    let theta = -ROTATION_DEGREES.to_radians();
    rotate_about_center(img, theta, Interpolation::Bilinear, Rgb([0, 0, 0]))
}
