//! 画像ファイルの列挙・読み込みとファイル名からのラベル抽出

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};

use super::error::DatasetError;

/// ファイル名からクラスラベル（0始まり）を取り出すインターフェース
pub trait LabelExtractor {
    fn extract(&self, file_name: &str) -> Option<usize>;

    /// キャッシュの再利用判定に使う抽出規則の表記（比較できないなら `None`）
    fn describe(&self) -> Option<String> {
        None
    }
}

impl<F> LabelExtractor for F
where
    F: Fn(&str) -> Option<usize>,
{
    fn extract(&self, file_name: &str) -> Option<usize> {
        self(file_name)
    }
}

/// ファイル名の固定位置の数字をクラス番号として読む
///
/// 例: `position = 0, base = 1` のとき `"2_cat.jpg"` はラベル 1 になる。
#[derive(Debug, Clone, Copy)]
pub struct FilenameDigitLabel {
    pub position: usize,
    pub base: usize,
}

impl Default for FilenameDigitLabel {
    fn default() -> Self {
        Self {
            position: 0,
            base: 1,
        }
    }
}

impl FilenameDigitLabel {
    pub fn new(position: usize) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

impl LabelExtractor for FilenameDigitLabel {
    fn extract(&self, file_name: &str) -> Option<usize> {
        let digit = file_name.chars().nth(self.position)?.to_digit(10)? as usize;
        digit.checked_sub(self.base)
    }

    fn describe(&self) -> Option<String> {
        Some(format!("filename-digit@{}-{}", self.position, self.base))
    }
}

/// 画像を読み込んでRGB 8bitに変換
///
/// 形式は拡張子ではなくファイル先頭のバイト列から判定する。
pub fn load_image(path: &Path) -> Result<RgbImage, DatasetError> {
    let decode_failure = |source: image::ImageError| DatasetError::DecodeFailure {
        path: path.to_path_buf(),
        source,
    };

    ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| decode_failure(image::ImageError::IoError(e)))?
        .decode()
        .map(|img| img.to_rgb8())
        .map_err(decode_failure)
}

/// ディレクトリ直下の画像ファイルを名前順で列挙（再帰しない）
pub fn list_image_files(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    if !dir.is_dir() {
        return Err(DatasetError::DirectoryNotFound(dir.to_path_buf()));
    }

    let valid_extensions: HashSet<String> = image::ImageFormat::all()
        .flat_map(|format| format.extensions_str())
        .map(|ext| ext.to_string())
        .collect();

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| is_valid_extension(path, &valid_extensions))
        .collect();

    // read_dirの順序はファイルシステム依存なので常にソートする
    files.sort_unstable();

    Ok(files)
}

fn is_valid_extension(path: &Path, valid_extensions: &HashSet<String>) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| valid_extensions.contains(&ext.to_lowercase()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_digit_label() {
        let extractor = FilenameDigitLabel::default();
        assert_eq!(extractor.extract("1_a.jpg"), Some(0));
        assert_eq!(extractor.extract("3xyz.png"), Some(2));
        assert_eq!(extractor.extract("0_a.jpg"), None);
        assert_eq!(extractor.extract("cat.jpg"), None);
        assert_eq!(extractor.extract(""), None);
    }

    #[test]
    fn test_filename_digit_label_position() {
        let extractor = FilenameDigitLabel::new(4);
        assert_eq!(extractor.extract("img_2.jpg"), Some(1));
    }

    #[test]
    fn test_closure_label_extractor() {
        let extractor = |name: &str| if name.starts_with("dog") { Some(1) } else { Some(0) };
        assert_eq!(LabelExtractor::extract(&extractor, "dog_01.png"), Some(1));
        assert_eq!(LabelExtractor::extract(&extractor, "cat_01.png"), Some(0));
        assert_eq!(LabelExtractor::describe(&extractor), None);
    }

    #[test]
    fn test_filename_digit_label_describe() {
        assert_eq!(
            FilenameDigitLabel::default().describe().as_deref(),
            Some("filename-digit@0-1")
        );
        assert_ne!(FilenameDigitLabel::new(4).describe(), FilenameDigitLabel::default().describe());
    }

    #[test]
    fn test_list_image_files_filters_and_sorts() {
        let dir = std::env::temp_dir().join(format!("basic_cnn_list_{}", std::process::id()));
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        for name in ["2_b.PNG", "1_a.jpg", "notes.txt", "3_c.jpeg"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }

        let files = list_image_files(&dir).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["1_a.jpg", "2_b.PNG", "3_c.jpeg"]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_list_image_files_missing_dir() {
        let dir = std::env::temp_dir().join("basic_cnn_does_not_exist_dir");
        assert!(matches!(
            list_image_files(&dir),
            Err(DatasetError::DirectoryNotFound(_))
        ));
    }

    #[test]
    fn test_load_image_decode_failure() {
        let dir = std::env::temp_dir().join(format!("basic_cnn_decode_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("1_broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        assert!(matches!(
            load_image(&path),
            Err(DatasetError::DecodeFailure { .. })
        ));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_image_ignores_misleading_extension() {
        let dir = std::env::temp_dir().join(format!("basic_cnn_sniff_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let png = dir.join("source.png");
        RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30])).save(&png).unwrap();
        // 中身はPNGのまま拡張子だけ .jpg にする
        let path = dir.join("1_a.jpg");
        std::fs::rename(&png, &path).unwrap();

        let img = load_image(&path).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1).0, [10, 20, 30]);

        std::fs::remove_dir_all(&dir).ok();
    }
}
