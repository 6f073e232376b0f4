//! 固定サイズのミニバッチを順番に切り出すカーソル

use super::split::Subset;

/// `next` が返す1バッチ分の借用ビュー
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub vectors: &'a [f32],
    pub one_hot: &'a [i32],
    /// 開始行
    pub start: usize,
    /// 行数（末尾では `batch_size` 未満になり得る）
    pub rows: usize,
}

/// 学習用サブセットの読み出し位置
///
/// オフセットが行数以上になったら0に戻す。末尾の半端なバッチはそのまま返し、
/// 先頭の行で埋め合わせない。
#[derive(Debug, Clone, Default)]
pub struct BatchCursor {
    offset: usize,
}

impl BatchCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }

    pub fn next<'a>(&mut self, subset: &'a Subset, batch_size: usize) -> Batch<'a> {
        let total = subset.len();
        if self.offset >= total {
            self.offset = 0;
        }

        let start = self.offset;
        let end = (start + batch_size).min(total);
        let (vectors, one_hot) = subset.rows(start, end);
        self.offset += batch_size;

        Batch {
            vectors,
            one_hot,
            start,
            rows: end - start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subset(rows: usize) -> Subset {
        Subset {
            feature_len: 2,
            num_classes: 3,
            vectors: (0..rows).flat_map(|i| [i as f32, i as f32]).collect(),
            one_hot: (0..rows).flat_map(|i| {
                let mut row = [0; 3];
                row[i % 3] = 1;
                row
            }).collect(),
        }
    }

    #[test]
    fn test_wraps_with_partial_tail() {
        let data = subset(120);
        let mut cursor = BatchCursor::new();

        let starts: Vec<(usize, usize)> = (0..4)
            .map(|i| {
                let batch = cursor.next(&data, 50);
                if i == 2 {
                    assert_eq!(cursor.offset(), 150);
                }
                (batch.start, batch.rows)
            })
            .collect();

        assert_eq!(starts, vec![(0, 50), (50, 50), (100, 20), (0, 50)]);
        assert_eq!(cursor.offset(), 50);
    }

    #[test]
    fn test_batch_slices_match_rows() {
        let data = subset(7);
        let mut cursor = BatchCursor::new();

        cursor.next(&data, 4);
        let batch = cursor.next(&data, 4);
        assert_eq!(batch.rows, 3);
        assert_eq!(batch.vectors, &[4.0, 4.0, 5.0, 5.0, 6.0, 6.0]);
        assert_eq!(batch.one_hot, &[0, 1, 0, 0, 0, 1, 1, 0, 0]);
    }

    #[test]
    fn test_exact_multiple_never_yields_empty_batch() {
        let data = subset(100);
        let mut cursor = BatchCursor::new();
        for _ in 0..10 {
            assert_eq!(cursor.next(&data, 50).rows, 50);
        }
    }

    #[test]
    fn test_batch_larger_than_subset() {
        let data = subset(3);
        let mut cursor = BatchCursor::new();
        let batch = cursor.next(&data, 50);
        assert_eq!((batch.start, batch.rows), (0, 3));
        assert_eq!(cursor.next(&data, 50).start, 0);
    }

    #[test]
    fn test_empty_subset_yields_empty_batch() {
        let data = subset(0);
        let mut cursor = BatchCursor::new();
        let batch = cursor.next(&data, 10);
        assert_eq!(batch.rows, 0);
        assert!(batch.vectors.is_empty());
    }
}
