//! Canvas entity: the shared grid of palette indices.
//!
//! Cells are stored as `AtomicU8` so concurrent placements never produce a
//! torn read. Reads may lag the latest write of a neighbouring cell; that is
//! acceptable for single-pixel updates.

use std::sync::atomic::{AtomicU8, Ordering};

use super::error::CanvasError;

/// A 24-bit RGB color value (`0xRRGGBB`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(u32);

impl Color {
    pub fn new(rgb: u32) -> Self {
        Self(rgb & 0x00FF_FFFF)
    }

    /// Parse `#RRGGBB` (the leading `#` is optional).
    pub fn parse_hex(value: &str) -> Option<Self> {
        let digits = value.strip_prefix('#').unwrap_or(value);
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u32::from_str_radix(digits, 16).ok().map(Self)
    }

    pub fn to_hex(self) -> String {
        format!("#{:06X}", self.0)
    }
}

/// Ordered list of colors a pixel may take. Pixels store an index into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette(Vec<Color>);

impl Palette {
    pub fn new(colors: Vec<Color>) -> Self {
        Self(colors)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_index(&self, index: u8) -> bool {
        usize::from(index) < self.0.len()
    }

    pub fn to_hex_strings(&self) -> Vec<String> {
        self.0.iter().map(|c| c.to_hex()).collect()
    }
}

pub struct Canvas {
    width: u32,
    height: u32,
    palette: Palette,
    board: Box<[AtomicU8]>,
}

impl Canvas {
    /// Allocate a `width × height` board filled with `background`.
    ///
    /// `background` is not checked against the palette; configuration
    /// validation does that before the canvas is built.
    pub fn new(width: u32, height: u32, palette: Palette, background: u8) -> Self {
        let cells = width as usize * height as usize;
        let board = (0..cells).map(|_| AtomicU8::new(background)).collect();
        Self {
            width,
            height,
            palette,
            board,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Number of cells (`width × height`).
    pub fn len(&self) -> usize {
        self.board.len()
    }

    pub fn is_empty(&self) -> bool {
        self.board.is_empty()
    }

    fn index(&self, x: u32, y: u32) -> Result<usize, CanvasError> {
        if x >= self.width || y >= self.height {
            return Err(CanvasError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(x as usize + y as usize * self.width as usize)
    }

    pub fn get(&self, x: u32, y: u32) -> Result<u8, CanvasError> {
        let index = self.index(x, y)?;
        Ok(self.board[index].load(Ordering::Relaxed))
    }

    /// Overwrite one cell. The caller checks `color` against the palette.
    pub fn set(&self, x: u32, y: u32, color: u8) -> Result<(), CanvasError> {
        let index = self.index(x, y)?;
        self.board[index].store(color, Ordering::Relaxed);
        Ok(())
    }

    /// Raw row-major dump, one byte per cell.
    pub fn serialize(&self) -> Vec<u8> {
        self.board
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .collect()
    }

    /// Load a snapshot no larger than the board.
    ///
    /// A shorter snapshot overwrites the leading cells and leaves the rest
    /// untouched. An oversized one is refused; see [`Canvas::load_truncated`].
    pub fn load(&self, bytes: &[u8]) -> Result<(), CanvasError> {
        if bytes.len() > self.board.len() {
            return Err(CanvasError::SnapshotTooLarge {
                expected: self.board.len(),
                actual: bytes.len(),
            });
        }
        self.copy_from(bytes);
        Ok(())
    }

    /// Load a snapshot, dropping every byte past the configured size.
    pub fn load_truncated(&self, bytes: &[u8]) {
        let len = bytes.len().min(self.board.len());
        self.copy_from(&bytes[..len]);
    }

    fn copy_from(&self, bytes: &[u8]) {
        for (cell, value) in self.board.iter().zip(bytes) {
            cell.store(*value, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_color_canvas(width: u32, height: u32) -> Canvas {
        let palette = Palette::new(vec![Color::new(0xFFFFFF), Color::new(0x000000)]);
        Canvas::new(width, height, palette, 0)
    }

    #[test]
    fn test_new_get_set_serialize() {
        // テスト項目: 3x1 のキャンバスで get/set/serialize が期待通りに動く
        // given (前提条件):
        let canvas = two_color_canvas(3, 1);

        // when (操作):
        let before = canvas.get(1, 0).unwrap();
        canvas.set(1, 0, 1).unwrap();

        // then (期待する結果):
        assert_eq!(before, 0);
        assert_eq!(canvas.get(1, 0).unwrap(), 1);
        assert_eq!(canvas.serialize(), vec![0, 1, 0]);
    }

    #[test]
    fn test_out_of_bounds_is_an_error() {
        // テスト項目: 範囲外の座標はエラーになり、盤面は変化しない
        // given (前提条件):
        let canvas = two_color_canvas(3, 2);

        // when (操作):
        let get_result = canvas.get(3, 0);
        let set_result = canvas.set(0, 2, 1);

        // then (期待する結果):
        assert_eq!(
            get_result,
            Err(CanvasError::OutOfBounds {
                x: 3,
                y: 0,
                width: 3,
                height: 2
            })
        );
        assert!(set_result.is_err());
        assert_eq!(canvas.serialize(), vec![0; 6]);
    }

    #[test]
    fn test_row_major_layout() {
        // テスト項目: 盤面は行優先（x + y * width）で並ぶ
        // given (前提条件):
        let canvas = two_color_canvas(2, 2);

        // when (操作):
        canvas.set(0, 1, 1).unwrap();

        // then (期待する結果):
        assert_eq!(canvas.serialize(), vec![0, 0, 1, 0]);
    }

    #[test]
    fn test_load_serialize_round_trip() {
        // テスト項目: サイズが一致する場合 Load(Serialize()) で盤面が完全に再現される
        // given (前提条件):
        let source = two_color_canvas(4, 3);
        source.set(0, 0, 1).unwrap();
        source.set(3, 2, 1).unwrap();
        source.set(2, 1, 1).unwrap();
        let target = two_color_canvas(4, 3);

        // when (操作):
        target.load(&source.serialize()).unwrap();

        // then (期待する結果):
        assert_eq!(target.serialize(), source.serialize());
    }

    #[test]
    fn test_load_shorter_snapshot_keeps_tail() {
        // テスト項目: 短いスナップショットは先頭だけを上書きする
        // given (前提条件):
        let canvas = two_color_canvas(2, 2);
        canvas.set(1, 1, 1).unwrap();

        // when (操作):
        canvas.load(&[1, 1]).unwrap();

        // then (期待する結果):
        assert_eq!(canvas.serialize(), vec![1, 1, 0, 1]);
    }

    #[test]
    fn test_load_oversized_snapshot_is_refused() {
        // テスト項目: 大きすぎるスナップショットは拒否され、盤面は変化しない
        // given (前提条件):
        let canvas = two_color_canvas(2, 1);

        // when (操作):
        let result = canvas.load(&[1, 1, 1]);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(CanvasError::SnapshotTooLarge {
                expected: 2,
                actual: 3
            })
        );
        assert_eq!(canvas.serialize(), vec![0, 0]);
    }

    #[test]
    fn test_load_truncated_drops_extra_bytes() {
        // テスト項目: load_truncated は設定サイズまでで切り詰めて読み込む
        // given (前提条件):
        let canvas = two_color_canvas(2, 1);

        // when (操作):
        canvas.load_truncated(&[1, 0, 1, 1]);

        // then (期待する結果):
        assert_eq!(canvas.serialize(), vec![1, 0]);
    }

    #[test]
    fn test_color_hex_parsing() {
        // テスト項目: #RRGGBB 形式の文字列を Color に変換でき、逆変換も大文字になる
        // given (前提条件):
        let inputs = ["#ffffff", "000000", "#12AbCd", "#FFF", "#GGGGGG"];

        // when (操作):
        let parsed: Vec<Option<Color>> = inputs.iter().map(|s| Color::parse_hex(s)).collect();

        // then (期待する結果):
        assert_eq!(parsed[0], Some(Color::new(0xFFFFFF)));
        assert_eq!(parsed[1], Some(Color::new(0)));
        assert_eq!(parsed[2].map(Color::to_hex), Some("#12ABCD".to_string()));
        assert_eq!(parsed[3], None);
        assert_eq!(parsed[4], None);
    }

    #[test]
    fn test_color_hex_rejects_sign_prefix() {
        // テスト項目: 符号付きの 6 文字は 16 進数として受け付けない
        // given (前提条件):
        let inputs = ["+12345", "#+12345", "-12345"];

        // when (操作):
        let parsed: Vec<Option<Color>> = inputs.iter().map(|s| Color::parse_hex(s)).collect();

        // then (期待する結果):
        assert_eq!(parsed, vec![None, None, None]);
    }

    #[test]
    fn test_concurrent_writers_never_tear_cells() {
        // テスト項目: 複数スレッドから同時に書き込んでもセルはいずれかの書き込み値になる
        // given (前提条件):
        let canvas = std::sync::Arc::new(two_color_canvas(16, 16));

        // when (操作):
        let handles: Vec<_> = (0..4u8)
            .map(|worker| {
                let canvas = canvas.clone();
                std::thread::spawn(move || {
                    for y in 0..16 {
                        for x in 0..16 {
                            canvas.set(x, y, worker % 2).unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // then (期待する結果):
        assert!(canvas.serialize().iter().all(|&c| c == 0 || c == 1));
    }
}
