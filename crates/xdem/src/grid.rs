//! Owned row-major numeric buffer.

use crate::{DemError, Result};

/// Row-major grid of samples, row 0 first.
///
/// Elevation grids run north to south; masks share the same layout so that
/// they can be combined cell by cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T = f32> {
    width: usize,
    height: usize,
    values: Vec<T>,
}

impl<T: Copy> Grid<T> {
    /// Grid filled with a single value.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            values: vec![value; width * height],
        }
    }

    /// Wrap an existing buffer.
    pub fn from_vec(width: usize, height: usize, values: Vec<T>) -> Result<Self> {
        if values.len() != width * height {
            return Err(DemError::SizeMismatch {
                expected_width: width,
                expected_height: height,
                width: values.len(),
                height: 1,
            });
        }
        Ok(Self { width, height, values })
    }

    /// Build a grid by evaluating `f(row, col)` for every cell.
    pub fn from_fn<F: FnMut(usize, usize) -> T>(width: usize, height: usize, mut f: F) -> Self {
        let mut values = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                values.push(f(row, col));
            }
        }
        Self { width, height, values }
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Value at `(row, col)`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.values[row * self.width + col]
    }

    /// Overwrite the value at `(row, col)`.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.values[row * self.width + col] = value;
    }

    /// One row as a slice.
    pub fn row(&self, row: usize) -> &[T] {
        &self.values[row * self.width..(row + 1) * self.width]
    }

    /// One row as a mutable slice.
    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        &mut self.values[row * self.width..(row + 1) * self.width]
    }

    /// All values, row-major.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// All values, row-major, mutable.
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Give up the buffer.
    pub fn into_vec(self) -> Vec<T> {
        self.values
    }

    /// Copy a rectangular window into a new grid.
    pub fn window(&self, row0: usize, col0: usize, height: usize, width: usize) -> Self {
        let mut values = Vec::with_capacity(width * height);
        for row in row0..row0 + height {
            values.extend_from_slice(&self.row(row)[col0..col0 + width]);
        }
        Self { width, height, values }
    }

    /// Paste `block` with its top-left corner at `(row0, col0)`.
    pub fn paste(&mut self, row0: usize, col0: usize, block: &Grid<T>) {
        for row in 0..block.height {
            let dst = &mut self.row_mut(row0 + row)[col0..col0 + block.width];
            dst.copy_from_slice(block.row(row));
        }
    }

    /// Swap rows and columns.
    pub fn transposed(&self) -> Self {
        Self::from_fn(self.height, self.width, |row, col| self.get(col, row))
    }

    /// Reverse the row order (bottom-to-top storage to north-first).
    pub fn flip_rows(&mut self) {
        for row in 0..self.height / 2 {
            let other = self.height - 1 - row;
            let (head, tail) = self.values.split_at_mut(other * self.width);
            head[row * self.width..(row + 1) * self.width].swap_with_slice(&mut tail[..self.width]);
        }
    }
}

impl Grid<f32> {
    /// Minimum, maximum and mean over all cells.
    pub fn stats(&self) -> (f32, f32, f64) {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        for &v in &self.values {
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
        }
        let mean = if self.values.is_empty() {
            0.0
        } else {
            sum / self.values.len() as f64
        };
        (min, max, mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fn_layout() {
        let grid = Grid::from_fn(3, 2, |row, col| (row * 10 + col) as f32);
        assert_eq!(grid.values(), &[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
        assert_eq!(grid.get(1, 2), 12.0);
        assert_eq!(grid.row(1), &[10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        assert!(Grid::from_vec(2, 2, vec![0.0f32; 3]).is_err());
        assert!(Grid::from_vec(2, 2, vec![0.0f32; 4]).is_ok());
    }

    #[test]
    fn test_window_and_paste() {
        let src = Grid::from_fn(4, 4, |row, col| (row * 4 + col) as f32);
        let win = src.window(1, 2, 2, 2);
        assert_eq!(win.values(), &[6.0, 7.0, 10.0, 11.0]);

        let mut dst = Grid::filled(3, 3, 0.0f32);
        dst.paste(1, 1, &win);
        assert_eq!(dst.row(0), &[0.0, 0.0, 0.0]);
        assert_eq!(dst.row(1), &[0.0, 6.0, 7.0]);
        assert_eq!(dst.row(2), &[0.0, 10.0, 11.0]);
    }

    #[test]
    fn test_flip_rows() {
        let mut grid = Grid::from_fn(2, 3, |row, _| row as f32);
        grid.flip_rows();
        assert_eq!(grid.values(), &[2.0, 2.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_transposed() {
        let grid = Grid::from_fn(3, 2, |row, col| (row * 3 + col) as f32);
        let t = grid.transposed();
        assert_eq!(t.width(), 2);
        assert_eq!(t.height(), 3);
        assert_eq!(t.get(2, 1), grid.get(1, 2));
    }

    #[test]
    fn test_stats() {
        let grid = Grid::from_vec(2, 2, vec![1.0f32, 2.0, 3.0, 6.0]).unwrap();
        let (min, max, mean) = grid.stats();
        assert_eq!(min, 1.0);
        assert_eq!(max, 6.0);
        assert!((mean - 3.0).abs() < 1e-12);
    }
}
