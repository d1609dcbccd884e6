//! Grid refinement and mask-weighted smoothing.

use crate::grid::Grid;
use crate::{DemError, Result};
use image::GrayImage;

/// Edge length of a 3 arc-second degree tile.
pub const LEGACY_SIZE: usize = 1201;

/// Edge length of a 1 arc-second degree tile.
pub const FULL_SIZE: usize = 3601;

/// Triple the resolution of a 1201x1201 grid.
///
/// Samples between original nodes are weighted by their distance to the two
/// (on grid lines) or four (inside a cell) surrounding nodes, so the original
/// values stay exact at every third row and column.
pub fn upsample_1201_to_3601(grid: &Grid<f32>) -> Result<Grid<f32>> {
    if grid.width() != LEGACY_SIZE || grid.height() != LEGACY_SIZE {
        return Err(DemError::SizeMismatch {
            expected_width: LEGACY_SIZE,
            expected_height: LEGACY_SIZE,
            width: grid.width(),
            height: grid.height(),
        });
    }
    const W: [[f32; 2]; 3] = [[1.0, 0.0], [2.0 / 3.0, 1.0 / 3.0], [1.0 / 3.0, 2.0 / 3.0]];
    let last = LEGACY_SIZE - 1;
    Ok(Grid::from_fn(FULL_SIZE, FULL_SIZE, |row, col| {
        let (i, fi) = (row / 3, row % 3);
        let (j, fj) = (col / 3, col % 3);
        let (i1, j1) = ((i + 1).min(last), (j + 1).min(last));
        let [wi0, wi1] = W[fi];
        let [wj0, wj1] = W[fj];
        if fi == 0 && fj == 0 {
            return grid.get(i, j);
        }
        wi0 * wj0 * grid.get(i, j)
            + wi0 * wj1 * grid.get(i, j1)
            + wi1 * wj0 * grid.get(i1, j)
            + wi1 * wj1 * grid.get(i1, j1)
    }))
}

/// Convert an 8-bit mask image into weights in `[0, 1]`.
pub fn mask_weights(image: &GrayImage) -> Grid<f32> {
    let (width, height) = image.dimensions();
    Grid::from_fn(width as usize, height as usize, |row, col| {
        image.get_pixel(col as u32, row as u32).0[0] as f32 / 255.0
    })
}

/// Triangular kernel `1, 2, .., w+1, .., 2, 1` normalized to unit sum.
fn triangular_kernel(pix_width: usize) -> Vec<f32> {
    let norm = ((pix_width + 1) * (pix_width + 1)) as f32;
    (0..=2 * pix_width)
        .map(|k| (pix_width + 1 - k.abs_diff(pix_width)) as f32 / norm)
        .collect()
}

/// Centered 1-D convolution with zero padding, output length equal to input.
fn convolve_same(input: &[f32], kernel: &[f32], out: &mut [f32]) {
    let half = kernel.len() / 2;
    let n = input.len();
    for (j, o) in out.iter_mut().enumerate() {
        let lo = j.saturating_sub(half);
        let hi = (j + half).min(n - 1);
        *o = (lo..=hi).map(|m| input[m] * kernel[m + half - j]).sum();
    }
}

/// Convolve every row, then every column.
fn convolve_separable(grid: &Grid<f32>, kernel: &[f32]) -> Grid<f32> {
    let mut rows = Grid::filled(grid.width(), grid.height(), 0.0);
    for r in 0..grid.height() {
        convolve_same(grid.row(r), kernel, rows.row_mut(r));
    }
    let cols = rows.transposed();
    let mut out = Grid::filled(cols.width(), cols.height(), 0.0);
    for r in 0..cols.height() {
        convolve_same(cols.row(r), kernel, out.row_mut(r));
    }
    out.transposed()
}

/// Smooth `raster` with a triangular kernel of half-width `pix_width`,
/// weighted by `mask`.
///
/// Cells where the mask is zero keep their value. Elsewhere the smoothed value
/// is the mask-weighted average of the neighborhood, blended with the input in
/// proportion to the mask. With `preserve_boundary` the result fades back to
/// the input over the `pix_width` outermost rows and columns.
///
/// Without a mask, or with `pix_width == 0`, the input is returned as is.
pub fn smoothen(
    raster: &Grid<f32>,
    pix_width: usize,
    mask: Option<&Grid<f32>>,
    preserve_boundary: bool,
) -> Result<Grid<f32>> {
    let mask = match mask {
        Some(mask) if pix_width > 0 => mask,
        _ => return Ok(raster.clone()),
    };
    if mask.width() != raster.width() || mask.height() != raster.height() {
        return Err(DemError::SizeMismatch {
            expected_width: raster.width(),
            expected_height: raster.height(),
            width: mask.width(),
            height: mask.height(),
        });
    }

    let (width, height) = (raster.width(), raster.height());
    let kernel = triangular_kernel(pix_width);
    let weighted = Grid::from_fn(width, height, |r, c| raster.get(r, c) * mask.get(r, c));
    let sum = convolve_separable(&weighted, &kernel);
    let weight = convolve_separable(mask, &kernel);

    let mut tmp = Grid::from_fn(width, height, |r, c| {
        let m = mask.get(r, c);
        if m != 0.0 {
            m * sum.get(r, c) / weight.get(r, c) + (1.0 - m) * raster.get(r, c)
        } else {
            sum.get(r, c)
        }
    });

    if preserve_boundary {
        let fade = |i: usize| i as f32 / pix_width as f32;
        for i in 0..pix_width.min(height) {
            let t = fade(i);
            for row in [i, height - 1 - i] {
                for c in 0..width {
                    tmp.set(row, c, t * tmp.get(row, c) + (1.0 - t) * raster.get(row, c));
                }
            }
        }
        for i in 0..pix_width.min(width) {
            let t = fade(i);
            for col in [i, width - 1 - i] {
                for r in 0..height {
                    tmp.set(r, col, t * tmp.get(r, col) + (1.0 - t) * raster.get(r, col));
                }
            }
        }
    }

    Ok(Grid::from_fn(width, height, |r, c| {
        if mask.get(r, c) == 0.0 {
            raster.get(r, c)
        } else {
            tmp.get(r, c)
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kernel_sums_to_one() {
        for w in 1..6 {
            let kernel = triangular_kernel(w);
            assert_eq!(kernel.len(), 2 * w + 1);
            assert_relative_eq!(kernel.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        }
        assert_eq!(triangular_kernel(2), vec![1.0 / 9.0, 2.0 / 9.0, 3.0 / 9.0, 2.0 / 9.0, 1.0 / 9.0]);
    }

    #[test]
    fn test_convolve_same_zero_padding() {
        let mut out = vec![0.0; 3];
        convolve_same(&[3.0, 3.0, 3.0], &[0.25, 0.5, 0.25], &mut out);
        assert_eq!(out, vec![2.25, 3.0, 2.25]);
    }

    #[test]
    fn test_upsample_preserves_nodes() {
        let grid = Grid::from_fn(LEGACY_SIZE, LEGACY_SIZE, |r, c| ((r * 7 + c * 13) % 101) as f32);
        let up = upsample_1201_to_3601(&grid).unwrap();
        assert_eq!(up.width(), FULL_SIZE);
        for i in (0..LEGACY_SIZE).step_by(97) {
            for j in (0..LEGACY_SIZE).step_by(89) {
                assert_eq!(up.get(3 * i, 3 * j), grid.get(i, j));
            }
        }
        assert_eq!(up.get(3600, 3600), grid.get(1200, 1200));
    }

    #[test]
    fn test_upsample_weights() {
        let mut grid = Grid::filled(LEGACY_SIZE, LEGACY_SIZE, 0.0);
        grid.set(0, 0, 9.0);
        let up = upsample_1201_to_3601(&grid).unwrap();
        assert_relative_eq!(up.get(0, 1), 6.0, epsilon = 1e-5);
        assert_relative_eq!(up.get(0, 2), 3.0, epsilon = 1e-5);
        assert_relative_eq!(up.get(1, 0), 6.0, epsilon = 1e-5);
        assert_relative_eq!(up.get(1, 1), 4.0, epsilon = 1e-5);
        assert_relative_eq!(up.get(1, 2), 2.0, epsilon = 1e-5);
        assert_relative_eq!(up.get(2, 2), 1.0, epsilon = 1e-5);
        assert_relative_eq!(up.get(3, 3), 0.0);
    }

    #[test]
    fn test_upsample_linear_ramp_is_exact() {
        let grid = Grid::from_fn(LEGACY_SIZE, LEGACY_SIZE, |r, c| (3 * c + 6 * r) as f32);
        let up = upsample_1201_to_3601(&grid).unwrap();
        assert_relative_eq!(up.get(10, 20), (20 + 2 * 10) as f32, epsilon = 1e-3);
        assert_relative_eq!(up.get(3599, 3598), (3598 + 2 * 3599) as f32, epsilon = 1e-1);
    }

    #[test]
    fn test_upsample_rejects_other_sizes() {
        assert!(upsample_1201_to_3601(&Grid::filled(10, 10, 0.0)).is_err());
    }

    #[test]
    fn test_smoothen_identity_cases() {
        let raster = Grid::from_fn(5, 5, |r, c| (r * 5 + c) as f32);
        let mask = Grid::filled(5, 5, 1.0);
        assert_eq!(smoothen(&raster, 0, Some(&mask), true).unwrap(), raster);
        assert_eq!(smoothen(&raster, 2, None, true).unwrap(), raster);
        let empty = Grid::filled(5, 5, 0.0);
        assert_eq!(smoothen(&raster, 2, Some(&empty), false).unwrap(), raster);
    }

    #[test]
    fn test_smoothen_constant_is_fixed_point() {
        let raster = Grid::filled(9, 9, 12.5);
        let mask = Grid::filled(9, 9, 1.0);
        let out = smoothen(&raster, 2, Some(&mask), false).unwrap();
        for &v in out.values() {
            assert_relative_eq!(v, 12.5, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_smoothen_spike_and_masked_cells() {
        let mut raster = Grid::filled(9, 9, 0.0);
        raster.set(4, 4, 81.0);
        let mut mask = Grid::filled(9, 9, 1.0);
        mask.set(0, 0, 0.0);
        raster.set(0, 0, 7.0);
        let out = smoothen(&raster, 1, Some(&mask), true).unwrap();
        assert!(out.get(4, 4) < 81.0);
        assert!(out.get(4, 5) > 0.0);
        assert_eq!(out.get(0, 0), 7.0);
        // Outermost ring fades fully back to the input.
        assert_eq!(out.get(0, 4), 0.0);
        assert_eq!(out.get(8, 8), 0.0);
    }

    #[test]
    fn test_smoothen_partial_mask_blends() {
        // m * sum(w * m * z) / sum(w * m) + (1 - m) * z with m = 0.5 and w = [1/4, 1/2, 1/4]
        let raster = Grid::from_fn(5, 1, |_, c| if c == 2 { 8.0 } else { 0.0 });
        let mask = Grid::filled(5, 1, 0.5);
        let out = smoothen(&raster, 1, Some(&mask), false).unwrap();
        let expected = [0.0, 1.0, 6.0, 1.0, 0.0];
        for (&v, e) in out.values().iter().zip(expected) {
            assert_relative_eq!(v, e, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_smoothen_rejects_mismatched_mask() {
        let raster = Grid::filled(4, 4, 1.0);
        let mask = Grid::filled(3, 4, 1.0);
        assert!(smoothen(&raster, 1, Some(&mask), false).is_err());
    }

    #[test]
    fn test_mask_weights() {
        let mut image = GrayImage::new(2, 1);
        image.put_pixel(1, 0, image::Luma([255]));
        let weights = mask_weights(&image);
        assert_eq!(weights.values(), &[0.0, 1.0]);
    }
}
