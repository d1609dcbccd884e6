//! Georeferenced elevation rasters and their point lookups.

use crate::grid::Grid;
use crate::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// EPSG code of WGS 84 geographic coordinates, the only supported frame.
pub const EPSG_WGS84: u32 = 4326;

/// EPSG code of NAD83, accepted as close enough to WGS 84.
pub const EPSG_NAD83: u32 = 4269;

/// Sentinel used for missing samples once a raster has been normalized.
pub const DEFAULT_NODATA: f32 = -32768.0;

/// Bounding box of a raster's pixel centers, in degrees relative to the tile origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFrame {
    /// EPSG code of the coordinate system.
    pub epsg: u32,
    /// Western edge (longitude offset).
    pub x0: f64,
    /// Southern edge (latitude offset).
    pub y0: f64,
    /// Eastern edge (longitude offset).
    pub x1: f64,
    /// Northern edge (latitude offset).
    pub y1: f64,
}

impl GeoFrame {
    /// The unit tile `[0, 1] x [0, 1]` in WGS 84.
    pub fn unit() -> Self {
        Self::square(0.0, 1.0)
    }

    /// A square frame `[lo, hi] x [lo, hi]` in WGS 84.
    pub fn square(lo: f64, hi: f64) -> Self {
        Self {
            epsg: EPSG_WGS84,
            x0: lo,
            y0: lo,
            x1: hi,
            y1: hi,
        }
    }

    /// Check if an offset point lies within the frame (edges included).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Clamp an offset point into the frame.
    pub fn clamp(&self, x: f64, y: f64) -> (f64, f64) {
        (x.max(self.x0).min(self.x1), y.max(self.y0).min(self.y1))
    }
}

/// Everything known about a raster except its cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterHeader {
    /// Geographic framing.
    pub frame: GeoFrame,
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Value marking a missing sample.
    pub nodata: f32,
}

impl RasterHeader {
    /// Header of a `size x size` raster over the unit tile.
    pub fn unit(size: usize) -> Self {
        Self {
            frame: GeoFrame::unit(),
            width: size,
            height: size,
            nodata: DEFAULT_NODATA,
        }
    }
}

/// A boolean mask over a window of a raster, returned by [`Raster::super_level_set`].
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSet {
    /// `(lon_min, lon_max, lat_min, lat_max)` of the window in absolute degrees.
    pub bbox: (f64, f64, f64, f64),
    /// `true` where the elevation is at or above the level, north row first.
    pub mask: Grid<bool>,
}

/// Elevation samples plus their geographic framing.
///
/// Row 0 is the northern edge. Every cell is a valid elevation or exactly
/// equal to `nodata`.
#[derive(Debug, Clone)]
pub struct Raster {
    frame: GeoFrame,
    nodata: f32,
    cells: Grid<f32>,
}

impl Raster {
    /// Wrap a grid with its frame and nodata sentinel.
    pub fn new(frame: GeoFrame, nodata: f32, cells: Grid<f32>) -> Self {
        Self { frame, nodata, cells }
    }

    /// A square all-nodata placeholder covering the unit tile.
    pub fn placeholder(size: usize) -> Self {
        Self::new(
            GeoFrame::unit(),
            DEFAULT_NODATA,
            Grid::filled(size, size, DEFAULT_NODATA),
        )
    }

    /// A square all-zero raster covering the unit tile.
    pub fn zeros(size: usize) -> Self {
        Self::new(GeoFrame::unit(), DEFAULT_NODATA, Grid::filled(size, size, 0.0))
    }

    /// Geographic framing.
    pub fn frame(&self) -> &GeoFrame {
        &self.frame
    }

    /// Nodata sentinel.
    pub fn nodata(&self) -> f32 {
        self.nodata
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.cells.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.cells.height()
    }

    /// Header without cells.
    pub fn header(&self) -> RasterHeader {
        RasterHeader {
            frame: self.frame,
            width: self.width(),
            height: self.height(),
            nodata: self.nodata,
        }
    }

    /// The cells.
    pub fn cells(&self) -> &Grid<f32> {
        &self.cells
    }

    /// The cells, mutable.
    pub fn cells_mut(&mut self) -> &mut Grid<f32> {
        &mut self.cells
    }

    /// Release the raster and keep only its cells.
    pub fn into_cells(self) -> Grid<f32> {
        self.cells
    }

    /// Number of cells equal to the nodata sentinel.
    pub fn void_count(&self) -> usize {
        let nodata = self.nodata;
        self.cells.values().iter().filter(|&&v| v == nodata).count()
    }

    /// Replace every nodata cell with zero altitude.
    ///
    /// Returns the number of replaced cells. The sentinel is reset to
    /// [`DEFAULT_NODATA`] afterwards.
    pub fn nodata_to_zero(&mut self) -> usize {
        let nodata = self.nodata;
        let mut replaced = 0;
        for v in self.cells.values_mut() {
            if *v == nodata {
                *v = 0.0;
                replaced += 1;
            }
        }
        if replaced > 0 {
            tracing::info!("Replacing {} nodata nodes with zero altitude", replaced);
        }
        self.nodata = DEFAULT_NODATA;
        replaced
    }

    /// Interpolated elevation at an offset point, clamped into the frame.
    ///
    /// Each grid cell is split along its SW-NE diagonal and the two halves
    /// are interpolated linearly, matching a triangulation of the same grid.
    pub fn alt_loose(&self, x: f64, y: f64) -> f32 {
        let f = &self.frame;
        let nx_max = self.width() - 1;
        let ny_max = self.height() - 1;
        let (x, y) = f.clamp(x, y);

        let px = if nx_max == 0 { 0.0 } else { (x - f.x0) / (f.x1 - f.x0) * nx_max as f64 };
        let py = if ny_max == 0 { 0.0 } else { (y - f.y0) / (f.y1 - f.y0) * ny_max as f64 };

        let nx = (px as usize).min(nx_max);
        let ny = (py as usize).min(ny_max);
        let row = ny_max - ny;
        let rx = px - nx as f64;
        let ry = py - ny as f64;

        let up = row.saturating_sub(1);
        let right = (nx + 1).min(nx_max);

        let sw = self.cells.get(row, nx) as f64;
        let ne = self.cells.get(up, right) as f64;
        let value = if rx >= ry {
            let se = self.cells.get(row, right) as f64;
            (1.0 - rx) * sw + ry * ne + (rx - ry) * se
        } else {
            let nw = self.cells.get(up, nx) as f64;
            (1.0 - ry) * sw + rx * ne + (ry - rx) * nw
        };
        value as f32
    }

    /// Nearest cell value at an offset point, or nodata outside the frame.
    pub fn alt_strict(&self, x: f64, y: f64) -> f32 {
        let f = &self.frame;
        if !f.contains(x, y) {
            return self.nodata;
        }
        let nx_max = (self.width() - 1) as f64;
        let ny_max = (self.height() - 1) as f64;
        let col = if f.x1 > f.x0 { ((x - f.x0) / (f.x1 - f.x0) * nx_max).round() } else { 0.0 };
        let row = if f.y1 > f.y0 { ((f.y1 - y) / (f.y1 - f.y0) * ny_max).round() } else { 0.0 };
        self.cells.get(row as usize, col as usize)
    }

    /// Window where the elevation is at or above `level`.
    ///
    /// `bbox` is `(lon_min, lon_max, lat_min, lat_max)` in absolute degrees and
    /// is shrunk to the raster's frame; `origin` is the tile corner the frame
    /// is relative to.
    pub fn super_level_set(&self, level: f32, bbox: (f64, f64, f64, f64), origin: (i32, i32)) -> LevelSet {
        let f = &self.frame;
        let (lat, lon) = (origin.0 as f64, origin.1 as f64);
        let (lon_min, lon_max, lat_min, lat_max) = bbox;
        let xmin = (lon_min - lon).max(f.x0);
        let xmax = (lon_max - lon).min(f.x1);
        let ymin = (lat_min - lat).max(f.y0);
        let ymax = (lat_max - lat).min(f.y1);

        let nx_max = (self.width() - 1) as f64;
        let ny_max = (self.height() - 1) as f64;
        let to_col = |x: f64| ((x - f.x0) / (f.x1 - f.x0) * nx_max).round().max(0.0) as usize;
        let to_row = |y: f64| ((f.y1 - y) / (f.y1 - f.y0) * ny_max).round().max(0.0) as usize;
        let col0 = to_col(xmin);
        let col1 = to_col(xmax).min(self.width() - 1);
        let row0 = to_row(ymax);
        let row1 = to_row(ymin).min(self.height() - 1);

        let width = (col1 + 1).saturating_sub(col0);
        let height = (row1 + 1).saturating_sub(row0);
        let mask = Grid::from_fn(width, height, |r, c| self.cells.get(row0 + r, col0 + c) >= level);

        LevelSet {
            bbox: (xmin + lon, xmax + lon, ymin + lat, ymax + lat),
            mask,
        }
    }

    /// Dump the cells as native-endian f32, row-major, north to south.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for v in self.cells.values() {
            out.write_all(&v.to_ne_bytes())?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 3x3 raster over the unit tile with distinct corner values.
    fn sample_raster() -> Raster {
        let cells = Grid::from_vec(
            3,
            3,
            vec![
                10.0, 20.0, 30.0, //
                40.0, 50.0, 60.0, //
                70.0, 80.0, 90.0,
            ],
        )
        .unwrap();
        Raster::new(GeoFrame::unit(), DEFAULT_NODATA, cells)
    }

    #[test]
    fn test_frame_contains() {
        let frame = GeoFrame::unit();
        assert!(frame.contains(0.0, 0.0));
        assert!(frame.contains(1.0, 1.0));
        assert!(!frame.contains(1.01, 0.5));
        assert!(!frame.contains(0.5, -0.01));
    }

    #[test]
    fn test_loose_hits_grid_nodes() {
        let raster = sample_raster();
        // Row 0 is north, so (0, 1) is the NW corner.
        assert_relative_eq!(raster.alt_loose(0.0, 1.0), 10.0);
        assert_relative_eq!(raster.alt_loose(1.0, 1.0), 30.0);
        assert_relative_eq!(raster.alt_loose(0.0, 0.0), 70.0);
        assert_relative_eq!(raster.alt_loose(1.0, 0.0), 90.0);
        assert_relative_eq!(raster.alt_loose(0.5, 0.5), 50.0);
    }

    #[test]
    fn test_loose_lower_right_triangle() {
        let raster = sample_raster();
        // Cell with SW=70, SE=80, NW=40, NE=50; rx=0.6, ry=0.2.
        let (rx, ry) = (0.6, 0.2);
        let expected = (1.0 - rx) * 70.0 + ry * 50.0 + (rx - ry) * 80.0;
        assert_relative_eq!(raster.alt_loose(rx * 0.5, ry * 0.5), expected as f32, epsilon = 1e-4);
    }

    #[test]
    fn test_loose_upper_left_triangle() {
        let raster = sample_raster();
        let (rx, ry) = (0.2, 0.6);
        let expected = (1.0 - ry) * 70.0 + rx * 50.0 + (ry - rx) * 40.0;
        assert_relative_eq!(raster.alt_loose(rx * 0.5, ry * 0.5), expected as f32, epsilon = 1e-4);
    }

    #[test]
    fn test_loose_continuous_on_diagonal() {
        let raster = sample_raster();
        let r = 0.37;
        let lower = (1.0 - r) * 70.0 + r * 50.0;
        let upper = (1.0 - r) * 70.0 + r * 50.0;
        assert_relative_eq!(lower, upper);
        assert_relative_eq!(raster.alt_loose(r * 0.5, r * 0.5), lower as f32, epsilon = 1e-4);
    }

    #[test]
    fn test_loose_clamps_outside() {
        let raster = sample_raster();
        assert_relative_eq!(raster.alt_loose(-5.0, 5.0), 10.0);
        assert_relative_eq!(raster.alt_loose(3.0, -2.0), 90.0);
    }

    #[test]
    fn test_loose_convex_combination() {
        let raster = sample_raster();
        for i in 1..20 {
            for j in 1..20 {
                let (x, y) = (i as f64 / 20.0, j as f64 / 20.0);
                let v = raster.alt_loose(x, y);
                assert!((10.0..=90.0).contains(&v), "value {} at ({}, {})", v, x, y);
            }
        }
    }

    #[test]
    fn test_strict_nearest_and_outside() {
        let raster = sample_raster();
        assert_eq!(raster.alt_strict(0.1, 0.9), 10.0);
        assert_eq!(raster.alt_strict(0.6, 0.4), 50.0);
        assert_eq!(raster.alt_strict(1.0, 0.0), 90.0);
        assert_eq!(raster.alt_strict(1.2, 0.5), DEFAULT_NODATA);
        assert_eq!(raster.alt_strict(0.5, -0.1), DEFAULT_NODATA);
    }

    #[test]
    fn test_single_pixel_raster() {
        let raster = Raster::new(GeoFrame::unit(), DEFAULT_NODATA, Grid::filled(1, 1, 7.0));
        assert_eq!(raster.alt_loose(0.3, 0.3), 7.0);
        assert_eq!(raster.alt_strict(0.3, 0.3), 7.0);
    }

    #[test]
    fn test_nodata_to_zero() {
        let mut raster = sample_raster();
        raster.cells_mut().set(1, 1, DEFAULT_NODATA);
        assert_eq!(raster.void_count(), 1);
        assert_eq!(raster.nodata_to_zero(), 1);
        assert_eq!(raster.void_count(), 0);
        assert_eq!(raster.cells().get(1, 1), 0.0);
    }

    #[test]
    fn test_super_level_set() {
        let raster = sample_raster();
        let set = raster.super_level_set(50.0, (10.0, 10.5, 45.5, 46.0), (45, 10));
        assert_eq!(set.bbox, (10.0, 10.5, 45.5, 46.0));
        assert_eq!(set.mask.width(), 2);
        assert_eq!(set.mask.height(), 2);
        assert_eq!(set.mask.values(), &[false, false, false, true]);
    }

    #[test]
    fn test_super_level_set_clips_to_frame() {
        let raster = sample_raster();
        let set = raster.super_level_set(0.0, (9.0, 12.0, 44.0, 47.0), (45, 10));
        assert_eq!(set.bbox, (10.0, 11.0, 45.0, 46.0));
        assert_eq!(set.mask.width(), 3);
        assert!(set.mask.values().iter().all(|&b| b));
    }

    #[test]
    fn test_write_to_file() {
        let raster = sample_raster();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alt.raw");
        raster.write_to_file(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 9 * 4);
        let first = f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(first, 10.0);
    }
}
