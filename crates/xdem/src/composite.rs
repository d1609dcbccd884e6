//! Stitching a tile with its eight neighbors.
//!
//! Global sources ship one file per degree. Interpolating near a tile edge
//! needs samples from the adjacent tiles, so the center tile is padded with
//! `beyond` pixels taken from each neighbor. Sources whose tiles share their
//! edge row and column (`overlap = 1`) have that duplicate skipped.

use crate::acquire::SourceAcquirer;
use crate::coords::TileOrigin;
use crate::coverage::CoverageMask;
use crate::error::{Degradation, Loaded};
use crate::grid::Grid;
use crate::raster::{GeoFrame, Raster, RasterHeader, DEFAULT_NODATA};
use crate::reader::RasterReader;
use crate::sources::{DemSource, GridLayout};
use crate::{DemError, Result};

/// Builds padded rasters for global per-degree sources.
#[derive(Debug, Clone, Copy)]
pub struct CompositeBuilder<'a> {
    acquirer: &'a SourceAcquirer,
    reader: &'a RasterReader,
    coverage: &'a CoverageMask,
}

/// Source rows (or columns) of a neighbor and where they land.
///
/// `dir` is -1 for the north row / west column of tiles, +1 for south / east.
fn span(dir: i32, layout: &GridLayout) -> (usize, usize, usize) {
    let GridLayout { base, overlap, beyond, .. } = *layout;
    match dir {
        -1 => (base - overlap - beyond, beyond, 0),
        0 => (0, base, beyond),
        _ => (overlap, beyond, beyond + base),
    }
}

impl<'a> CompositeBuilder<'a> {
    /// Create a builder over shared acquisition state.
    pub fn new(acquirer: &'a SourceAcquirer, reader: &'a RasterReader, coverage: &'a CoverageMask) -> Self {
        Self {
            acquirer,
            reader,
            coverage,
        }
    }

    fn layout(source: DemSource) -> Result<GridLayout> {
        source
            .global_layout()
            .ok_or_else(|| DemError::InvalidSpec(format!("{} is not a global per-degree source", source)))
    }

    /// Header of the padded raster, without touching the cache.
    pub fn probe(&self, source: DemSource) -> Result<RasterHeader> {
        let layout = Self::layout(source)?;
        let size = layout.padded_size();
        Ok(RasterHeader {
            frame: GeoFrame::square(layout.frame_lo, layout.frame_hi),
            width: size,
            height: size,
            nodata: DEFAULT_NODATA,
        })
    }

    /// Padded raster of `tile` for a global source.
    pub fn build(&self, source: DemSource, tile: TileOrigin) -> Result<Loaded<Raster>> {
        let layout = Self::layout(source)?;
        Ok(self.stitch(source, tile, &layout))
    }

    /// Stitch the 3x3 neighborhood of `tile` using an explicit layout.
    ///
    /// Missing neighbors become zero blocks. The result is degraded only
    /// when the center tile itself could not be loaded.
    pub fn stitch(&self, source: DemSource, tile: TileOrigin, layout: &GridLayout) -> Loaded<Raster> {
        let size = layout.padded_size();
        let mut cells = Grid::filled(size, size, 0.0f32);
        let mut degradation = None;

        for dlat in [0, 1, -1] {
            for dlon in [0, -1, 1] {
                let neighbor = tile.offset(dlat, dlon);
                let is_center = dlat == 0 && dlon == 0;
                let block = match self.load_block(source, neighbor, layout) {
                    Ok(Some(block)) => block,
                    Ok(None) => continue,
                    Err(reason) => {
                        if is_center {
                            degradation = Some(reason);
                        }
                        continue;
                    }
                };
                let (src_row, rows, dst_row) = span(-dlat, layout);
                let (src_col, cols, dst_col) = span(dlon, layout);
                cells.paste(dst_row, dst_col, &block.window(src_row, src_col, rows, cols));
            }
        }

        let raster = Raster::new(
            GeoFrame::square(layout.frame_lo, layout.frame_hi),
            DEFAULT_NODATA,
            cells,
        );
        match degradation {
            Some(reason) => Loaded::Degraded(raster, reason),
            None => Loaded::Ready(raster),
        }
    }

    /// Cells of one neighbor, `None` for open ocean.
    fn load_block(
        &self,
        source: DemSource,
        tile: TileOrigin,
        layout: &GridLayout,
    ) -> std::result::Result<Option<Grid<f32>>, Degradation> {
        if !(-90..90).contains(&tile.lat) || !self.coverage.covers(tile) {
            return Ok(None);
        }
        if !self.acquirer.ensure_local(source, tile) {
            return Err(Degradation::Unavailable {
                source_name: source.short_name().to_string(),
                lat: tile.lat,
                lon: tile.lon,
            });
        }
        let path = self.acquirer.cache_path(source, tile);
        let raster = match self.reader.read(&path, tile, layout.base) {
            Loaded::Ready(raster) => raster,
            Loaded::Degraded(_, reason) => return Err(reason),
        };
        if raster.width() != layout.base || raster.height() != layout.base {
            let reason = format!(
                "expected a {0}x{0} grid, found {1}x{2}",
                layout.base,
                raster.width(),
                raster.height()
            );
            tracing::warn!("{}: {}", path.display(), reason);
            return Err(Degradation::Corrupt { path, reason });
        }
        Ok(Some(raster.into_cells()))
    }
}
