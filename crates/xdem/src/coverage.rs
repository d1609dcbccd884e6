//! Global land/water coverage of one-degree tiles.

use crate::coords::{wrap_lon, TileOrigin};
use crate::Result;
use std::collections::HashSet;
use std::path::Path;

/// Which one-degree tiles have source data at all.
///
/// Loaded from a 360x180 image where pixel `(x, y)` is tile
/// `(89 - y, x - 180)`; non-zero pixels mark tiles with land. Tiles absent
/// from the mask are open ocean and are never fetched.
#[derive(Debug, Clone)]
pub enum CoverageMask {
    /// Every tile may have data.
    Everywhere,
    /// 360x180 row-major flags, north row first.
    Image(Vec<bool>),
    /// An explicit set of covered tiles.
    Tiles(HashSet<TileOrigin>),
}

impl Default for CoverageMask {
    fn default() -> Self {
        CoverageMask::Everywhere
    }
}

impl CoverageMask {
    /// Load the mask from a PNG (or any format the `image` crate reads).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let image = image::open(path.as_ref())?.to_luma8();
        let (width, height) = image.dimensions();
        if (width, height) != (360, 180) {
            return Err(crate::DemError::SizeMismatch {
                expected_width: 360,
                expected_height: 180,
                width: width as usize,
                height: height as usize,
            });
        }
        let flags = image.pixels().map(|p| p.0[0] != 0).collect();
        tracing::debug!("Loaded tile coverage mask from {}", path.as_ref().display());
        Ok(CoverageMask::Image(flags))
    }

    /// A mask covering exactly the listed tiles.
    pub fn from_tiles<I: IntoIterator<Item = TileOrigin>>(tiles: I) -> Self {
        CoverageMask::Tiles(tiles.into_iter().collect())
    }

    /// Whether the tile has source data.
    pub fn covers(&self, tile: TileOrigin) -> bool {
        match self {
            CoverageMask::Everywhere => true,
            CoverageMask::Image(flags) => {
                if !(-90..90).contains(&tile.lat) {
                    return false;
                }
                let x = (wrap_lon(tile.lon) + 180) as usize;
                let y = (89 - tile.lat) as usize;
                flags[y * 360 + x]
            }
            CoverageMask::Tiles(tiles) => tiles.contains(&TileOrigin::new(tile.lat, wrap_lon(tile.lon))),
        }
    }
}
