//! Nearest-neighbor filling of nodata cells.

use crate::grid::Grid;
use crate::raster::Raster;

/// Rasters with at least this many voids are not repaired.
pub const MAX_VOIDS: usize = 10_000;

/// Passes after which remaining voids are zeroed.
pub const MAX_PASSES: usize = 20;

/// Fill voids by repeatedly copying the extreme of their four neighbors.
///
/// With a negative sentinel (the usual case) a void takes the maximum of its
/// neighbors, otherwise the minimum, so sentinel neighbors never win over
/// real samples. Every pass grows the filled region by one ring of pixels.
/// Voids left after [`MAX_PASSES`] are set to zero.
///
/// Returns `false` without touching the raster when it has [`MAX_VOIDS`] or
/// more voids; the caller decides how to zero-fill instead.
pub fn fill_nodata_nearest(raster: &mut Raster) -> bool {
    let nodata = raster.nodata();
    let initial = raster.void_count();
    if initial == 0 {
        return true;
    }
    if initial >= MAX_VOIDS {
        tracing::debug!("{} voids are too many to repair", initial);
        return false;
    }
    tracing::debug!(
        "Elevation grid contains {} voids, filling them by nearest neighbour",
        initial
    );

    let cells = raster.cells_mut();
    let mut passes = 0;
    while cells.values().contains(&nodata) {
        if passes == MAX_PASSES {
            let mut zeroed = 0;
            for v in cells.values_mut().iter_mut().filter(|v| **v == nodata) {
                *v = 0.0;
                zeroed += 1;
            }
            tracing::warn!(
                "Voids too big to be filled, setting the remaining {} to zero",
                zeroed
            );
            break;
        }
        fill_pass(cells, nodata);
        passes += 1;
        tracing::debug!("Repair pass {} done", passes);
    }
    true
}

/// One full-grid pass against a snapshot of the previous state.
fn fill_pass(cells: &mut Grid<f32>, nodata: f32) {
    let snapshot = cells.clone();
    let (width, height) = (snapshot.width(), snapshot.height());
    let pick = |a: f32, b: f32| if nodata < 0.0 { a.max(b) } else { a.min(b) };
    for row in 0..height {
        for col in 0..width {
            if snapshot.get(row, col) != nodata {
                continue;
            }
            let north = snapshot.get(row.saturating_sub(1), col);
            let south = snapshot.get((row + 1).min(height - 1), col);
            let west = snapshot.get(row, col.saturating_sub(1));
            let east = snapshot.get(row, (col + 1).min(width - 1));
            cells.set(row, col, pick(pick(north, south), pick(west, east)));
        }
    }
}
