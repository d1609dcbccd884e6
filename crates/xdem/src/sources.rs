//! The table of known elevation sources.
//!
//! Source metadata (names, resolutions, archive grouping, URLs and cache
//! paths) lives here as static data so that the acquisition and composition
//! code stays free of per-source special cases.

use crate::coords::TileOrigin;
use crate::DemError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Size in bytes of a 1 arc-second (3601x3601) hgt file.
pub const HGT_1_ARCSEC_BYTES: u64 = 3601 * 3601 * 2;

/// Size in bytes of a 3 arc-second (1201x1201) hgt file.
pub const HGT_3_ARCSEC_BYTES: u64 = 1201 * 1201 * 2;

const VIEWFINDER_URL: &str = "http://viewfinderpanoramas.org/dem";
const USGS_STAGED_URL: &str = "https://prd-tnm.s3.amazonaws.com/StagedProducts/Elevation";

/// A logical elevation source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemSource {
    /// Viewfinderpanoramas by J. de Ferranti, mostly worldwide.
    View,
    /// SRTMv3 1 arc-second.
    Srtm,
    /// ALOS World 3D 30m.
    Alos,
    /// USGS NED 1 arc-second (USA, Canada, Mexico).
    Ned1,
    /// USGS NED 1/3 arc-second (USA).
    Ned13,
}

/// `(source, short name, long name)` for every known source.
const SOURCE_NAMES: &[(DemSource, &str, &str)] = &[
    (DemSource::View, "View", "Viewfinderpanoramas (J. de Ferranti) - mostly worldwide"),
    (DemSource::Srtm, "SRTM", "SRTMv3 (from OpenTopography) - NOW REQUIRES MANUAL DOWNLOAD"),
    (DemSource::Ned1, "NED1", "NED 1\" (from USGS) - USA, Canada, Mexico"),
    (DemSource::Ned13, "NED1/3", "NED 1/3\" (from USGS) - USA"),
    (DemSource::Alos, "ALOS", "ALOS 3W30 (from OpenTopography) - NOW REQUIRES MANUAL DOWNLOAD"),
];

/// Layout of a global source's per-degree tiles, used to stitch neighbors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    /// Pixels per tile edge.
    pub base: usize,
    /// Edge rows/columns shared with the neighbor tile.
    pub overlap: usize,
    /// Pixels of neighbor context kept on every side.
    pub beyond: usize,
    /// Lower frame bound of the stitched raster (offset degrees).
    pub frame_lo: f64,
    /// Upper frame bound of the stitched raster (offset degrees).
    pub frame_hi: f64,
}

impl GridLayout {
    /// Edge length of the stitched raster.
    pub fn padded_size(&self) -> usize {
        self.base + 2 * self.beyond
    }
}

/// Point-registered 3601 grids sharing one edge row/column with neighbors.
const HGT_LAYOUT: GridLayout = GridLayout {
    base: 3601,
    overlap: 1,
    beyond: 36,
    frame_lo: -0.01,
    frame_hi: 1.01,
};

/// Area-registered 3600 grids; frame is shifted by half a pixel.
const ALOS_LAYOUT: GridLayout = GridLayout {
    base: 3600,
    overlap: 0,
    beyond: 36,
    frame_lo: -0.01 + 1.0 / 7200.0,
    frame_hi: 1.01 - 1.0 / 7200.0,
};

/// Viewfinderpanoramas archive cells that are published at 1 arc-second.
/// Everything else is 3 arc-second.
const VIEW_ONE_ARCSEC_CELLS: &[&str] = &[
    // Alps and central Europe
    "L31", "L32", "L33", "K32", "O31", "P31", "N32", "O32", "P32", "Q32", "N33", "O33", "P33",
    "Q33", "R33", "O34", "P34", "Q34", "R34", "O35", "P35", "Q35", "R35", "P36", "Q36", "R36",
    // New Zealand
    "SL58", "SI59", "SJ59", "SK59", "SL59", "SI60", "SJ60", "SK60", "SL60",
    // Greenland, Canada and Alaska
    "O23", "P22", "P23", "P24", "Q22", "Q23", "Q24", "Q25", "R21", "R22", "R23", "R24", "R25",
    "R26", "R27", "S19", "S20", "S21", "S22", "S23", "S24", "S25", "S26", "S27", "S28", "T18",
    "T19", "T20", "T21", "T22", "T23", "T24", "T25", "T26", "T27", "T28", "U19", "U20", "U21",
    "U22", "U23", "U24", "U25", "U26", "U27", "U28", "U29", "U14", "U15", "U16", "U17", "U18",
    "T10", "T11", "T12", "T13", "T14", "T15", "T16", "T17", "S10", "S11", "S12", "S13", "S14",
    "S15", "S16", "S17", "S18", "R03", "R04", "R05", "R06", "R07", "R08", "R09", "R10", "R11",
    "R12", "R13", "R14", "R15", "R16", "R17", "R18", "R19", "R20", "Q03", "Q04", "Q05", "Q06",
    "Q07", "Q08", "Q09", "Q10", "Q11", "Q12", "Q13", "Q14", "Q15", "Q16", "Q17", "Q18", "Q19",
    "Q20", "P03", "P04", "P05", "P06", "P07", "P08", "P09", "P10", "P11", "P12", "P13", "P14",
    "P15", "P16", "P17", "P18", "P19", "P20", "O02", "O03", "O04", "O05", "O06", "O07", "O08",
    "O09", "O10", "O11", "O12", "O13", "O14", "O15", "O16", "O17", "O18", "O19", "O20", "N01",
    "N02", "N03", "N04", "N05", "N08", "N09", "N10", "N11", "N12", "N13", "N14", "N15", "N16",
    "N17", "N18", "N19", "N20", "N21", "M01", "M09", "M10", "M11", "M12", "M13", "M14", "M15",
    "M16", "M17", "M18", "M19", "M20", "M21", "M22", "L10", "L11", "L12", "L13", "L14", "L15",
    "L16", "L17", "L18", "L19", "L20", "L21", "L22", "K10", "K11", "K12", "K13", "K14", "K15",
    "K16", "K17", "K18", "K19", "K20", "K21", "J10", "J11", "J12", "J13", "J14", "J15", "J16",
    "J17", "J18", "I10", "I11", "I12", "I13", "I14", "I15", "I16", "I17", "I18", "H11", "H12",
    "H13", "H14", "H15", "H16", "H17", "G14", "G17",
    // Europe, Middle East and Caucasus
    "Q36", "P31", "P32", "P33", "P34", "P35", "P36", "O29", "O30", "O31", "O32", "O33", "O34",
    "O35", "N29", "N30", "N31", "N32", "N33", "N34", "M29", "M30", "M31", "M32", "M33", "M34",
    "L30", "L31", "L32", "L33", "L34", "L35", "K29", "K30", "K31", "K32", "K33", "J29", "J30",
    "J31", "J32", "J33",
];

/// Tiles whose 1 arc-second data is known to be broken; the 3" data is used.
const VIEW_FORCE_3_ARCSEC: &[(i32, i32)] = &[
    // Wellington Intl
    (-42, 174),
];

impl DemSource {
    /// Every known source.
    pub const ALL: [DemSource; 5] = [
        DemSource::View,
        DemSource::Srtm,
        DemSource::Alos,
        DemSource::Ned1,
        DemSource::Ned13,
    ];

    fn names(&self) -> (&'static str, &'static str) {
        SOURCE_NAMES
            .iter()
            .find(|(source, _, _)| source == self)
            .map(|(_, short, long)| (*short, *long))
            .unwrap_or(("?", "?"))
    }

    /// Short identifier, e.g. `NED1/3`.
    pub fn short_name(&self) -> &'static str {
        self.names().0
    }

    /// Human readable description.
    pub fn long_name(&self) -> &'static str {
        self.names().1
    }

    /// Grid layout for sources distributed as one global file per degree.
    ///
    /// `None` for sources read as a single file.
    pub fn global_layout(&self) -> Option<GridLayout> {
        match self {
            DemSource::View | DemSource::Srtm => Some(HGT_LAYOUT),
            DemSource::Alos => Some(ALOS_LAYOUT),
            DemSource::Ned1 | DemSource::Ned13 => None,
        }
    }

    /// Directory of this source under the cache root.
    pub fn cache_subdir(&self) -> &'static str {
        match self {
            DemSource::View => "viewfinderpanoramas",
            DemSource::Srtm => "SRTM",
            DemSource::Alos => "ALOS",
            DemSource::Ned1 => "NED1",
            DemSource::Ned13 => "NED13",
        }
    }

    fn file_extension(&self) -> &'static str {
        match self {
            DemSource::View | DemSource::Srtm => "hgt",
            DemSource::Alos | DemSource::Ned1 | DemSource::Ned13 => "tif",
        }
    }

    /// Deterministic cache location of one tile of this source.
    pub fn cache_path(&self, cache_dir: &Path, tile: TileOrigin) -> PathBuf {
        cache_dir
            .join(self.cache_subdir())
            .join(tile.bucket_dir())
            .join(format!("{}.{}", tile.hem_token(), self.file_extension()))
    }
}

impl fmt::Display for DemSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for DemSource {
    type Err = DemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        SOURCE_NAMES
            .iter()
            .find(|(_, short, long)| *short == s || *long == s)
            .map(|(source, _, _)| *source)
            .ok_or_else(|| DemError::UnknownSource(s.to_string()))
    }
}

/// Location of the generic per-tile GeoTIFF used when no source is named.
pub fn generic_tif_path(cache_dir: &Path, tile: TileOrigin) -> PathBuf {
    cache_dir
        .join("Custom")
        .join(tile.bucket_dir())
        .join(format!("{}.tif", tile.hem_token()))
}

/// Viewfinderpanoramas archive cell and resolution for a tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewArchive {
    /// Archive cell code such as `L32` or `SL59`.
    pub code: String,
    /// Resolution in arc-seconds (1 or 3).
    pub resolution: u8,
}

impl ViewArchive {
    /// Archive covering a tile.
    pub fn for_tile(tile: TileOrigin) -> Self {
        let number = 31 + tile.lon.div_euclid(6);
        let row = if tile.lat >= 0 { tile.lat / 4 } else { (-1 - tile.lat) / 4 };
        let letter = (b'A' + row.clamp(0, 25) as u8) as char;
        let code = if tile.lat < 0 {
            format!("S{}{:02}", letter, number)
        } else {
            format!("{}{:02}", letter, number)
        };
        let mut resolution = if VIEW_ONE_ARCSEC_CELLS.contains(&code.as_str()) { 1 } else { 3 };
        if VIEW_FORCE_3_ARCSEC.contains(&(tile.lat, tile.lon)) {
            resolution = 3;
        }
        Self { code, resolution }
    }

    /// Download URL of the archive.
    pub fn url(&self) -> String {
        format!("{}{}/{}.zip", VIEWFINDER_URL, self.resolution, self.code)
    }

    /// Smallest acceptable size of a cached tile taken from this archive.
    pub fn min_tile_bytes(&self) -> u64 {
        if self.resolution == 1 {
            HGT_1_ARCSEC_BYTES
        } else {
            0
        }
    }
}

/// USGS staged-products URL of a NED tile.
///
/// USGS names tiles by their north-west corner, e.g. tile `(47, -123)` is
/// `n48w123`.
pub fn ned_url(source: DemSource, tile: TileOrigin) -> Option<String> {
    let product = match source {
        DemSource::Ned1 => "1",
        DemSource::Ned13 => "13",
        _ => return None,
    };
    let north = tile.lat + 1;
    let tid = format!(
        "{}{:02}{}{:03}",
        if north >= 0 { 'n' } else { 's' },
        north.abs(),
        if tile.lon < 0 { 'w' } else { 'e' },
        tile.lon.abs()
    );
    Some(format!(
        "{}/{}/TIFF/current/{}/USGS_{}_{}.tif",
        USGS_STAGED_URL, product, tid, product, tid
    ))
}
