//! Queryable elevation models and the builder that assembles them.
//!
//! A model is either a single raster (leaf) or a base raster plus an ordered
//! list of override models. Overrides are consulted with strict lookups only,
//! highest priority (last listed) first, so they never extrapolate beyond
//! their own footprint. Where no override has data the base raster is
//! interpolated.

use crate::acquire::SourceAcquirer;
use crate::composite::CompositeBuilder;
use crate::config::{DemConfig, FillNodata};
use crate::coords::TileOrigin;
use crate::coverage::CoverageMask;
use crate::error::{Degradation, Loaded};
use crate::fetch::Fetcher;
use crate::grid::Grid;
use crate::raster::{LevelSet, Raster, RasterHeader};
use crate::reader::RasterReader;
use crate::repair::fill_nodata_nearest;
use crate::resample::FULL_SIZE;
use crate::sources::{generic_tif_path, DemSource};
use crate::{DemError, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Token replaced by the tile's hemisphere name in source specs.
pub const LATLON_PLACEHOLDER: &str = "{latlon}";

/// Separator between the base source and its overrides.
pub const OVERRIDE_SEPARATOR: char = ';';

/// Blue channel of derived normal maps.
const NORMAL_MAP_BLUE: u8 = 10;

/// Alpha channel of derived normal maps.
const NORMAL_MAP_ALPHA: u8 = 128;

/// Shape of an elevation model.
#[derive(Debug, Clone)]
pub enum ModelKind {
    /// A single raster, interpolated loosely.
    Leaf(Raster),
    /// A base raster with overrides in ascending priority.
    Composite {
        /// Fallback raster, interpolated loosely.
        base: Raster,
        /// Override models, consulted strictly.
        overrides: Vec<ElevationModel>,
    },
}

/// Height function over one tile.
#[derive(Debug, Clone)]
pub struct ElevationModel {
    origin: TileOrigin,
    kind: ModelKind,
    degradations: Vec<Degradation>,
}

impl ElevationModel {
    /// A model wrapping a single raster.
    pub fn leaf(origin: TileOrigin, raster: Raster) -> Self {
        Self {
            origin,
            kind: ModelKind::Leaf(raster),
            degradations: Vec::new(),
        }
    }

    /// A model with overrides, listed lowest priority first.
    ///
    /// An empty override list yields a leaf.
    pub fn composite(origin: TileOrigin, base: Raster, overrides: Vec<ElevationModel>) -> Self {
        if overrides.is_empty() {
            return Self::leaf(origin, base);
        }
        let degradations = overrides
            .iter()
            .flat_map(|o| o.degradations.iter().cloned())
            .collect();
        Self {
            origin,
            kind: ModelKind::Composite { base, overrides },
            degradations,
        }
    }

    fn with_degradation(mut self, degradation: Option<Degradation>) -> Self {
        if let Some(d) = degradation {
            self.degradations.insert(0, d);
        }
        self
    }

    /// Tile this model covers.
    pub fn origin(&self) -> TileOrigin {
        self.origin
    }

    /// The model's shape.
    pub fn kind(&self) -> &ModelKind {
        &self.kind
    }

    /// Raster interpolated where no override applies.
    pub fn base(&self) -> &Raster {
        match &self.kind {
            ModelKind::Leaf(raster) => raster,
            ModelKind::Composite { base, .. } => base,
        }
    }

    fn into_base(self) -> Raster {
        match self.kind {
            ModelKind::Leaf(raster) => raster,
            ModelKind::Composite { base, .. } => base,
        }
    }

    /// Overrides in ascending priority; empty for a leaf.
    pub fn overrides(&self) -> &[ElevationModel] {
        match &self.kind {
            ModelKind::Leaf(_) => &[],
            ModelKind::Composite { overrides, .. } => overrides,
        }
    }

    /// Everything that was replaced by a stand-in while building this model.
    pub fn degradations(&self) -> &[Degradation] {
        &self.degradations
    }

    /// Nodata sentinel returned by strict lookups.
    pub fn nodata(&self) -> f32 {
        self.base().nodata()
    }

    /// Header of the base raster.
    pub fn header(&self) -> RasterHeader {
        self.base().header()
    }

    /// Elevation at an offset point `(x, y) = (lon - origin.lon, lat - origin.lat)`.
    pub fn alt(&self, x: f64, y: f64) -> f32 {
        match &self.kind {
            ModelKind::Leaf(raster) => raster.alt_loose(x, y),
            ModelKind::Composite { base, overrides } => overrides
                .iter()
                .rev()
                .map(|o| (o.alt_strict(x, y), o.nodata()))
                .find(|&(v, nodata)| v != nodata)
                .map(|(v, _)| v)
                .unwrap_or_else(|| base.alt_loose(x, y)),
        }
    }

    /// Nearest-cell elevation, or nodata outside the model's footprint.
    pub fn alt_strict(&self, x: f64, y: f64) -> f32 {
        match &self.kind {
            ModelKind::Leaf(raster) => raster.alt_strict(x, y),
            ModelKind::Composite { base, overrides } => overrides
                .iter()
                .rev()
                .map(|o| (o.alt_strict(x, y), o.nodata()))
                .find(|&(v, nodata)| v != nodata)
                .map(|(v, _)| v)
                .unwrap_or_else(|| base.alt_strict(x, y)),
        }
    }

    /// [`alt`](Self::alt) over a batch of offset points.
    pub fn alt_vec(&self, points: &[(f64, f64)]) -> Vec<f32> {
        let base = self.base();
        let mut out: Vec<f32> = points.iter().map(|&(x, y)| base.alt_loose(x, y)).collect();
        for o in self.overrides() {
            let nodata = o.nodata();
            for (v, top) in out.iter_mut().zip(o.alt_vec_strict(points)) {
                if top != nodata {
                    *v = top;
                }
            }
        }
        out
    }

    /// [`alt_strict`](Self::alt_strict) over a batch of offset points.
    pub fn alt_vec_strict(&self, points: &[(f64, f64)]) -> Vec<f32> {
        points.iter().map(|&(x, y)| self.alt_strict(x, y)).collect()
    }

    /// Window of the base raster at or above `level`.
    ///
    /// `bbox` is `(lon_min, lon_max, lat_min, lat_max)` in absolute degrees.
    pub fn super_level_set(&self, level: f32, bbox: (f64, f64, f64, f64)) -> LevelSet {
        self.base()
            .super_level_set(level, bbox, (self.origin.lat, self.origin.lon))
    }

    /// Dump the base grid as native-endian f32, north row first.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.base().write_to_file(path)
    }

    /// Derive a slope normal map and release the elevation grid.
    ///
    /// `pix_x` and `pix_y` are the ground distances between adjacent samples
    /// (same unit as the elevations). The red and green channels hold the
    /// normalized slope along x and y, resized to `size x size`.
    pub fn into_normal_map(self, pix_x: f64, pix_y: f64, size: u32) -> NormalMap {
        let cells = self.into_base().into_cells();
        let (width, height) = (cells.width(), cells.height());
        let (mut dx, mut dy) = slopes(&cells, pix_x, pix_y);
        drop(cells);

        for (sx, sy) in dx.values_mut().iter_mut().zip(dy.values_mut().iter_mut()) {
            let norm = (1.0 + *sx * *sx + *sy * *sy).sqrt();
            *sx /= norm;
            *sy /= norm;
        }

        let size = size.max(1);
        let to_band = |grid: &Grid<f32>, f: fn(f32) -> f32| {
            let band = GrayImage::from_fn(width as u32, height as u32, |col, row| {
                image::Luma([f(grid.get(row as usize, col as usize)) as u8])
            });
            imageops::resize(&band, size, size, FilterType::CatmullRom)
        };
        let red = to_band(&dx, |v| (1.0 + v) / 2.0 * 255.0);
        drop(dx);
        let green = to_band(&dy, |v| (1.0 - v) / 2.0 * 255.0);
        drop(dy);

        let image = RgbaImage::from_fn(size, size, |x, y| {
            Rgba([
                red.get_pixel(x, y).0[0],
                green.get_pixel(x, y).0[0],
                NORMAL_MAP_BLUE,
                NORMAL_MAP_ALPHA,
            ])
        });
        NormalMap { image }
    }
}

/// Finite-difference slopes; central inside, one-sided on the borders.
///
/// `dy` is positive where the terrain rises towards the north.
fn slopes(cells: &Grid<f32>, pix_x: f64, pix_y: f64) -> (Grid<f32>, Grid<f32>) {
    let (width, height) = (cells.width(), cells.height());
    let (px, py) = (pix_x as f32, pix_y as f32);
    let dx = Grid::from_fn(width, height, |r, c| {
        if width < 2 {
            0.0
        } else if c == 0 {
            (cells.get(r, 1) - cells.get(r, 0)) / px
        } else if c == width - 1 {
            (cells.get(r, c) - cells.get(r, c - 1)) / px
        } else {
            (cells.get(r, c + 1) - cells.get(r, c - 1)) / (2.0 * px)
        }
    });
    let dy = Grid::from_fn(width, height, |r, c| {
        if height < 2 {
            0.0
        } else if r == 0 {
            (cells.get(0, c) - cells.get(1, c)) / py
        } else if r == height - 1 {
            (cells.get(r - 1, c) - cells.get(r, c)) / py
        } else {
            (cells.get(r - 1, c) - cells.get(r + 1, c)) / (2.0 * py)
        }
    });
    (dx, dy)
}

/// RGBA normal map derived from an elevation model.
#[derive(Debug, Clone)]
pub struct NormalMap {
    image: RgbaImage,
}

impl NormalMap {
    /// The pixels.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Take the pixels.
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Write as PNG (or any format implied by the extension).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.image.save(path)?;
        Ok(())
    }
}

/// One entry of a source spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// No source named: the generic per-tile GeoTIFF, else Viewfinderpanoramas.
    Default,
    /// A logical source from the source table.
    Logical(DemSource),
    /// A local elevation file.
    File(PathBuf),
}

impl SourceRef {
    fn parse(entry: &str) -> Result<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Ok(SourceRef::Default);
        }
        match DemSource::from_str(entry) {
            Ok(source) => Ok(SourceRef::Logical(source)),
            Err(e) => {
                let looks_like_path = entry.contains('/')
                    || entry.contains('\\')
                    || Path::new(entry).extension().is_some();
                if looks_like_path {
                    Ok(SourceRef::File(PathBuf::from(entry)))
                } else {
                    Err(e)
                }
            }
        }
    }
}

/// A parsed `<base>[;<override>;...]` source spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    /// Source of the base raster.
    pub base: SourceRef,
    /// Override sources, lowest priority first.
    pub overrides: Vec<SourceRef>,
}

impl SourceSpec {
    /// Parse a spec for `tile`, substituting [`LATLON_PLACEHOLDER`].
    pub fn parse(spec: &str, tile: TileOrigin) -> Result<Self> {
        let spec = spec.replace(LATLON_PLACEHOLDER, &tile.hem_token());
        let mut entries = spec.split(OVERRIDE_SEPARATOR);
        let base = SourceRef::parse(entries.next().unwrap_or(""))?;
        let overrides = entries
            .map(|entry| match SourceRef::parse(entry)? {
                SourceRef::Default => Err(DemError::InvalidSpec(format!("empty override in '{}'", spec))),
                source => Ok(source),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { base, overrides })
    }
}

/// Builds [`ElevationModel`]s from source specs.
#[derive(Debug)]
pub struct DemBuilder {
    acquirer: SourceAcquirer,
    reader: RasterReader,
    coverage: CoverageMask,
    fill: FillNodata,
}

impl DemBuilder {
    /// Builder using reqwest, the GeoTIFF decoder and the configured cache.
    pub fn new(config: &DemConfig) -> Result<Self> {
        let fetcher = Fetcher::with_timeout(config.request_timeout())?.with_max_attempts(config.max_attempts);
        let coverage = match &config.coverage_mask {
            Some(path) => CoverageMask::load(path)?,
            None => CoverageMask::Everywhere,
        };
        Ok(Self::with_parts(
            SourceAcquirer::new(&config.cache_dir, fetcher),
            RasterReader::default(),
            coverage,
        )
        .with_fill_nodata(config.fill_nodata))
    }

    /// Builder over explicit components.
    pub fn with_parts(acquirer: SourceAcquirer, reader: RasterReader, coverage: CoverageMask) -> Self {
        Self {
            acquirer,
            reader,
            coverage,
            fill: FillNodata::default(),
        }
    }

    /// Change the nodata policy for base rasters.
    pub fn with_fill_nodata(mut self, fill: FillNodata) -> Self {
        self.fill = fill;
        self
    }

    /// The acquirer, for cache paths and download statistics.
    pub fn acquirer(&self) -> &SourceAcquirer {
        &self.acquirer
    }

    fn resolve_default(&self, source: SourceRef, tile: TileOrigin) -> SourceRef {
        if source != SourceRef::Default {
            return source;
        }
        let generic = generic_tif_path(self.acquirer.cache_dir(), tile);
        if generic.exists() {
            SourceRef::File(generic)
        } else {
            SourceRef::Logical(DemSource::View)
        }
    }

    fn load(&self, source: &SourceRef, tile: TileOrigin) -> Result<Loaded<Raster>> {
        match source {
            SourceRef::Logical(s) if s.global_layout().is_some() => {
                CompositeBuilder::new(&self.acquirer, &self.reader, &self.coverage).build(*s, tile)
            }
            SourceRef::Logical(s) => {
                if self.acquirer.ensure_local(*s, tile) {
                    Ok(self.reader.read(&self.acquirer.cache_path(*s, tile), tile, FULL_SIZE))
                } else {
                    Ok(Loaded::Degraded(Raster::placeholder(FULL_SIZE), unavailable(*s, tile)))
                }
            }
            SourceRef::File(path) => Ok(self.reader.read(path, tile, FULL_SIZE)),
            SourceRef::Default => self.load(&self.resolve_default(SourceRef::Default, tile), tile),
        }
    }

    /// Build the model of `tile` described by `spec`.
    ///
    /// Degraded inputs do not fail the build; they are listed in
    /// [`ElevationModel::degradations`]. Only a malformed spec is an error.
    pub fn build(&self, spec: &str, tile: TileOrigin) -> Result<ElevationModel> {
        let spec = SourceSpec::parse(spec, tile)?;
        let base_ref = self.resolve_default(spec.base, tile);

        let (mut base, base_degradation) = split(self.load(&base_ref, tile)?);
        apply_fill(&mut base, self.fill);

        let overrides = spec
            .overrides
            .iter()
            .map(|source| {
                let (raster, degradation) = split(self.load(source, tile)?);
                Ok(ElevationModel::leaf(tile, raster).with_degradation(degradation))
            })
            .collect::<Result<Vec<_>>>()?;

        let (min, max, mean) = base.cells().stats();
        tracing::info!("Min altitude: {}, Max altitude: {}, Mean: {:.1}", min, max, mean);

        Ok(ElevationModel::composite(tile, base, overrides).with_degradation(base_degradation))
    }

    /// Header of the base raster of `spec` without decoding cells.
    pub fn probe(&self, spec: &str, tile: TileOrigin) -> Result<Loaded<RasterHeader>> {
        let spec = SourceSpec::parse(spec, tile)?;
        self.probe_source(&spec.base, tile)
    }

    fn probe_source(&self, source: &SourceRef, tile: TileOrigin) -> Result<Loaded<RasterHeader>> {
        match source {
            SourceRef::Logical(s) if s.global_layout().is_some() => Ok(Loaded::Ready(
                CompositeBuilder::new(&self.acquirer, &self.reader, &self.coverage).probe(*s)?,
            )),
            SourceRef::Logical(s) => {
                if self.acquirer.ensure_local(*s, tile) {
                    Ok(self.reader.probe(&self.acquirer.cache_path(*s, tile), tile, FULL_SIZE))
                } else {
                    Ok(Loaded::Degraded(RasterHeader::unit(FULL_SIZE), unavailable(*s, tile)))
                }
            }
            SourceRef::File(path) => Ok(self.reader.probe(path, tile, FULL_SIZE)),
            SourceRef::Default => self.probe_source(&self.resolve_default(SourceRef::Default, tile), tile),
        }
    }
}

fn unavailable(source: DemSource, tile: TileOrigin) -> Degradation {
    Degradation::Unavailable {
        source_name: source.short_name().to_string(),
        lat: tile.lat,
        lon: tile.lon,
    }
}

fn split(loaded: Loaded<Raster>) -> (Raster, Option<Degradation>) {
    match loaded {
        Loaded::Ready(raster) => (raster, None),
        Loaded::Degraded(raster, reason) => (raster, Some(reason)),
    }
}

fn apply_fill(raster: &mut Raster, fill: FillNodata) {
    match fill {
        FillNodata::Repair => {
            if !fill_nodata_nearest(raster) {
                tracing::info!("Dataset contains too much nodata to be filled");
                raster.nodata_to_zero();
            }
        }
        FillNodata::ToZero => {
            raster.nodata_to_zero();
        }
        FillNodata::Keep => {}
    }
}
