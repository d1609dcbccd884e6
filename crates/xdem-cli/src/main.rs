//! `xdem` command line tool.
//!
//! Loads elevation models for one-degree tiles and inspects or exports them.
//! Logging is controlled with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use xdem::{DemBuilder, DemConfig, DemSource, ElevationModel, TileOrigin};

/// Meters per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_120.0;

#[derive(Parser)]
#[command(name = "xdem", author, version, about = "Elevation tile acquisition and query tool")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache directory, overrides the configuration
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Latitude of the point (or any point inside the tile)
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// Longitude of the point (or any point inside the tile)
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the elevation at --lat/--lon
    Query {
        /// Source spec, e.g. "View" or "SRTM;custom/{latlon}.tif"
        #[arg(default_value = "")]
        spec: String,
    },
    /// Print the raster header of a spec without loading cells
    Probe {
        #[arg(default_value = "")]
        spec: String,
    },
    /// Dump the base grid as native-endian f32
    Export {
        #[arg(default_value = "")]
        spec: String,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Render a slope normal map PNG
    NormalMap {
        #[arg(default_value = "")]
        spec: String,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
        /// Edge length in pixels, overrides the configuration
        #[arg(long)]
        size: Option<u32>,
    },
    /// Make sure one source tile is present in the cache
    Fetch {
        /// Source name, e.g. "View", "SRTM", "NED1"
        source: String,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> xdem::Result<DemConfig> {
    let mut config = match &cli.config {
        Some(path) => DemConfig::from_yaml_file(path)?,
        None => DemConfig::default(),
    };
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    Ok(config)
}

fn report_degradations(model: &ElevationModel) {
    for degradation in model.degradations() {
        warn!("degraded: {}", degradation);
    }
}

fn run(cli: Cli) -> xdem::Result<()> {
    let config = load_config(&cli)?;
    let builder = DemBuilder::new(&config)?;
    let tile = TileOrigin::containing(cli.lat, cli.lon);
    info!("Tile {} (cache {})", tile, config.cache_dir.display());

    match cli.command {
        Command::Query { spec } => {
            let model = builder.build(&spec, tile)?;
            report_degradations(&model);
            let (x, y) = tile.to_offset(cli.lon, cli.lat);
            println!("{:.2}", model.alt(x, y));
        }
        Command::Probe { spec } => {
            let loaded = builder.probe(&spec, tile)?;
            if let Some(degradation) = loaded.degradation() {
                warn!("degraded: {}", degradation);
            }
            let header = loaded.into_inner();
            println!("size:   {}x{}", header.width, header.height);
            println!(
                "frame:  x {}..{}  y {}..{}",
                header.frame.x0, header.frame.x1, header.frame.y0, header.frame.y1
            );
            println!("nodata: {}", header.nodata);
        }
        Command::Export { spec, output } => {
            let model = builder.build(&spec, tile)?;
            report_degradations(&model);
            model.write_to_file(&output)?;
            let header = model.header();
            info!("Wrote {}x{} grid to {}", header.width, header.height, output.display());
        }
        Command::NormalMap { spec, output, size } => {
            let model = builder.build(&spec, tile)?;
            report_degradations(&model);
            let header = model.header();
            let pix_y = METERS_PER_DEGREE * (header.frame.y1 - header.frame.y0) / (header.height.max(2) - 1) as f64;
            let pix_x = METERS_PER_DEGREE
                * (tile.lat as f64 + 0.5).to_radians().cos()
                * (header.frame.x1 - header.frame.x0)
                / (header.width.max(2) - 1) as f64;
            let size = size.unwrap_or(config.normal_map_size);
            model.into_normal_map(pix_x, pix_y, size).save(&output)?;
            info!("Wrote {}x{} normal map to {}", size, size, output.display());
        }
        Command::Fetch { source } => {
            let source: DemSource = source.parse()?;
            let acquirer = builder.acquirer();
            if acquirer.ensure_local(source, tile) {
                println!("{}", acquirer.cache_path(source, tile).display());
            } else {
                warn!("{} tile {} is not available", source, tile);
            }
            let stats = acquirer.download_stats();
            info!(
                "{} downloads, {} bytes, {} files written",
                stats.downloads, stats.bytes_downloaded, stats.files_written
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
