use clap::Parser;
use geo::Coord;
use std::path::PathBuf;

use crate::{
    data::{BoundaryPaths, GeoLevel},
    enrich::StatsConfig,
    style::ViewMode,
    tiles::{OSM_ATTRIBUTION, OSM_TILE_URL, TileProvider},
};

#[derive(Parser, Debug)]
#[command(name = "electoral-atlas")]
#[command(about = "Electoral Atlas - drill-down election map for the terminal")]
#[command(version)]
pub struct Args {
    /// Directory holding regions.geojson, departments.geojson and districts.geojson
    #[arg(long, value_name = "DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Region boundaries (overrides --data-dir)
    #[arg(long, value_name = "FILE")]
    pub regions: Option<PathBuf>,

    /// Department boundaries (overrides --data-dir)
    #[arg(long, value_name = "FILE")]
    pub departments: Option<PathBuf>,

    /// District boundaries (overrides --data-dir)
    #[arg(long, value_name = "FILE")]
    pub districts: Option<PathBuf>,

    /// Statistic used to color the map
    #[arg(long, value_enum, default_value_t = ViewMode::General)]
    pub view: ViewMode,

    /// Level shown at start-up, as a whole-country view
    #[arg(long, default_value = "region")]
    pub level: GeoLevel,

    /// Seed for the synthetic statistics
    #[arg(long)]
    pub seed: Option<u64>,

    /// Draw new statistics every time a level is loaded
    #[arg(long)]
    pub reroll_stats: bool,

    /// Tile URL template with {s}, {z}, {x} and {y} placeholders
    #[arg(long, default_value = OSM_TILE_URL)]
    pub tile_url: String,

    /// Attribution shown for the tile provider
    #[arg(long, default_value = OSM_ATTRIBUTION)]
    pub attribution: String,

    /// Initial map center as "lat,lon" (defaults to the extent of the regions)
    #[arg(long, value_parser = parse_lat_lon)]
    pub center: Option<Coord<f64>>,

    /// Initial zoom, used with --center
    #[arg(long, default_value_t = 6)]
    pub zoom: u8,

    /// Where map snapshots are written
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub export_dir: PathBuf,

    /// Log file (the terminal is taken by the UI)
    #[arg(long, value_name = "FILE", default_value = "electoral-atlas.log")]
    pub log_file: PathBuf,
}

/// "lat,lon" → coordinate with x = lon, y = lat.
fn parse_lat_lon(s: &str) -> Result<Coord<f64>, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected 'lat,lon', got '{s}'"))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("bad latitude: {e}"))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("bad longitude: {e}"))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("'{s}' is outside the globe"));
    }
    Ok(Coord { x: lon, y: lat })
}

/// Settings the library needs, detached from the command line.
#[derive(Clone, Debug)]
pub struct AtlasConfig {
    pub boundaries: BoundaryPaths,
    pub view_mode: ViewMode,
    pub start_level: GeoLevel,
    pub stats: StatsConfig,
    pub tiles: TileProvider,
    pub center: Option<(Coord<f64>, u8)>,
    pub export_dir: PathBuf,
}

impl From<Args> for AtlasConfig {
    fn from(args: Args) -> Self {
        let mut boundaries = BoundaryPaths::in_dir(&args.data_dir);
        if let Some(p) = args.regions {
            boundaries.regions = p;
        }
        if let Some(p) = args.departments {
            boundaries.departments = p;
        }
        if let Some(p) = args.districts {
            boundaries.districts = p;
        }
        Self {
            boundaries,
            view_mode: args.view,
            start_level: args.level,
            stats: StatsConfig {
                seed: args.seed,
                reroll: args.reroll_stats,
            },
            tiles: TileProvider {
                url_template: args.tile_url,
                attribution: args.attribution,
            },
            center: args.center.map(|c| (c, args.zoom)),
            export_dir: args.export_dir,
        }
    }
}
