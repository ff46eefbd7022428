//! Raster tile addressing for the `{z}/{x}/{y}` scheme.

use geo::Coord;
use std::f64::consts::PI;

use crate::navigator::MAX_ZOOM;

pub const OSM_TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
pub const OSM_ATTRIBUTION: &str = "© OpenStreetMap contributors";

const SUBDOMAINS: [&str; 3] = ["a", "b", "c"];
// web mercator stops at ±85.0511°
const MAX_LATITUDE: f64 = 85.051_128_78;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    /// Tile containing `coord` (x = lon, y = lat) at `zoom`.
    pub fn containing(coord: Coord<f64>, zoom: u8) -> Self {
        let zoom = zoom.min(MAX_ZOOM);
        let n = 2f64.powi(i32::from(zoom));
        let max_index = n - 1.0;
        let lat = coord.y.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let x = ((coord.x + 180.0) / 360.0 * n).floor().clamp(0.0, max_index);
        let y = ((1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * n)
            .floor()
            .clamp(0.0, max_index);
        Self { z: zoom, x: x as u32, y: y as u32 }
    }
}

#[derive(Clone, Debug)]
pub struct TileProvider {
    pub url_template: String,
    pub attribution: String,
}

impl Default for TileProvider {
    fn default() -> Self {
        Self {
            url_template: OSM_TILE_URL.to_string(),
            attribution: OSM_ATTRIBUTION.to_string(),
        }
    }
}

impl TileProvider {
    pub fn url(&self, tile: TileId) -> String {
        let sub = SUBDOMAINS[((tile.x + tile.y) % 3) as usize];
        self.url_template
            .replace("{s}", sub)
            .replace("{z}", &tile.z.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string())
    }
}
