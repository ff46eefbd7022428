use async_trait::async_trait;
use geo::{Coord, Geometry, MultiPolygon, Rect};
use geojson::GeoJson;
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tracing::{info, warn};

use crate::error::GeoError;

/// Administrative levels: region → department → district
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoLevel {
    Region,
    Department,
    District,
}

impl GeoLevel {
    pub const ALL: [GeoLevel; 3] = [GeoLevel::Region, GeoLevel::Department, GeoLevel::District];

    /// The level one step deeper, `None` for districts.
    pub fn next(self) -> Option<GeoLevel> {
        match self {
            GeoLevel::Region => Some(GeoLevel::Department),
            GeoLevel::Department => Some(GeoLevel::District),
            GeoLevel::District => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GeoLevel::Region => "region",
            GeoLevel::Department => "department",
            GeoLevel::District => "district",
        }
    }

    /// Name given to a collection of this level.
    pub fn collection_name(self) -> &'static str {
        match self {
            GeoLevel::Region => "regions",
            GeoLevel::Department => "departments",
            GeoLevel::District => "districts",
        }
    }
}

impl fmt::Display for GeoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeoLevel {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "region" => Ok(GeoLevel::Region),
            "department" => Ok(GeoLevel::Department),
            "district" => Ok(GeoLevel::District),
            _ => Err(GeoError::InvalidLevel(s.to_string())),
        }
    }
}

// GADM attribute tables name their columns per level, so each level gets
// its own schema. Only the id/name/parent columns are required.

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RegionProperties {
    pub gid_1: String,
    pub name_1: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub engtype_1: Option<String>,
    #[serde(default)]
    pub hasc_1: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DepartmentProperties {
    pub gid_1: String,
    pub name_1: String,
    pub gid_2: String,
    pub name_2: String,
    #[serde(default)]
    pub engtype_2: Option<String>,
    #[serde(default)]
    pub hasc_2: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DistrictProperties {
    pub gid_1: String,
    pub name_1: String,
    pub gid_2: String,
    pub name_2: String,
    pub gid_3: String,
    pub name_3: String,
    #[serde(default)]
    pub engtype_3: Option<String>,
    #[serde(default)]
    pub hasc_3: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RawProperties {
    Region(RegionProperties),
    Department(DepartmentProperties),
    District(DistrictProperties),
}

/// A boundary feature as delivered by the geodata provider.
#[derive(Clone, Debug)]
pub struct RawFeature {
    pub geometry: Arc<MultiPolygon<f64>>,
    pub properties: RawProperties,
}

impl RawFeature {
    pub fn level(&self) -> GeoLevel {
        match self.properties {
            RawProperties::Region(_) => GeoLevel::Region,
            RawProperties::Department(_) => GeoLevel::Department,
            RawProperties::District(_) => GeoLevel::District,
        }
    }

    pub fn id(&self) -> &str {
        match &self.properties {
            RawProperties::Region(p) => &p.gid_1,
            RawProperties::Department(p) => &p.gid_2,
            RawProperties::District(p) => &p.gid_3,
        }
    }

    pub fn name(&self) -> &str {
        match &self.properties {
            RawProperties::Region(p) => &p.name_1,
            RawProperties::Department(p) => &p.name_2,
            RawProperties::District(p) => &p.name_3,
        }
    }

    /// Id of the enclosing feature one level up.
    pub fn parent_id(&self) -> Option<&str> {
        match &self.properties {
            RawProperties::Region(_) => None,
            RawProperties::Department(p) => Some(&p.gid_1),
            RawProperties::District(p) => Some(&p.gid_2),
        }
    }

    pub fn parent_name(&self) -> Option<&str> {
        match &self.properties {
            RawProperties::Region(_) => None,
            RawProperties::Department(p) => Some(&p.name_1),
            RawProperties::District(p) => Some(&p.name_2),
        }
    }
}

/// Bounding box of the outer rings of every polygon.
pub fn outer_ring_bounds(mp: &MultiPolygon<f64>) -> Option<Rect<f64>> {
    let (mut minx, mut miny, mut maxx, mut maxy) =
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for poly in &mp.0 {
        for coord in &poly.exterior().0 {
            minx = minx.min(coord.x);
            miny = miny.min(coord.y);
            maxx = maxx.max(coord.x);
            maxy = maxy.max(coord.y);
        }
    }
    if minx > maxx || miny > maxy {
        return None;
    }
    Some(Rect::new(Coord { x: minx, y: miny }, Coord { x: maxx, y: maxy }))
}

/// Smallest rectangle covering every rectangle of `rects`.
pub fn union_bounds<I: IntoIterator<Item = Rect<f64>>>(rects: I) -> Option<Rect<f64>> {
    rects.into_iter().reduce(|a, b| {
        Rect::new(
            Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
            Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
        )
    })
}

/// Locations of the three boundary files.
#[derive(Clone, Debug)]
pub struct BoundaryPaths {
    pub regions: PathBuf,
    pub departments: PathBuf,
    pub districts: PathBuf,
}

impl BoundaryPaths {
    pub fn in_dir<P: AsRef<Path>>(base: P) -> Self {
        let base = base.as_ref();
        Self {
            regions: base.join("regions.geojson"),
            departments: base.join("departments.geojson"),
            districts: base.join("districts.geojson"),
        }
    }
}

/// Result of a name search over the raw datasets.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub name: String,
    pub level: GeoLevel,
    /// (lat, lon) of the bounding-box center.
    pub center: (f64, f64),
}

/// The three boundary datasets, parsed once and shared read-only.
#[derive(Debug)]
pub struct GeoRepository {
    regions: Vec<RawFeature>,
    departments: Vec<RawFeature>,
    districts: Vec<RawFeature>,
}

impl GeoRepository {
    pub fn load(paths: &BoundaryPaths) -> Result<Self, GeoError> {
        let regions = read_geojson(&paths.regions)?;
        let departments = read_geojson(&paths.departments)?;
        let districts = read_geojson(&paths.districts)?;
        Self::from_geojson(regions, departments, districts)
    }

    pub fn from_geojson(
        regions: GeoJson,
        departments: GeoJson,
        districts: GeoJson,
    ) -> Result<Self, GeoError> {
        let repo = Self {
            regions: parse_dataset(GeoLevel::Region, regions)?,
            departments: parse_dataset(GeoLevel::Department, departments)?,
            districts: parse_dataset(GeoLevel::District, districts)?,
        };
        info!(
            regions = repo.regions.len(),
            departments = repo.departments.len(),
            districts = repo.districts.len(),
            "boundary datasets loaded"
        );
        Ok(repo)
    }

    fn dataset(&self, level: GeoLevel) -> &[RawFeature] {
        match level {
            GeoLevel::Region => &self.regions,
            GeoLevel::Department => &self.departments,
            GeoLevel::District => &self.districts,
        }
    }

    /// Raw features of a level, restricted to children of `parent_id` when
    /// given. Regions have no parent, so the filter does not apply to them.
    pub fn raw_features(&self, level: GeoLevel, parent_id: Option<&str>) -> Vec<&RawFeature> {
        let features = self.dataset(level);
        match (level, parent_id) {
            (GeoLevel::Region, _) | (_, None) => features.iter().collect(),
            (_, Some(parent)) => features
                .iter()
                .filter(|f| f.parent_id() == Some(parent))
                .collect(),
        }
    }

    pub fn count(&self, level: GeoLevel) -> usize {
        self.dataset(level).len()
    }

    /// Area covered by a whole level.
    pub fn extent(&self, level: GeoLevel) -> Option<Rect<f64>> {
        union_bounds(self.dataset(level).iter().filter_map(|f| outer_ring_bounds(&f.geometry)))
    }

    /// Case-insensitive substring search on feature names.
    pub fn search(&self, query: &str, level: GeoLevel) -> Vec<SearchHit> {
        let query = query.to_lowercase();
        self.dataset(level)
            .iter()
            .filter(|f| f.name().to_lowercase().contains(&query))
            .map(|f| {
                let center = outer_ring_bounds(&f.geometry)
                    .map(|r| (r.center().y, r.center().x))
                    .unwrap_or((0.0, 0.0));
                SearchHit {
                    id: f.id().to_string(),
                    name: f.name().to_string(),
                    level,
                    center,
                }
            })
            .collect()
    }
}

fn read_geojson(path: &Path) -> Result<GeoJson, GeoError> {
    let txt = fs::read_to_string(path).map_err(|source| GeoError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    GeoJson::from_str(&txt).map_err(|source| GeoError::GeoJson {
        dataset: path.display().to_string(),
        source: Box::new(source),
    })
}

fn parse_dataset(level: GeoLevel, raw: GeoJson) -> Result<Vec<RawFeature>, GeoError> {
    let dataset = level.collection_name().to_string();
    let GeoJson::FeatureCollection(fc) = raw else {
        return Err(GeoError::NotACollection { dataset });
    };

    let mut features = Vec::with_capacity(fc.features.len());
    for (index, feature) in fc.features.into_iter().enumerate() {
        let object = feature.properties.unwrap_or_default();
        let value = serde_json::Value::Object(object);
        let properties = match level {
            GeoLevel::Region => serde_json::from_value(value).map(RawProperties::Region),
            GeoLevel::Department => serde_json::from_value(value).map(RawProperties::Department),
            GeoLevel::District => serde_json::from_value(value).map(RawProperties::District),
        }
        .map_err(|source| GeoError::Properties {
            dataset: dataset.clone(),
            index,
            source,
        })?;

        let Some(gj) = feature.geometry else {
            warn!(%dataset, index, "feature without geometry skipped");
            continue;
        };
        let geom: Geometry<f64> = gj.value.try_into().map_err(|source| GeoError::GeoJson {
            dataset: dataset.clone(),
            source: Box::new(source),
        })?;
        let mp = match geom {
            Geometry::Polygon(p) => p.into(),
            Geometry::MultiPolygon(m) => m,
            _ => {
                warn!(%dataset, index, "non-areal geometry skipped");
                continue;
            }
        };

        features.push(RawFeature {
            geometry: Arc::new(mp),
            properties,
        });
    }
    Ok(features)
}

/// Where the enrichment service pulls raw features from.
///
/// The in-memory [`GeoRepository`] answers immediately; a lazily loaded or
/// remote provider can suspend here.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    async fn fetch(
        &self,
        level: GeoLevel,
        parent_id: Option<&str>,
    ) -> Result<Vec<RawFeature>, GeoError>;
}

#[async_trait]
impl FeatureSource for GeoRepository {
    async fn fetch(
        &self,
        level: GeoLevel,
        parent_id: Option<&str>,
    ) -> Result<Vec<RawFeature>, GeoError> {
        Ok(self
            .raw_features(level, parent_id)
            .into_iter()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use pretty_assertions::assert_eq;

    #[test]
    fn level_parsing() {
        assert_eq!("Region".parse::<GeoLevel>().unwrap(), GeoLevel::Region);
        assert_eq!(" district ".parse::<GeoLevel>().unwrap(), GeoLevel::District);
        let err = "county".parse::<GeoLevel>().unwrap_err();
        assert!(matches!(err, GeoError::InvalidLevel(ref s) if s == "county"));
    }

    #[test]
    fn level_ordering_and_next() {
        assert!(GeoLevel::Region < GeoLevel::Department);
        assert!(GeoLevel::Department < GeoLevel::District);
        assert_eq!(GeoLevel::Region.next(), Some(GeoLevel::Department));
        assert_eq!(GeoLevel::District.next(), None);
    }

    #[test]
    fn normalizes_level_specific_fields() {
        let repo = fixtures::repository(2, 2, 2);
        let district = repo.raw_features(GeoLevel::District, None)[0];
        assert_eq!(district.id(), "XV.1.1.1_1");
        assert_eq!(district.name(), "District 1-1-1");
        assert_eq!(district.parent_id(), Some("XV.1.1_1"));
        assert_eq!(district.parent_name(), Some("Department 1-1"));

        let region = repo.raw_features(GeoLevel::Region, None)[1];
        assert_eq!(region.id(), "XV.2_1");
        assert_eq!(region.parent_id(), None);
    }

    #[test]
    fn filters_by_parent_reference() {
        let repo = fixtures::repository(3, 2, 3);
        assert_eq!(repo.raw_features(GeoLevel::Department, None).len(), 6);
        let deps = repo.raw_features(GeoLevel::Department, Some("XV.2_1"));
        assert_eq!(deps.len(), 2);
        assert!(deps.iter().all(|f| f.parent_id() == Some("XV.2_1")));

        let dists = repo.raw_features(GeoLevel::District, Some("XV.3.2_1"));
        assert_eq!(dists.len(), 3);
        assert!(repo.raw_features(GeoLevel::District, Some("nope")).is_empty());
    }

    #[test]
    fn region_filter_ignores_parent() {
        let repo = fixtures::repository(4, 1, 1);
        assert_eq!(repo.raw_features(GeoLevel::Region, Some("XV.1_1")).len(), 4);
    }

    #[test]
    fn bounds_use_outer_rings_of_every_polygon() {
        let mp = MultiPolygon(vec![
            fixtures::square(0.0, 0.0, 1.0),
            fixtures::square(5.0, -2.0, 1.0),
        ]);
        let rect = outer_ring_bounds(&mp).unwrap();
        assert_eq!(rect.min(), Coord { x: 0.0, y: -2.0 });
        assert_eq!(rect.max(), Coord { x: 6.0, y: 1.0 });
        assert!(outer_ring_bounds(&MultiPolygon(vec![])).is_none());
    }

    #[test]
    fn extent_covers_the_whole_level() {
        let repo = fixtures::repository(3, 1, 1);
        let extent = repo.extent(GeoLevel::Region).unwrap();
        assert_eq!(extent.min(), Coord { x: 10.0, y: 0.0 });
        assert_eq!(extent.max(), Coord { x: 38.0, y: 8.0 });
    }

    #[test]
    fn search_matches_case_insensitively() {
        let repo = fixtures::repository(3, 2, 1);
        let hits = repo.search("department 2", GeoLevel::Department);
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["XV.2.1_1", "XV.2.2_1"]);
        assert!(hits.iter().all(|h| h.center != (0.0, 0.0)));
    }

    #[test]
    fn rejects_mismatched_schema() {
        let regions = fixtures::repository_geojson(1, 1, 1).0;
        let err = GeoRepository::from_geojson(regions.clone(), regions.clone(), regions)
            .unwrap_err();
        assert!(matches!(err, GeoError::Properties { index: 0, .. }));
    }

    #[tokio::test]
    async fn repository_is_a_feature_source() {
        let repo = fixtures::repository(2, 3, 1);
        let fetched = repo.fetch(GeoLevel::Department, Some("XV.1_1")).await.unwrap();
        assert_eq!(fetched.len(), 3);
    }

    #[test]
    fn loads_shipped_datasets() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("data");
        let repo = GeoRepository::load(&BoundaryPaths::in_dir(dir)).unwrap();
        assert!(repo.count(GeoLevel::Region) > 0);
        assert!(repo.count(GeoLevel::District) >= repo.count(GeoLevel::Department));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = GeoRepository::load(&BoundaryPaths::in_dir("/nonexistent")).unwrap_err();
        assert!(matches!(err, GeoError::FileRead { .. }));
    }
}
