//! Synthetic boundary datasets for unit tests.

use geo::{LineString, Polygon};
use geojson::GeoJson;
use serde_json::{Value, json};

use crate::data::GeoRepository;

pub(crate) fn square(x: f64, y: f64, size: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            (x, y),
            (x + size, y),
            (x + size, y + size),
            (x, y + size),
            (x, y),
        ]),
        vec![],
    )
}

fn square_geometry(x: f64, y: f64, size: f64) -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [x, y], [x + size, y], [x + size, y + size], [x, y + size], [x, y]
        ]]
    })
}

fn collection(name: &str, features: Vec<Value>) -> GeoJson {
    let value = json!({ "type": "FeatureCollection", "name": name, "features": features });
    GeoJson::from_json_value(value).expect("fixture is valid GeoJSON")
}

/// GADM-style datasets: `regions` regions, each split into `departments`
/// departments, each split into `districts` districts.
pub(crate) fn repository_geojson(
    regions: usize,
    departments: usize,
    districts: usize,
) -> (GeoJson, GeoJson, GeoJson) {
    let (mut rs, mut ds, mut ks) = (Vec::new(), Vec::new(), Vec::new());
    for r in 1..=regions {
        let rx = r as f64 * 10.0;
        rs.push(json!({
            "type": "Feature",
            "properties": { "GID_1": format!("XV.{r}_1"), "NAME_1": format!("Region {r}"), "COUNTRY": "Valdoria" },
            "geometry": square_geometry(rx, 0.0, 8.0),
        }));
        for d in 1..=departments {
            let dx = rx + d as f64;
            ds.push(json!({
                "type": "Feature",
                "properties": {
                    "GID_1": format!("XV.{r}_1"), "NAME_1": format!("Region {r}"),
                    "GID_2": format!("XV.{r}.{d}_1"), "NAME_2": format!("Department {r}-{d}"),
                },
                "geometry": square_geometry(dx, 1.0, 0.9),
            }));
            for k in 1..=districts {
                ks.push(json!({
                    "type": "Feature",
                    "properties": {
                        "GID_1": format!("XV.{r}_1"), "NAME_1": format!("Region {r}"),
                        "GID_2": format!("XV.{r}.{d}_1"), "NAME_2": format!("Department {r}-{d}"),
                        "GID_3": format!("XV.{r}.{d}.{k}_1"), "NAME_3": format!("District {r}-{d}-{k}"),
                    },
                    "geometry": square_geometry(dx + k as f64 * 0.1, 1.0, 0.09),
                }));
            }
        }
    }
    (
        collection("regions", rs),
        collection("departments", ds),
        collection("districts", ks),
    )
}

pub(crate) fn repository(regions: usize, departments: usize, districts: usize) -> GeoRepository {
    let (r, d, k) = repository_geojson(regions, departments, districts);
    GeoRepository::from_geojson(r, d, k).expect("fixture datasets parse")
}
