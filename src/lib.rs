//! # Electoral Atlas
//!
//! A terminal map browser for election statistics, drilling down from
//! regions to departments to districts.
//!
//! ## Features
//!
//! - Load GADM-style region, department and district boundaries (GeoJSON)
//! - Attach synthetic voter statistics to every feature
//! - Drill down and back up through a breadcrumb trail
//! - Color the map by participation or by leading party
//! - Export the current view as SVG
//!
//! ## Example
//!
//! ```no_run
//! use electoral_atlas::data::{BoundaryPaths, GeoLevel, GeoRepository};
//!
//! let repo = GeoRepository::load(&BoundaryPaths::in_dir("data")).expect("Failed to load");
//! println!("Regions: {}", repo.count(GeoLevel::Region));
//! ```

pub mod config;
pub mod data;
pub mod enrich;
pub mod error;
pub mod map_draw;
pub mod navigator;
pub mod state;
pub mod style;
pub mod tiles;
pub mod ui;

#[cfg(test)]
mod fixtures;
