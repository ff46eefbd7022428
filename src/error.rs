//! Error types for the electoral atlas.

use std::path::PathBuf;
use thiserror::Error;

use crate::data::GeoLevel;

/// Errors raised while reading or querying boundary data.
#[derive(Debug, Error)]
pub enum GeoError {
    /// A level string that is not region, department or district.
    #[error("invalid geographic level '{0}'")]
    InvalidLevel(String),

    /// Failed to read a boundary file from disk.
    #[error("failed to read boundary file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The boundary file is not valid GeoJSON.
    #[error("invalid GeoJSON in {dataset}: {source}")]
    GeoJson {
        dataset: String,
        source: Box<geojson::Error>,
    },

    /// A feature's properties do not match the schema of its level.
    #[error("feature {index} in {dataset} has unexpected properties: {source}")]
    Properties {
        dataset: String,
        index: usize,
        source: serde_json::Error,
    },

    /// The dataset is not a FeatureCollection.
    #[error("{dataset} is not a FeatureCollection")]
    NotACollection { dataset: String },

    /// A remote or lazily loaded source could not deliver its data.
    #[error("boundary source unavailable: {message}")]
    Unavailable { message: String },
}

/// An enrichment call failed because its raw data could not be fetched.
#[derive(Debug, Error)]
#[error("failed to load {level} data{}: {source}", parent_suffix(.parent_id))]
pub struct GeoDataLoadError {
    pub level: GeoLevel,
    pub parent_id: Option<String>,
    #[source]
    pub source: GeoError,
}

fn parent_suffix(parent_id: &Option<String>) -> String {
    parent_id
        .as_deref()
        .map(|id| format!(" for '{id}'"))
        .unwrap_or_default()
}

/// Navigation requests that cannot be honoured against the current state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavigationError {
    /// The id is neither in the breadcrumb trail nor the active collection.
    #[error("feature '{0}' not found")]
    FeatureNotFound(String),

    /// Nothing has been loaded yet.
    #[error("no collection loaded")]
    NoCollection,
}

/// Errors that can occur when exporting a map snapshot.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no collection to export")]
    NothingToExport,

    #[error("failed to format SVG: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("export task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
