//! Attaches synthetic voting statistics to raw boundary features.

use geo::{MultiPolygon, Rect};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use std::{
    collections::HashMap,
    ops::Range,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, error};

use crate::{
    data::{FeatureSource, GeoLevel, RawFeature, outer_ring_bounds, union_bounds},
    error::GeoDataLoadError,
};

/// Vote tally of one party inside a feature.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PartyResult {
    pub party_id: String,
    pub party_name: String,
    pub votes: u64,
    pub percentage: f64,
}

/// Normalized properties shared by every level.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnrichedProperties {
    pub id: String,
    pub name: String,
    pub level: GeoLevel,
    pub parent_id: Option<String>,
    pub parent_name: Option<String>,
    pub total_voters: u64,
    pub participation: f64,
    pub results: Vec<PartyResult>,
}

#[derive(Clone, Debug)]
pub struct EnrichedFeature {
    pub properties: EnrichedProperties,
    pub geometry: Arc<MultiPolygon<f64>>,
}

impl EnrichedFeature {
    pub fn id(&self) -> &str {
        &self.properties.id
    }

    pub fn name(&self) -> &str {
        &self.properties.name
    }

    pub fn level(&self) -> GeoLevel {
        self.properties.level
    }

    pub fn bounds(&self) -> Option<Rect<f64>> {
        outer_ring_bounds(&self.geometry)
    }
}

/// Features of one level produced by a single enrichment call.
#[derive(Debug)]
pub struct EnrichedCollection {
    pub name: String,
    pub level: GeoLevel,
    pub parent_id: Option<String>,
    pub features: Vec<Arc<EnrichedFeature>>,
}

impl EnrichedCollection {
    pub fn find(&self, id: &str) -> Option<&Arc<EnrichedFeature>> {
        self.features.iter().find(|f| f.id() == id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Union of the feature bounds.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        union_bounds(self.features.iter().filter_map(|f| f.bounds()))
    }
}

/// How the statistics generator behaves.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatsConfig {
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
    /// Draw fresh numbers on every call instead of keeping them per feature.
    pub reroll: bool,
}

#[derive(Clone, Debug)]
struct Stats {
    total_voters: u64,
    participation: f64,
    results: Vec<PartyResult>,
}

const PARTIES: [(&str, &str); 2] = [("party1", "Parti A"), ("party2", "Parti B")];

/// Upper bound (exclusive) of the synthetic turnout behind the results.
const MAX_TURNOUT: u64 = 10_000;

fn voter_range(level: GeoLevel) -> Range<u64> {
    match level {
        GeoLevel::Region => 10_000..100_000,
        GeoLevel::Department => 5_000..50_000,
        GeoLevel::District => 1_000..10_000,
    }
}

/// Two-party results: the first party takes `first_share` percent of
/// `turnout`, the second the complement.
pub fn tally(turnout: u64, first_share: f64) -> Vec<PartyResult> {
    let shares = [first_share, 100.0 - first_share];
    PARTIES
        .iter()
        .zip(shares)
        .map(|(&(party_id, party_name), percentage)| PartyResult {
            party_id: party_id.to_string(),
            party_name: party_name.to_string(),
            votes: (turnout as f64 * (percentage / 100.0)).floor() as u64,
            percentage,
        })
        .collect()
}

fn synthesize<R: Rng>(rng: &mut R, level: GeoLevel) -> Stats {
    let total_voters = rng.random_range(voter_range(level));
    let participation = rng.random_range(0.0..100.0);
    let turnout = rng.random_range(0..MAX_TURNOUT);
    let first_share = rng.random_range(40.0..60.0);
    Stats {
        total_voters,
        participation,
        results: tally(turnout, first_share),
    }
}

/// Produces enriched collections from a [`FeatureSource`].
///
/// One instance is shared by everything that displays statistics, so the
/// per-feature cache gives the whole session consistent numbers.
pub struct GeoEnrichmentService {
    source: Arc<dyn FeatureSource>,
    rng: Mutex<StdRng>,
    cache: Option<Mutex<HashMap<(GeoLevel, String), Stats>>>,
}

impl GeoEnrichmentService {
    pub fn new(source: Arc<dyn FeatureSource>, config: StatsConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            source,
            rng: Mutex::new(rng),
            cache: (!config.reroll).then(|| Mutex::new(HashMap::new())),
        }
    }

    /// Enriched features of `level`. `parent_id` restricts departments and
    /// districts to the children of that feature and is ignored for regions.
    pub async fn enriched_collection(
        &self,
        level: GeoLevel,
        parent_id: Option<&str>,
    ) -> Result<Arc<EnrichedCollection>, GeoDataLoadError> {
        let parent_id = match level {
            GeoLevel::Region => None,
            _ => parent_id,
        };
        debug!(%level, ?parent_id, "loading collection");

        let raw = self.source.fetch(level, parent_id).await.map_err(|source| {
            error!(%level, ?parent_id, error = %source, "boundary fetch failed");
            GeoDataLoadError {
                level,
                parent_id: parent_id.map(str::to_owned),
                source,
            }
        })?;

        let features = self.enrich_all(level, raw);
        debug!(%level, count = features.len(), "collection enriched");
        Ok(Arc::new(EnrichedCollection {
            name: level.collection_name().to_string(),
            level,
            parent_id: parent_id.map(str::to_owned),
            features,
        }))
    }

    fn enrich_all(&self, level: GeoLevel, raw: Vec<RawFeature>) -> Vec<Arc<EnrichedFeature>> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cache = self
            .cache
            .as_ref()
            .map(|c| c.lock().unwrap_or_else(PoisonError::into_inner));

        raw.into_iter()
            .map(|feature| {
                let stats = match cache.as_mut() {
                    Some(cache) => cache
                        .entry((level, feature.id().to_string()))
                        .or_insert_with(|| synthesize(&mut *rng, level))
                        .clone(),
                    None => synthesize(&mut *rng, level),
                };
                Arc::new(EnrichedFeature {
                    properties: EnrichedProperties {
                        id: feature.id().to_string(),
                        name: feature.name().to_string(),
                        level,
                        parent_id: feature.parent_id().map(str::to_owned),
                        parent_name: feature.parent_name().map(str::to_owned),
                        total_voters: stats.total_voters,
                        participation: stats.participation,
                        results: stats.results,
                    },
                    geometry: feature.geometry,
                })
            })
            .collect()
    }
}

/// Participation figures over a collection; zero values are ignored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollectionSummary {
    pub total: usize,
    pub average: Option<f64>,
    pub highest: Option<f64>,
    pub lowest: Option<f64>,
}

impl CollectionSummary {
    pub fn of(collection: &EnrichedCollection) -> Self {
        let values: Vec<f64> = collection
            .features
            .iter()
            .map(|f| f.properties.participation)
            .filter(|p| *p != 0.0 && !p.is_nan())
            .collect();
        let (average, highest, lowest) = if values.is_empty() {
            (None, None, None)
        } else {
            (
                Some(values.iter().sum::<f64>() / values.len() as f64),
                values.iter().copied().reduce(f64::max),
                values.iter().copied().reduce(f64::min),
            )
        };
        Self {
            total: collection.len(),
            average,
            highest,
            lowest,
        }
    }
}

/// Formats a count with French digit grouping: `1234567` → `1 234 567`.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    out
}
