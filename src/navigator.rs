//! Drill-down navigation over the enriched collections.
//!
//! The navigator is the single owner of the breadcrumb trail, the current
//! selection and the displayed collection. Fetches run as tokio tasks and
//! report back over a channel; every request carries a sequence number and
//! only the outcome of the latest one is applied, so a slow answer to an
//! old navigation can never overwrite a newer one.

use geo::{Coord, Rect};
use std::{future::Future, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    data::GeoLevel,
    enrich::{EnrichedCollection, EnrichedFeature, GeoEnrichmentService},
    error::{ExportError, GeoDataLoadError, NavigationError},
    map_draw::MapSnapshot,
    style::{FeatureStyle, ViewMode, style_for},
};

/// Deepest zoom the tile scheme serves.
pub const MAX_ZOOM: u8 = 18;

/// What the map is centered on and how far it is zoomed in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// x = longitude, y = latitude
    pub center: Coord<f64>,
    pub zoom: u8,
    pub bounds: Rect<f64>,
}

impl Viewport {
    /// Viewport around `center` showing the span of one tile at `zoom`.
    pub fn new(center: Coord<f64>, zoom: u8) -> Self {
        let zoom = zoom.min(MAX_ZOOM);
        let half = 360.0 / 2f64.powi(i32::from(zoom)) / 2.0;
        let bounds = Rect::new(
            Coord { x: center.x - half, y: center.y - half / 2.0 },
            Coord { x: center.x + half, y: center.y + half / 2.0 },
        );
        Self { center, zoom, bounds }
    }

    /// Smallest viewport that contains `bounds`.
    pub fn fit(bounds: Rect<f64>) -> Self {
        // pad point-like boxes so the canvas never gets an empty range
        let pad = |lo: f64, hi: f64| if hi - lo > 1e-9 { (lo, hi) } else { (lo - 0.01, hi + 0.01) };
        let (minx, maxx) = pad(bounds.min().x, bounds.max().x);
        let (miny, maxy) = pad(bounds.min().y, bounds.max().y);
        let bounds = Rect::new(Coord { x: minx, y: miny }, Coord { x: maxx, y: maxy });
        Self {
            center: bounds.center(),
            zoom: zoom_for_span(bounds.width().max(bounds.height())),
            bounds,
        }
    }

    /// Center as (lat, lon).
    pub fn center_lat_lon(&self) -> (f64, f64) {
        (self.center.y, self.center.x)
    }

    /// `[[south, west], [north, east]]`
    pub fn south_west_north_east(&self) -> [[f64; 2]; 2] {
        [
            [self.bounds.min().y, self.bounds.min().x],
            [self.bounds.max().y, self.bounds.max().x],
        ]
    }
}

/// Deepest zoom whose single tile still spans `span` degrees.
pub fn zoom_for_span(span: f64) -> u8 {
    if span.is_nan() || span <= 0.0 {
        return MAX_ZOOM;
    }
    (360.0 / span).log2().floor().clamp(0.0, f64::from(MAX_ZOOM)) as u8
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoadState {
    Idle,
    Loading,
    /// Last fetch failed; the previous collection is still displayed.
    Failed(String),
}

/// Notifications for whoever hosts the map.
#[derive(Clone, Debug, PartialEq)]
pub enum NavigatorEvent {
    RegionSelected { id: String, level: GeoLevel },
    CollectionLoaded { level: GeoLevel, parent_id: Option<String>, count: usize },
    LoadFailed { message: String },
}

/// A stop in the drill-down path.
#[derive(Clone, Debug)]
pub struct NavigationEntry {
    pub id: String,
    pub name: String,
    pub level: GeoLevel,
    pub feature: Arc<EnrichedFeature>,
}

impl NavigationEntry {
    fn of(feature: Arc<EnrichedFeature>) -> Self {
        Self {
            id: feature.id().to_string(),
            name: feature.name().to_string(),
            level: feature.level(),
            feature,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct PendingLoad {
    seq: u64,
    level: GeoLevel,
    parent_id: Option<String>,
}

struct LoadOutcome {
    seq: u64,
    result: Result<Arc<EnrichedCollection>, GeoDataLoadError>,
}

/// What the host may ask of the map, mirroring the controls of a web map
/// widget.
pub trait MapControl {
    /// Fit the viewport to a feature of the displayed collection.
    fn zoom_to_region(&mut self, id: &str) -> Result<(), NavigationError>;

    /// Re-fetch the displayed collection. Returns the request sequence number.
    fn refresh(&mut self) -> u64;

    fn viewport(&self) -> Viewport;

    /// Render the current view to SVG bytes off the UI thread.
    fn export_image(&self) -> impl Future<Output = Result<Vec<u8>, ExportError>> + Send + 'static;
}

pub struct MapNavigator {
    service: Arc<GeoEnrichmentService>,
    collection: Option<Arc<EnrichedCollection>>,
    selected: Option<Arc<EnrichedFeature>>,
    breadcrumbs: Vec<NavigationEntry>,
    state: LoadState,
    view_mode: ViewMode,
    issued: u64,
    pending: Option<PendingLoad>,
    /// Scope of the current load failure, retried by `refresh`.
    failed: Option<PendingLoad>,
    outcomes_tx: mpsc::UnboundedSender<LoadOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<LoadOutcome>,
    listener: Option<mpsc::UnboundedSender<NavigatorEvent>>,
    viewport: Viewport,
    home: Viewport,
}

impl MapNavigator {
    pub fn new(service: Arc<GeoEnrichmentService>, home: Viewport) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Self {
            service,
            collection: None,
            selected: None,
            breadcrumbs: Vec::new(),
            state: LoadState::Idle,
            view_mode: ViewMode::default(),
            issued: 0,
            pending: None,
            failed: None,
            outcomes_tx,
            outcomes_rx,
            listener: None,
            viewport: home,
            home,
        }
    }

    /// Receiver for [`NavigatorEvent`]s. A later call replaces the earlier
    /// subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<NavigatorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listener = Some(tx);
        rx
    }

    fn emit(&self, event: NavigatorEvent) {
        if let Some(tx) = &self.listener {
            // a dropped receiver just means nobody is listening any more
            let _ = tx.send(event);
        }
    }

    pub fn collection(&self) -> Option<&Arc<EnrichedCollection>> {
        self.collection.as_ref()
    }

    pub fn selected(&self) -> Option<&Arc<EnrichedFeature>> {
        self.selected.as_ref()
    }

    pub fn breadcrumbs(&self) -> &[NavigationEntry] {
        &self.breadcrumbs
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == LoadState::Loading
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
    }

    fn is_selected(&self, id: &str) -> bool {
        self.selected.as_ref().is_some_and(|s| s.id() == id)
    }

    /// Style of a displayed feature under the current view mode and selection.
    pub fn style_of(&self, feature: &EnrichedFeature) -> FeatureStyle {
        style_for(&feature.properties, self.view_mode, self.is_selected(feature.id()))
    }

    /// Start fetching a collection. Any load still in flight is superseded:
    /// it is allowed to finish but its outcome will be dropped.
    pub fn load_level(&mut self, level: GeoLevel, parent_id: Option<String>) -> u64 {
        self.issued += 1;
        let seq = self.issued;
        let request = PendingLoad { seq, level, parent_id: parent_id.clone() };
        if let Some(old) = self.pending.replace(request) {
            debug!(
                superseded = old.seq,
                level = %old.level,
                parent_id = ?old.parent_id,
                by = seq,
                "load superseded"
            );
        }
        self.state = LoadState::Loading;
        info!(seq, %level, ?parent_id, "loading level");

        let service = Arc::clone(&self.service);
        let tx = self.outcomes_tx.clone();
        tokio::spawn(async move {
            let result = service.enriched_collection(level, parent_id.as_deref()).await;
            let _ = tx.send(LoadOutcome { seq, result });
        });
        seq
    }

    /// Apply every outcome that has already arrived. Returns true when the
    /// displayed state changed.
    pub fn poll_loads(&mut self) -> bool {
        let mut changed = false;
        while let Ok(outcome) = self.outcomes_rx.try_recv() {
            changed |= self.apply(outcome);
        }
        changed
    }

    /// Wait for the next outcome and apply it. Returns whether it was current.
    pub async fn next_outcome(&mut self) -> bool {
        match self.outcomes_rx.recv().await {
            Some(outcome) => self.apply(outcome),
            None => false,
        }
    }

    /// Wait until the latest issued load has been applied.
    pub async fn settle(&mut self) {
        while self.pending.is_some() {
            self.next_outcome().await;
        }
    }

    fn apply(&mut self, outcome: LoadOutcome) -> bool {
        let Some(request) = self.pending.take_if(|p| p.seq == outcome.seq) else {
            debug!(seq = outcome.seq, latest = self.issued, "stale load discarded");
            return false;
        };

        match outcome.result {
            Ok(collection) => {
                info!(
                    level = %collection.level,
                    parent_id = ?collection.parent_id,
                    count = collection.len(),
                    "collection loaded"
                );
                self.emit(NavigatorEvent::CollectionLoaded {
                    level: collection.level,
                    parent_id: collection.parent_id.clone(),
                    count: collection.len(),
                });
                self.collection = Some(collection);
                self.failed = None;
                self.state = LoadState::Idle;
            }
            Err(err) => {
                error!(error = %err, "keeping previous collection");
                let message = err.to_string();
                self.emit(NavigatorEvent::LoadFailed { message: message.clone() });
                self.state = LoadState::Failed(message);
                self.failed = Some(request);
            }
        }
        true
    }

    fn fit_to(&mut self, feature: &EnrichedFeature) {
        if let Some(bounds) = feature.bounds() {
            self.viewport = Viewport::fit(bounds);
        }
    }

    /// Select a feature, record it in the breadcrumbs and drill into its
    /// children unless it is a district.
    pub fn select_feature(&mut self, feature: Arc<EnrichedFeature>) {
        // keep only the ancestors of the new entry
        while let Some(top) = self.breadcrumbs.last() {
            let is_parent = top.level < feature.level()
                && feature.properties.parent_id.as_deref() == Some(top.id.as_str());
            if is_parent {
                break;
            }
            self.breadcrumbs.pop();
        }

        info!(id = feature.id(), level = %feature.level(), "feature selected");
        self.breadcrumbs.push(NavigationEntry::of(Arc::clone(&feature)));
        self.emit(NavigatorEvent::RegionSelected {
            id: feature.id().to_string(),
            level: feature.level(),
        });
        if let Some(next) = feature.level().next() {
            self.load_level(next, Some(feature.id().to_string()));
        }
        self.fit_to(&feature);
        self.selected = Some(feature);
    }

    /// [`select_feature`](Self::select_feature) by id within the displayed
    /// collection.
    pub fn select_by_id(&mut self, id: &str) -> Result<(), NavigationError> {
        let feature = self
            .collection
            .as_ref()
            .ok_or(NavigationError::NoCollection)?
            .find(id)
            .cloned()
            .ok_or_else(|| not_found(id))?;
        self.select_feature(feature);
        Ok(())
    }

    /// Jump back to a breadcrumb entry, dropping everything after it.
    pub fn navigate_to(&mut self, id: &str) -> Result<(), NavigationError> {
        let idx = self
            .breadcrumbs
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| not_found(id))?;
        self.breadcrumbs.truncate(idx + 1);
        let entry = &self.breadcrumbs[idx];
        let feature = Arc::clone(&entry.feature);
        let (level, entry_id) = (entry.level, entry.id.clone());

        info!(id, %level, depth = idx + 1, "navigated to breadcrumb");
        self.fit_to(&feature);
        self.selected = Some(feature);
        if let Some(next) = level.next() {
            self.load_level(next, Some(entry_id));
        }
        Ok(())
    }

    /// One step up the trail; from the first entry this goes home.
    pub fn go_back(&mut self) {
        match self.breadcrumbs.len() {
            0 => {}
            1 => self.navigate_home(),
            n => {
                let id = self.breadcrumbs[n - 2].id.clone();
                // the id comes from the trail itself
                let _ = self.navigate_to(&id);
            }
        }
    }

    /// Back to the whole-country region view with nothing selected.
    pub fn navigate_home(&mut self) {
        self.breadcrumbs.clear();
        self.selected = None;
        self.viewport = self.home;
        self.load_level(GeoLevel::Region, None);
    }

    /// Drop the selection without touching the trail (details panel close).
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn snapshot(&self) -> Option<MapSnapshot> {
        let collection = Arc::clone(self.collection.as_ref()?);
        Some(MapSnapshot {
            collection,
            selected: self.selected.as_ref().map(|s| s.id().to_string()),
            view_mode: self.view_mode,
            viewport: self.viewport,
        })
    }
}

fn not_found(id: &str) -> NavigationError {
    let err = NavigationError::FeatureNotFound(id.to_string());
    warn!(error = %err, "navigation ignored");
    err
}

impl MapControl for MapNavigator {
    fn zoom_to_region(&mut self, id: &str) -> Result<(), NavigationError> {
        let feature = self
            .collection
            .as_ref()
            .ok_or(NavigationError::NoCollection)?
            .find(id)
            .cloned()
            .ok_or_else(|| not_found(id))?;
        self.fit_to(&feature);
        Ok(())
    }

    fn refresh(&mut self) -> u64 {
        // in-flight request first, then the failed one, then what is shown
        let (level, parent_id) = match (&self.pending, &self.failed, &self.collection) {
            (Some(p), _, _) | (None, Some(p), _) => (p.level, p.parent_id.clone()),
            (None, None, Some(c)) => (c.level, c.parent_id.clone()),
            (None, None, None) => (GeoLevel::Region, None),
        };
        self.load_level(level, parent_id)
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn export_image(&self) -> impl Future<Output = Result<Vec<u8>, ExportError>> + Send + 'static {
        let snapshot = self.snapshot();
        async move {
            let snapshot = snapshot.ok_or(ExportError::NothingToExport)?;
            let svg = tokio::task::spawn_blocking(move || snapshot.to_svg()).await??;
            Ok(svg.into_bytes())
        }
    }
}
