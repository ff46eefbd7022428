use crossterm::event::KeyCode;
use geo::Coord;
use std::{path::PathBuf, sync::Arc};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{
    config::AtlasConfig,
    data::{GeoLevel, GeoRepository},
    enrich::{EnrichedCollection, EnrichedFeature, GeoEnrichmentService},
    error::ExportError,
    map_draw::MapView,
    navigator::{LoadState, MapControl, MapNavigator, NavigatorEvent, Viewport},
    style::ViewMode,
    tiles::TileProvider,
};

/// Whole-country view used when neither --center nor the regions give one.
const FALLBACK_CENTER: Coord<f64> = Coord { x: 12.3547, y: 7.3697 };
const FALLBACK_ZOOM: u8 = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
}

pub struct AppState {
    pub repository: Arc<GeoRepository>,
    pub navigator: MapNavigator,
    events: mpsc::UnboundedReceiver<NavigatorEvent>,
    pub view_mode: ViewMode,
    pub input_mode: InputMode,
    pub search: String,
    /// Cursor in the filtered list; the feature under it is drawn hovered.
    pub hovered: usize,
    pub map: Option<MapView>,
    pub status: String,
    pub tiles: TileProvider,
    export_dir: PathBuf,
    exports: u32,
    exports_tx: mpsc::UnboundedSender<Result<PathBuf, ExportError>>,
    exports_rx: mpsc::UnboundedReceiver<Result<PathBuf, ExportError>>,
}

impl AppState {
    pub const HELP_TEXT: &'static str = "\
↑/↓ move · Enter drill down · Esc/Backspace back · h home
1-9 breadcrumb · v view · / search · z zoom · r refresh · e export · q quit";

    /// Builds the state and starts loading the first collection. Must run
    /// inside a tokio runtime.
    pub fn new(repository: Arc<GeoRepository>, config: &AtlasConfig) -> Self {
        let service = Arc::new(GeoEnrichmentService::new(repository.clone(), config.stats));
        let mut navigator = MapNavigator::new(service, home_viewport(&repository, config));
        let events = navigator.subscribe();
        navigator.set_view_mode(config.view_mode);
        match config.start_level {
            GeoLevel::Region => navigator.navigate_home(),
            level => {
                navigator.load_level(level, None);
            }
        }
        let (exports_tx, exports_rx) = mpsc::unbounded_channel();

        Self {
            repository,
            navigator,
            events,
            view_mode: config.view_mode,
            input_mode: InputMode::Normal,
            search: String::new(),
            hovered: 0,
            map: None,
            status: "Loading…".to_string(),
            tiles: config.tiles.clone(),
            export_dir: config.export_dir.clone(),
            exports: 0,
            exports_tx,
            exports_rx,
        }
    }

    /// Level of the collection on screen.
    pub fn level(&self) -> GeoLevel {
        self.navigator.collection().map_or(GeoLevel::Region, |c| c.level)
    }

    pub fn collection(&self) -> Option<&Arc<EnrichedCollection>> {
        self.navigator.collection()
    }

    /// Features of the active collection whose name contains the search text.
    pub fn visible_features(&self) -> Vec<Arc<EnrichedFeature>> {
        let Some(collection) = self.navigator.collection() else {
            return Vec::new();
        };
        let needle = self.search.trim().to_lowercase();
        collection
            .features
            .iter()
            .filter(|f| needle.is_empty() || f.name().to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub fn hovered_feature(&self) -> Option<Arc<EnrichedFeature>> {
        self.visible_features().into_iter().nth(self.hovered)
    }

    /// Matches for the search text across the whole country at this level.
    pub fn nationwide_matches(&self) -> usize {
        let needle = self.search.trim();
        if needle.is_empty() {
            return 0;
        }
        self.repository.search(needle, self.level()).len()
    }

    /// Applies finished loads, navigator events and exports. Called once per
    /// frame.
    pub fn tick(&mut self) {
        self.navigator.poll_loads();

        while let Ok(event) = self.events.try_recv() {
            self.on_event(event);
        }

        if let Some(collection) = self.navigator.collection() {
            let stale = self.map.as_ref().is_none_or(|m| !m.shows(collection));
            if stale {
                self.map = Some(MapView::new(Arc::clone(collection)));
                self.hovered = 0;
                self.search.clear();
            }
        }

        while let Ok(result) = self.exports_rx.try_recv() {
            self.on_export(result);
        }
    }

    fn on_event(&mut self, event: NavigatorEvent) {
        self.status = match event {
            NavigatorEvent::RegionSelected { id, level } => format!("{level} {id} selected"),
            NavigatorEvent::CollectionLoaded { level, parent_id, count } => match parent_id {
                Some(parent) => format!("{count} {} in {parent}", level.collection_name()),
                None => format!("{count} {}", level.collection_name()),
            },
            NavigatorEvent::LoadFailed { message } => format!("Load failed: {message}"),
        };
    }

    fn on_export(&mut self, result: Result<PathBuf, ExportError>) {
        self.status = match result {
            Ok(path) => {
                info!(path = %path.display(), "map exported");
                format!("Exported {}", path.display())
            }
            Err(err) => {
                warn!(error = %err, "export failed");
                format!("Export failed: {err}")
            }
        };
    }

    /// Returns true when the app should quit.
    pub fn handle_input(&mut self, key: KeyCode) -> bool {
        if self.input_mode == InputMode::Search {
            self.handle_search_input(key);
            return false;
        }

        use KeyCode::*;
        match key {
            Char('q') => return true,
            Up => self.hovered = self.hovered.saturating_sub(1),
            Down => {
                if self.hovered + 1 < self.visible_features().len() {
                    self.hovered += 1;
                }
            }
            Enter => self.select_hovered(),
            Esc if !self.search.is_empty() => {
                self.search.clear();
                self.hovered = 0;
            }
            Backspace | Esc => self.navigator.go_back(),
            Char('h') => self.navigator.navigate_home(),
            Char(c @ '1'..='9') => self.jump_to_breadcrumb(c),
            Char('v') => {
                self.view_mode = self.view_mode.next();
                self.navigator.set_view_mode(self.view_mode);
                self.status = format!("View: {}", self.view_mode.label());
            }
            Char('/') => self.input_mode = InputMode::Search,
            Char('z') => {
                if let Some(f) = self.hovered_feature() {
                    if let Err(err) = self.navigator.zoom_to_region(f.id()) {
                        self.status = err.to_string();
                    }
                }
            }
            Char('c') => self.navigator.clear_selection(),
            Char('r') => {
                self.navigator.refresh();
            }
            Char('e') => self.export(),
            _ => {}
        }
        false
    }

    fn handle_search_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Enter => self.input_mode = InputMode::Normal,
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.search.clear();
            }
            KeyCode::Backspace => {
                self.search.pop();
            }
            KeyCode::Char(c) => self.search.push(c),
            _ => return,
        }
        self.hovered = 0;
    }

    fn select_hovered(&mut self) {
        if self.navigator.is_loading() {
            self.status = "Still loading…".to_string();
            return;
        }
        if let Some(feature) = self.hovered_feature() {
            self.navigator.select_feature(feature);
        }
    }

    fn jump_to_breadcrumb(&mut self, digit: char) {
        let Some(idx) = digit.to_digit(10).map(|d| d as usize - 1) else {
            return;
        };
        let Some(id) = self.navigator.breadcrumbs().get(idx).map(|e| e.id.clone()) else {
            return;
        };
        if let Err(err) = self.navigator.navigate_to(&id) {
            self.status = err.to_string();
        }
    }

    /// Renders the current view and writes it to the export directory on a
    /// background task; the outcome shows up in the status line.
    fn export(&mut self) {
        let Some(collection) = self.navigator.collection() else {
            self.status = ExportError::NothingToExport.to_string();
            return;
        };
        self.exports += 1;
        let file = match &collection.parent_id {
            Some(parent) => format!("atlas-{}-{parent}-{}.svg", collection.name, self.exports),
            None => format!("atlas-{}-{}.svg", collection.name, self.exports),
        };
        let path = self.export_dir.join(file);
        let render = self.navigator.export_image();
        let tx = self.exports_tx.clone();
        self.status = "Exporting…".to_string();

        tokio::spawn(async move {
            let result = async {
                let bytes = render.await?;
                tokio::fs::write(&path, bytes)
                    .await
                    .map_err(|source| ExportError::Write { path: path.clone(), source })?;
                Ok::<_, ExportError>(path)
            }
            .await;
            let _ = tx.send(result);
        });
    }

    pub fn load_state(&self) -> &LoadState {
        self.navigator.state()
    }
}

/// --center wins, then the extent of the regions, then a fixed fallback.
fn home_viewport(repository: &GeoRepository, config: &AtlasConfig) -> Viewport {
    if let Some((center, zoom)) = config.center {
        return Viewport::new(center, zoom);
    }
    repository
        .extent(GeoLevel::Region)
        .map(Viewport::fit)
        .unwrap_or_else(|| Viewport::new(FALLBACK_CENTER, FALLBACK_ZOOM))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Args, fixtures};
    use clap::Parser;
    use pretty_assertions::assert_eq;

    fn config(extra: &[&str]) -> AtlasConfig {
        let args = ["electoral-atlas", "--seed", "7"].iter().chain(extra).copied();
        AtlasConfig::from(Args::parse_from(args))
    }

    async fn settled(extra: &[&str]) -> AppState {
        let mut state = AppState::new(Arc::new(fixtures::repository(3, 2, 2)), &config(extra));
        settle(&mut state).await;
        state
    }

    async fn settle(state: &mut AppState) {
        state.navigator.settle().await;
        state.tick();
    }

    fn type_text(state: &mut AppState, text: &str) {
        for c in text.chars() {
            state.handle_input(KeyCode::Char(c));
        }
    }

    #[tokio::test]
    async fn starts_on_the_region_level() {
        let state = settled(&[]).await;
        assert_eq!(state.level(), GeoLevel::Region);
        assert_eq!(state.map.as_ref().unwrap().feature_count(), 3);
        assert_eq!(state.status, "3 regions");
        // fitted to the regions' extent
        assert_eq!(state.navigator.viewport().center_lat_lon(), (4.0, 24.0));
    }

    #[tokio::test]
    async fn start_level_and_center_come_from_config() {
        let state = settled(&["--level", "department", "--center", "5,10", "--zoom", "7"]).await;
        assert_eq!(state.level(), GeoLevel::Department);
        assert_eq!(state.visible_features().len(), 6);
        let vp = state.navigator.viewport();
        assert_eq!((vp.center_lat_lon(), vp.zoom), ((5.0, 10.0), 7));
    }

    #[tokio::test]
    async fn enter_drills_into_the_hovered_feature() {
        let mut state = settled(&[]).await;
        state.handle_input(KeyCode::Down);
        assert_eq!(state.hovered_feature().unwrap().id(), "XV.2_1");

        state.handle_input(KeyCode::Enter);
        // a second Enter while the departments load is ignored
        state.handle_input(KeyCode::Enter);
        assert_eq!(state.status, "Still loading…");
        settle(&mut state).await;

        assert_eq!(state.level(), GeoLevel::Department);
        assert_eq!(state.collection().unwrap().parent_id.as_deref(), Some("XV.2_1"));
        assert_eq!(state.navigator.breadcrumbs().len(), 1);
        assert_eq!(state.hovered, 0);
        assert_eq!(state.status, "2 departments in XV.2_1");
    }

    #[tokio::test]
    async fn back_and_breadcrumb_keys_walk_the_trail() {
        let mut state = settled(&[]).await;
        state.handle_input(KeyCode::Enter);
        settle(&mut state).await;
        state.handle_input(KeyCode::Enter);
        settle(&mut state).await;
        assert_eq!(state.level(), GeoLevel::District);
        assert_eq!(state.navigator.breadcrumbs().len(), 2);

        state.handle_input(KeyCode::Char('1'));
        settle(&mut state).await;
        assert_eq!(state.navigator.breadcrumbs().len(), 1);
        assert_eq!(state.level(), GeoLevel::Department);

        // out-of-range digits do nothing
        state.handle_input(KeyCode::Char('9'));
        assert_eq!(state.navigator.breadcrumbs().len(), 1);

        state.handle_input(KeyCode::Backspace);
        settle(&mut state).await;
        assert!(state.navigator.breadcrumbs().is_empty());
        assert!(state.navigator.selected().is_none());
        assert_eq!(state.level(), GeoLevel::Region);
    }

    #[tokio::test]
    async fn search_filters_the_list() {
        let mut state = settled(&[]).await;
        state.handle_input(KeyCode::Char('/'));
        assert_eq!(state.input_mode, InputMode::Search);
        type_text(&mut state, "ion 3");
        // q is text while searching
        assert!(!state.handle_input(KeyCode::Char('q')));
        state.handle_input(KeyCode::Backspace);

        let names: Vec<String> = state.visible_features().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["Region 3".to_string()]);
        assert_eq!(state.nationwide_matches(), 1);

        state.handle_input(KeyCode::Enter);
        assert_eq!(state.input_mode, InputMode::Normal);
        assert_eq!(state.search, "ion 3");

        // Esc drops the filter before it navigates
        state.handle_input(KeyCode::Esc);
        assert!(state.search.is_empty());
        assert_eq!(state.visible_features().len(), 3);
    }

    #[tokio::test]
    async fn view_key_cycles_modes() {
        let mut state = settled(&["--view", "results"]).await;
        assert_eq!(state.navigator.view_mode(), ViewMode::Results);
        state.handle_input(KeyCode::Char('v'));
        assert_eq!(state.view_mode, ViewMode::General);
        assert_eq!(state.navigator.view_mode(), ViewMode::General);
    }

    #[tokio::test]
    async fn zoom_key_fits_the_hovered_feature() {
        let mut state = settled(&[]).await;
        state.handle_input(KeyCode::Down);
        state.handle_input(KeyCode::Down);
        state.handle_input(KeyCode::Char('z'));
        let vp = state.navigator.viewport();
        assert_eq!(vp.center_lat_lon(), (4.0, 34.0));
        assert!(state.navigator.breadcrumbs().is_empty());
    }

    #[tokio::test]
    async fn export_writes_an_svg() {
        let dir = std::env::temp_dir().join(format!("electoral-atlas-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut state = settled(&["--export-dir", dir.to_str().unwrap()]).await;

        state.handle_input(KeyCode::Char('e'));
        let path = state.exports_rx.recv().await.unwrap().unwrap();
        assert_eq!(path, dir.join("atlas-regions-1.svg"));
        let svg = std::fs::read_to_string(&path).unwrap();
        assert_eq!(svg.matches("<path").count(), 3);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn quit_key() {
        let mut state = settled(&[]).await;
        assert!(state.handle_input(KeyCode::Char('q')));
    }
}
