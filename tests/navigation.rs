use electoral_atlas::{
    data::{BoundaryPaths, GeoLevel, GeoRepository},
    enrich::{GeoEnrichmentService, StatsConfig},
    navigator::{LoadState, MapControl, MapNavigator, NavigatorEvent, Viewport},
};
use pretty_assertions::assert_eq;
use std::{collections::HashSet, path::Path, sync::Arc};

fn repository() -> Arc<GeoRepository> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("data");
    Arc::new(GeoRepository::load(&BoundaryPaths::in_dir(dir)).unwrap())
}

fn navigator(repo: Arc<GeoRepository>) -> MapNavigator {
    let home = repo.extent(GeoLevel::Region).map(Viewport::fit).unwrap();
    let service = Arc::new(GeoEnrichmentService::new(repo, StatsConfig { seed: Some(2024), reroll: false }));
    MapNavigator::new(service, home)
}

#[test]
fn shipped_datasets_are_consistent() {
    let repo = repository();
    assert_eq!(repo.count(GeoLevel::Region), 3);
    assert_eq!(repo.count(GeoLevel::Department), 6);
    assert_eq!(repo.count(GeoLevel::District), 12);

    for region in repo.raw_features(GeoLevel::Region, None) {
        let departments = repo.raw_features(GeoLevel::Department, Some(region.id()));
        assert_eq!(departments.len(), 2, "{}", region.name());
        for department in departments {
            assert_eq!(department.parent_name(), Some(region.name()));
            assert_eq!(repo.raw_features(GeoLevel::District, Some(department.id())).len(), 2);
        }
    }
    // Littoral carries an island as a second polygon
    let littoral = repo.search("littoral", GeoLevel::Region);
    assert_eq!(littoral.len(), 1);
    let feature = repo
        .raw_features(GeoLevel::Region, None)
        .into_iter()
        .find(|f| f.id() == littoral[0].id)
        .unwrap();
    assert_eq!(feature.geometry.0.len(), 2);
}

#[tokio::test]
async fn drill_down_to_a_district_and_back_home() {
    let mut nav = navigator(repository());
    let mut events = nav.subscribe();
    nav.navigate_home();
    nav.settle().await;

    let regions = Arc::clone(nav.collection().unwrap());
    assert_eq!(regions.len(), 3);
    let ids: HashSet<&str> = regions.features.iter().map(|f| f.id()).collect();
    assert_eq!(ids.len(), 3);

    nav.select_by_id("CMR.2_1").unwrap();
    nav.settle().await;
    assert_eq!(nav.collection().unwrap().level, GeoLevel::Department);
    let names: Vec<&str> = nav.collection().unwrap().features.iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["Mfoundi", "Lekié"]);

    nav.select_by_id("CMR.2.1_1").unwrap();
    nav.settle().await;
    nav.select_by_id("CMR.2.1.1_1").unwrap();
    assert_eq!(nav.state(), &LoadState::Idle);
    let trail: Vec<&str> = nav.breadcrumbs().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(trail, vec!["Centre", "Mfoundi", "Yaoundé I"]);
    let district = nav.selected().unwrap();
    assert_eq!(district.properties.parent_name.as_deref(), Some("Mfoundi"));
    assert!(nav.viewport().zoom >= 7);

    nav.go_back();
    nav.go_back();
    nav.go_back();
    nav.settle().await;
    assert!(nav.breadcrumbs().is_empty());
    assert!(nav.selected().is_none());
    assert_eq!(nav.collection().unwrap().level, GeoLevel::Region);

    // session cache: the regions come back with the same numbers
    for f in &nav.collection().unwrap().features {
        let before = regions.find(f.id()).unwrap();
        assert_eq!(f.properties.total_voters, before.properties.total_voters);
    }

    let selected: Vec<String> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|e| match e {
            NavigatorEvent::RegionSelected { id, .. } => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(selected, vec!["CMR.2_1", "CMR.2.1_1", "CMR.2.1.1_1"]);
}

#[tokio::test]
async fn last_requested_scope_is_displayed() {
    let mut nav = navigator(repository());
    nav.load_level(GeoLevel::Department, Some("CMR.2_1".into()));
    nav.load_level(GeoLevel::Department, Some("CMR.7_1".into()));
    nav.settle().await;
    let collection = nav.collection().unwrap();
    assert_eq!(collection.parent_id.as_deref(), Some("CMR.7_1"));
    assert!(collection.features.iter().all(|f| f.properties.parent_name.as_deref() == Some("Nord")));
}

#[tokio::test]
async fn export_covers_the_displayed_collection() {
    let mut nav = navigator(repository());
    nav.navigate_home();
    nav.settle().await;
    nav.select_by_id("CMR.5_1").unwrap();
    nav.settle().await;
    let svg = String::from_utf8(nav.export_image().await.unwrap()).unwrap();
    assert_eq!(svg.matches("<path").count(), 2);
    assert!(svg.contains("<title>Wouri</title>"));
}
