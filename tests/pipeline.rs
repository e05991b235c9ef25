use cultural_vista::aggregate::{aggregate, Entry, Metric};
use cultural_vista::config::AppConfig;
use cultural_vista::data::{DatasetCache, MirrorWarehouse};
use cultural_vista::filter::{select, FilterState, Selected};
use cultural_vista::map::{assemble, LatLon, MarkerFields};
use cultural_vista::pages::{self, Page, PageContext, PageParams, Status};
use cultural_vista::types::SourceKey;
use cultural_vista::PipelineError;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const STATES: &str = "State,Metric\nOdisha,100\nOdisha,50\nKerala,30\n";

fn workspace() -> (TempDir, AppConfig) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("states.csv"), STATES).unwrap();
    fs::create_dir(dir.path().join("mirror")).unwrap();
    fs::write(
        dir.path().join("mirror").join("FESTIVALS.csv"),
        "FESTIVAL,Location (State),MONTH,DESCRIPTION\nOnam,Kerala,August,Harvest\n",
    )
    .unwrap();
    let config = AppConfig::from_toml_str(
        r#"
        [aggregation]
        top_n = 2

        [datasets.states]
        path = "states.csv"

        [datasets.festivals]
        table = "FESTIVALS"

        [datasets.missing]
        path = "nowhere.csv"

        [warehouse]
        user = "u"
        password = "p"
        account = "a"
        warehouse = "w"
        database = "d"
        schema = "s"
        mirror_dir = "mirror"
        "#,
        dir.path().to_path_buf(),
    )
    .unwrap();
    (dir, config)
}

fn cache_for(config: &AppConfig) -> DatasetCache {
    let warehouse = config.warehouse.as_ref().unwrap();
    let mirror = MirrorWarehouse::from_config(warehouse).unwrap();
    DatasetCache::with_warehouse(Arc::new(mirror))
}

#[test]
fn top_two_states_by_metric() {
    let (_dir, config) = workspace();
    let mut cache = cache_for(&config);
    let ds = cache.get(&config.source_key("states").unwrap()).unwrap();
    let result = aggregate(
        &ds,
        &ds.all(),
        "State",
        &Metric::Sum("Metric".into()),
        config.aggregation.top_n,
    )
    .unwrap();
    assert_eq!(
        result.entries,
        vec![Entry::new("Odisha", 150.0), Entry::new("Kerala", 30.0)]
    );
}

#[test]
fn placeholder_visitor_counts_do_not_turn_sums_into_counts() {
    let (dir, config) = workspace();
    fs::write(
        dir.path().join("visitors.csv"),
        "State,Visitors\nOdisha,100\nOdisha,50\nKerala,N/A\nKerala,30\n",
    )
    .unwrap();
    let mut cache = cache_for(&config);
    let ds = cache
        .get(&SourceKey::File(dir.path().join("visitors.csv")))
        .unwrap();
    let result = aggregate(&ds, &ds.all(), "State", &Metric::Sum("Visitors".into()), 10).unwrap();

    assert!(!result.fallback_to_count);
    assert_eq!(
        result.entries,
        vec![Entry::new("Odisha", 150.0), Entry::new("Kerala", 30.0)]
    );
    assert_eq!(result.total, 180.0);
    assert_eq!(ds.schema().numeric_columns(), vec!["Visitors"]);
}

#[test]
fn kerala_keeps_only_the_third_record() {
    let (_dir, config) = workspace();
    let mut cache = cache_for(&config);
    let ds = cache.get(&config.source_key("states").unwrap()).unwrap();
    let filter = FilterState::new().only("State", "Kerala");
    match Selected::from_records(select(&ds, &filter)) {
        Selected::Matches(records) => {
            assert_eq!(records.len(), 1);
            assert!(std::ptr::eq(records[0], &ds.records()[2]));
        }
        Selected::NoMatches => panic!("expected a match"),
    }
}

#[test]
fn repeated_loads_share_one_dataset() {
    let (_dir, config) = workspace();
    let mut cache = cache_for(&config);
    let key = config.source_key("states").unwrap();
    let first = cache.get(&key).unwrap();
    let second = cache.get(&key).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    let stats = cache.stats();
    assert_eq!((stats.entries, stats.hits, stats.misses), (1, 1, 1));
}

#[test]
fn missing_source_is_unavailable_and_not_cached() {
    let (dir, config) = workspace();
    let mut cache = cache_for(&config);
    let key = config.source_key("missing").unwrap();
    assert!(matches!(
        cache.get(&key),
        Err(PipelineError::DataUnavailable { .. })
    ));
    assert!(!cache.contains(&key));

    fs::write(dir.path().join("nowhere.csv"), "a\n1\n").unwrap();
    assert_eq!(cache.get(&key).unwrap().len(), 1);
}

#[test]
fn warehouse_tables_load_through_the_mirror() {
    let (_dir, config) = workspace();
    let mut cache = cache_for(&config);
    let mut ctx = PageContext::new(&mut cache, &config);
    let Page::Festivals(page) =
        pages::render(&mut ctx, "festivals", &PageParams::new().with("state", "Kerala")).unwrap()
    else {
        panic!("wrong page");
    };
    assert_eq!(page.cards.status, Status::Ok);
    assert_eq!(page.cards.body.unwrap()[0].name, "Onam");
}

#[test]
fn map_of_nothing_sits_on_the_national_centre() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("sites.csv"),
        "Name,State,Latitude,Longitude\nKonark,Odisha,19.8876N,86.0945E\n",
    )
    .unwrap();
    let config = AppConfig::from_toml_str(
        "[datasets.sites]\npath = \"sites.csv\"\n",
        dir.path().to_path_buf(),
    )
    .unwrap();
    let mut cache = DatasetCache::new();
    let ds = cache.get(&config.source_key("sites").unwrap()).unwrap();
    let fields = MarkerFields::infer(ds.schema()).unwrap();

    let kerala = FilterState::new().only("State", "Kerala");
    let view = assemble(&ds, &select(&ds, &kerala), &kerala, &fields, &config.map).unwrap();
    assert!(view.markers.is_empty());
    assert_eq!(view.center, LatLon { lat: 22.9734, lon: 78.6569 });

    let odisha = FilterState::new().only("State", "Odisha");
    let view = assemble(&ds, &select(&ds, &odisha), &odisha, &fields, &config.map).unwrap();
    assert_eq!(view.center, LatLon { lat: 19.8876, lon: 86.0945 });
    assert_eq!(view.zoom, config.map.closest_zoom);
}
