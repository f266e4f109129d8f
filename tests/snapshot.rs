use chrono::NaiveDate;

use warmpath::entity::{flags, identifiers};
use warmpath::time::today;
use warmpath::{
    EntityType, ImportAttributes, ImportEvent, PathFinder, RelationshipKind, StoreSnapshot, TemporalStore,
};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn snapshot_file_restores_indexes_and_paths() {
    let store = TemporalStore::in_memory();
    let home = store
        .upsert_entity(
            &ImportEvent::new(EntityType::Company, "Home Co")
                .identifier(identifiers::DOMAIN, "home.co")
                .flag(flags::IS_CLIENT, true)
                .attributes(ImportAttributes {
                    client_start_date: Some(day(2018, 1, 1)),
                    ..ImportAttributes::default()
                }),
        )
        .unwrap();
    let target = store
        .upsert_entity(&ImportEvent::new(EntityType::Company, "Target Co").identifier(identifiers::DOMAIN, "target.co"))
        .unwrap();
    let person = store
        .upsert_entity(&ImportEvent::new(EntityType::Person, "Morgan Lee"))
        .unwrap();
    store
        .record_relationship(RelationshipKind::Employment, person, home, day(2011, 1, 1), Some(day(2016, 1, 1)))
        .unwrap();
    store
        .record_relationship(RelationshipKind::Employment, person, target, day(2016, 2, 1), None)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.json");
    store.snapshot().unwrap().write_to_file(&path).unwrap();

    let restored = TemporalStore::from_snapshot(StoreSnapshot::read_from_file(&path).unwrap(), today()).unwrap();
    assert_eq!(restored.all_entities().unwrap().len(), 3);
    assert_eq!(restored.all_relationships().unwrap().len(), 2);

    let found = restored
        .find_by_identifier(EntityType::Company, identifiers::DOMAIN, "HOME.CO")
        .unwrap()
        .unwrap();
    assert_eq!(found.id, home);
    assert_eq!(restored.find_by_name(EntityType::Person, "morgan lee").unwrap()[0].id, person);
    assert_eq!(restored.home_network(today()).unwrap(), vec![home]);

    let paths = PathFinder::default()
        .find_paths(&restored, &[home], target, 2, Some(day(2024, 1, 1)))
        .unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].tier.number(), 1);
}

#[test]
fn corrupt_snapshot_file_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = StoreSnapshot::read_from_file(&path).unwrap_err();
    assert!(err.to_string().to_lowercase().contains("serializ"));
    assert!(StoreSnapshot::read_from_file(dir.path().join("missing.json")).is_err());
}
