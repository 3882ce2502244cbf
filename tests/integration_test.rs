// Integration tests for lookalike
use lookalike::{pipeline, LookalikeConfig};
use lookalike_core::{
    EngineConfig, EntityId, FeatureRecord, FeatureSchema, FeatureSpec, FeatureValue, ForestConfig,
    LookalikeEngine, Population, StateError, TokenMode,
};
use lookalike_profile::{importance, Saturation, ValueProbabilityTable};
use lookalike_storage::SnapshotStore;
use serde_json::{json, Value};
use std::collections::HashSet;
use tempfile::TempDir;

fn schema() -> FeatureSchema {
    FeatureSchema::new(
        "customer_id",
        vec![
            FeatureSpec::scalar("gender"),
            FeatureSpec::scalar("region"),
            FeatureSpec::multi("apps"),
        ],
    )
    .unwrap()
}

/// Two clusters: readers in the north and gamers in the south.
fn rows() -> Vec<Value> {
    let mut rows = Vec::new();
    for i in 0..40u64 {
        let row = if i % 2 == 0 {
            json!({
                "customer_id": i,
                "gender": ["f"],
                "region": "north",
                "apps": ["news", "books", "mail", format!("reader-{}", i % 3)],
            })
        } else {
            json!({
                "customer_id": i,
                "gender": "m",
                "region": ["south"],
                "apps": ["games", "chat", "video", format!("gamer-{}", i % 3)],
            })
        };
        rows.push(row);
    }
    // one row with an oversized app list is dropped during prep
    let apps: Vec<String> = (0..30).map(|i| format!("app-{}", i)).collect();
    rows.push(json!({
        "customer_id": 999,
        "gender": "f",
        "region": "north",
        "apps": apps,
    }));
    rows
}

fn config() -> LookalikeConfig {
    let mut config = LookalikeConfig::new(schema());
    config.query.k = 5;
    config
}

fn tags_population(tags: &[&[&str]]) -> Population {
    let schema = FeatureSchema::new("id", vec![FeatureSpec::multi("tags")]).unwrap();
    let records = tags
        .iter()
        .enumerate()
        .map(|(i, t)| FeatureRecord::new(i as u64 + 1, vec![FeatureValue::multi(t.iter().copied())]))
        .collect();
    Population::new(schema, records).unwrap()
}

#[test]
fn test_end_to_end_report() {
    let seeds = vec![EntityId::Integer(0), EntityId::Integer(2), EntityId::Integer(4)];
    let report = lookalike::run(&config(), rows(), &seeds).unwrap();

    assert_eq!(report.stats.seeds_count, 3);
    assert_eq!(report.stats.skipped_seeds, 0);
    assert!(!report.result.is_empty());

    // seeds never come back
    assert!(report.result.iter().all(|r| !seeds.contains(&r.id)));
    // the dropped row never comes back either
    assert!(report.result.iter().all(|r| r.id != EntityId::Integer(999)));

    // the seed cluster dominates the importance ranking
    let top = &report.importance[0];
    assert!(top.score > 0.0);
    assert!(top.seed_probability > top.population_probability);

    // results are sorted by explained score
    for pair in report.result.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn test_prep_drops_oversized_rows() {
    let population = pipeline::load_population(&config(), rows()).unwrap();
    assert_eq!(population.len(), 40);
    assert!(!population.contains(&EntityId::Integer(999)));
    // singleton lists were unwrapped into scalars
    let record = population.get(&EntityId::Integer(0)).unwrap();
    assert_eq!(record.values[0], FeatureValue::from("f"));
}

#[test]
fn test_unknown_seeds_are_skipped() {
    let population = pipeline::load_population(&config(), rows()).unwrap();
    let engine = pipeline::build_engine(&config(), population).unwrap();

    let seeds = vec![EntityId::Integer(1), EntityId::Integer(12345), EntityId::from("ghost")];
    let report = pipeline::profile(&engine, &seeds, 5, Saturation::default()).unwrap();
    assert_eq!(report.stats.seeds_count, 1);
    assert_eq!(report.stats.skipped_seeds, 2);
    assert!(report.result.iter().all(|r| r.id != EntityId::Integer(1)));
}

#[test]
fn test_concrete_scenario() {
    let population = tags_population(&[&["a", "b", "c"], &["a", "b", "d"], &["x", "y", "z"]]);
    let config = EngineConfig {
        forest: ForestConfig::new(64, 16, 4).unwrap(),
        ..Default::default()
    };
    let engine = LookalikeEngine::build(config, population).unwrap();

    let hits = engine.neighbors(&EntityId::Integer(1), 2).unwrap();
    let ids: Vec<_> = hits.iter().map(|n| n.id.clone()).collect();
    assert_eq!(ids, vec![EntityId::Integer(1), EntityId::Integer(2)]);
    assert_eq!(hits[0].similarity, 1.0);

    let outcome = engine.expand(&[EntityId::Integer(1)], 2).unwrap();
    assert_eq!(outcome.neighbors, HashSet::from([EntityId::Integer(2)]));
    assert_eq!(outcome.queried_seeds, 1);
}

#[test]
fn test_repeated_seeds_do_not_skew_importance() {
    let population = pipeline::load_population(&config(), rows()).unwrap();
    let engine = pipeline::build_engine(&config(), population).unwrap();

    let once = [EntityId::Integer(0), EntityId::Integer(1)];
    let repeated = [
        EntityId::Integer(0),
        EntityId::Integer(0),
        EntityId::Integer(0),
        EntityId::Integer(1),
    ];
    let a = pipeline::profile(&engine, &once, 5, Saturation::default()).unwrap();
    let b = pipeline::profile(&engine, &repeated, 5, Saturation::default()).unwrap();

    assert_eq!(b.stats.seeds_count, 2);
    assert_eq!(a.importance, b.importance);
    let north = b
        .importance
        .iter()
        .find(|i| i.feature == "region" && i.value == "north")
        .unwrap();
    assert_eq!(north.seed_probability, 0.5);
}

#[test]
fn test_build_is_idempotent() {
    let config = config();
    let first = pipeline::build_engine(&config, pipeline::load_population(&config, rows()).unwrap()).unwrap();
    let second = pipeline::build_engine(&config, pipeline::load_population(&config, rows()).unwrap()).unwrap();

    for record in first.population().records() {
        let a = first.neighbors(&record.id, 5).unwrap();
        let b = second.neighbors(&record.id, 5).unwrap();
        assert_eq!(a, b, "top-k differs for {}", record.id);
    }
}

#[test]
fn test_prefixed_tokens_keep_features_apart() {
    // "yes" appears under two features; prefixing keeps them apart
    let schema = FeatureSchema::new(
        "id",
        vec![FeatureSpec::scalar("newsletter"), FeatureSpec::scalar("premium")],
    )
    .unwrap();
    let records = vec![
        FeatureRecord::new(1u64, vec![FeatureValue::from("yes"), FeatureValue::from("no")]),
        FeatureRecord::new(2u64, vec![FeatureValue::from("no"), FeatureValue::from("yes")]),
    ];
    let population = Population::new(schema, records).unwrap();

    let plain = LookalikeEngine::build(EngineConfig::default(), population.clone()).unwrap();
    let prefixed = LookalikeEngine::build(
        EngineConfig {
            token_mode: TokenMode::Prefixed,
            ..Default::default()
        },
        population.clone(),
    )
    .unwrap();

    let r1 = population.get(&EntityId::Integer(1)).unwrap();
    let r2 = population.get(&EntityId::Integer(2)).unwrap();
    // same token set {yes, no} in plain mode
    assert_eq!(plain.encode(r1).unwrap(), plain.encode(r2).unwrap());
    assert_ne!(prefixed.encode(r1).unwrap(), prefixed.encode(r2).unwrap());
}

#[test]
fn test_snapshot_roundtrip_through_pipeline() {
    let temp_dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(temp_dir.path()).unwrap();
    let config = config();

    let engine = pipeline::build_engine(&config, pipeline::load_population(&config, rows()).unwrap()).unwrap();
    store.save("clusters", &engine).unwrap();

    let restored = store
        .load_engine("clusters", pipeline::load_population(&config, rows()).unwrap())
        .unwrap();
    assert_eq!(restored.config(), engine.config());

    let seeds = [EntityId::Integer(0), EntityId::Integer(3)];
    let before = pipeline::profile(&engine, &seeds, 5, config.saturation()).unwrap();
    let after = pipeline::profile(&restored, &seeds, 5, config.saturation()).unwrap();
    let ids = |r: &lookalike::LookalikeReport| r.result.iter().map(|e| e.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&before), ids(&after));
}

#[test]
fn test_frozen_forest_rejects_inserts() {
    let population = tags_population(&[&["a"], &["b"]]);
    let engine = LookalikeEngine::build(EngineConfig::default(), population).unwrap();
    let signature = engine.forest().signature(&EntityId::Integer(1)).unwrap().clone();

    let err = engine
        .forest()
        .insert(EntityId::Integer(3), signature)
        .unwrap_err();
    assert!(matches!(err, lookalike_core::Error::State(StateError::Frozen)));
}

#[test]
fn test_importance_against_population() {
    let population = pipeline::load_population(&config(), rows()).unwrap();
    let seeds: Vec<EntityId> = (0..10u64).map(|i| EntityId::Integer(i * 2)).collect();

    let seed_table = ValueProbabilityTable::from_subset(&population, &seeds);
    let population_table = ValueProbabilityTable::from_population(&population);
    let ranked = importance::rank(&seed_table, &population_table, Saturation::default());

    let north = ranked
        .iter()
        .find(|i| i.feature == "region" && i.value == "north")
        .unwrap();
    assert_eq!(north.seed_probability, 1.0);
    assert_eq!(north.population_probability, 0.5);
    assert!(north.score > 0.0);

    // "south" never appears among the seeds, so it is not scored
    assert!(ranked.iter().all(|i| i.value != "south"));
}

#[test]
fn test_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lookalike.toml");
    std::fs::write(
        &path,
        r#"
        [index]
        num_perm = 64
        bands = 16
        rows = 4

        [query]
        k = 3

        [schema]
        id_column = "customer_id"
        features = [
            { name = "gender" },
            { name = "region" },
            { name = "apps", kind = "multi_valued" },
        ]
        "#,
    )
    .unwrap();

    let config = LookalikeConfig::from_file(&path).unwrap();
    assert_eq!(config.schema, schema());
    assert_eq!(config.forest_config(), ForestConfig::new(64, 16, 4).unwrap());

    let report = lookalike::run(&config, rows(), &[EntityId::Integer(1)]).unwrap();
    assert_eq!(report.stats.seeds_count, 1);
}
