//! Property-based tests for the lookalike pipeline.
//!
//! These tests verify invariants that should hold regardless of input:
//! - Encoding is deterministic for a fixed permutation count and seed
//! - An indexed entity finds itself with similarity 1.0
//! - Expansion never returns a seed
//! - Importance is zero for equal probabilities and antisymmetric otherwise

use lookalike_core::{
    EngineConfig, EntityId, FeatureRecord, FeatureSchema, FeatureSpec, FeatureValue, ForestConfig,
    LookalikeEngine, MinHasher, Population,
};
use lookalike_profile::{score_pair, Saturation};
use proptest::prelude::*;

fn schema() -> FeatureSchema {
    FeatureSchema::new(
        "id",
        vec![FeatureSpec::scalar("plan"), FeatureSpec::multi("tags")],
    )
    .unwrap()
}

prop_compose! {
    fn arb_tags()(tags in prop::collection::vec("[a-f]{1,2}", 0..6)) -> Vec<String> {
        tags
    }
}

prop_compose! {
    fn arb_population(max: usize)(
        rows in prop::collection::vec((0u8..3, arb_tags()), 1..max)
    ) -> Population {
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(i, (plan, tags))| {
                FeatureRecord::new(
                    i as u64,
                    vec![FeatureValue::from(format!("plan-{}", plan)), FeatureValue::multi(tags)],
                )
            })
            .collect();
        Population::new(schema(), records).unwrap()
    }
}

fn small_config() -> EngineConfig {
    EngineConfig {
        forest: ForestConfig::new(32, 8, 4).unwrap(),
        ..Default::default()
    }
}

mod encoding_props {
    use super::*;

    proptest! {
        #[test]
        fn signature_is_deterministic(tokens in prop::collection::vec("[a-z]{1,8}", 0..20), seed in any::<u64>()) {
            let a = MinHasher::with_seed(64, seed).signature(&tokens);
            let b = MinHasher::with_seed(64, seed).signature(&tokens);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn signature_ignores_token_order(mut tokens in prop::collection::vec("[a-z]{1,8}", 1..20)) {
            let hasher = MinHasher::new(64);
            let forward = hasher.signature(&tokens);
            tokens.reverse();
            prop_assert_eq!(forward, hasher.signature(&tokens));
        }
    }
}

mod index_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn entity_finds_itself(population in arb_population(30)) {
            let engine = LookalikeEngine::build(small_config(), population.clone()).unwrap();
            for record in population.records() {
                let hits = engine.neighbors(&record.id, population.len()).unwrap();
                let own = hits.iter().find(|n| n.id == record.id);
                prop_assert!(own.is_some());
                prop_assert_eq!(own.unwrap().similarity, 1.0);
            }
        }

        #[test]
        fn expansion_excludes_seeds(
            population in arb_population(30),
            picks in prop::collection::vec(0u64..40, 0..8),
            k in 1usize..10,
        ) {
            let engine = LookalikeEngine::build(small_config(), population).unwrap();
            let seeds: Vec<EntityId> = picks.into_iter().map(EntityId::from).collect();
            let outcome = engine.expand(&seeds, k).unwrap();
            for seed in &seeds {
                prop_assert!(!outcome.neighbors.contains(seed));
            }
        }
    }
}

mod importance_props {
    use super::*;

    proptest! {
        #[test]
        fn zero_when_equal(p in 0.0f64..=1.0) {
            prop_assert_eq!(score_pair(p, p, Saturation::default()), Some(0.0));
        }

        #[test]
        fn antisymmetric_and_finite(p in 0.0f64..=1.0, q in 0.0f64..=1.0) {
            let forward = score_pair(p, q, Saturation::default()).unwrap();
            let backward = score_pair(q, p, Saturation::default()).unwrap();
            prop_assert!(forward.is_finite());
            prop_assert!((forward + backward).abs() < 1e-9);
            if p > q {
                prop_assert!(forward >= 0.0);
            }
        }
    }
}
