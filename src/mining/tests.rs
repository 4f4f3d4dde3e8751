use super::*;
use crate::cache::EmbeddingCache;
use crate::config::TrainConfig;
use crate::dataset::{GeoDataset, InMemoryDataset, Location};
use crate::model::GeoLocalizationNet;
use candle_core::Device;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

fn rng(seed: u64) -> Xoshiro256PlusPlus {
    Xoshiro256PlusPlus::seed_from_u64(seed)
}

/// Two database images near the query, three far away, plus one query with no
/// positive at all.
fn two_positive_dataset() -> InMemoryDataset {
    let database = [
        Location::new(0.0, 0.0),
        Location::new(5.0, 0.0),
        Location::new(200.0, 0.0),
        Location::new(300.0, 0.0),
        Location::new(400.0, 0.0),
    ];
    let queries = [Location::new(1.0, 0.0), Location::new(5000.0, 0.0)];
    InMemoryDataset::from_locations("toy/train", &database, &queries).expect("dataset")
}

/// One-dimensional embeddings for `two_positive_dataset`.
fn scalar_snapshot(values: &[(usize, f32)]) -> CacheSnapshot {
    let (indices, data): (Vec<usize>, Vec<f32>) = values.iter().copied().unzip();
    CacheSnapshot::new(1, 1, indices, data)
}

#[test]
fn test_nth_outside_skips_excluded() {
    assert_eq!(nth_outside(&[], 3), 3);
    assert_eq!(nth_outside(&[0, 1], 0), 2);
    assert_eq!(nth_outside(&[2, 4], 2), 3);
    assert_eq!(nth_outside(&[2, 4], 3), 5);
}

#[test]
fn test_sample_queries_are_distinct() {
    let dataset = InMemoryDataset::line("toy/train", 6, 100.0).unwrap();
    let miner = TripletMiner::new(&dataset, &TrainConfig::for_testing()).unwrap();
    assert_eq!(miner.queries_len(), 6);

    let mut queries = miner.sample_queries(&mut rng(1));
    assert_eq!(queries.len(), 2);
    queries.sort_unstable();
    queries.dedup();
    assert_eq!(queries.len(), 2);
    assert!(queries.iter().all(|&q| q < 6));
}

#[test]
fn test_plan_excludes_soft_positives_from_negatives() {
    let dataset = two_positive_dataset();
    let miner = TripletMiner::new(&dataset, &TrainConfig::for_testing()).unwrap();

    let plan = miner.plan(&[0, 1], &mut rng(7));
    assert_eq!(plan.without_positive(), 1);
    assert_eq!(plan.queries().len(), 1);

    let qp = &plan.queries()[0];
    assert_eq!(qp.query, dataset.query_index(0));
    assert_eq!(qp.positives, vec![0, 1]);

    let mut negatives = qp.neg_samples.clone();
    negatives.sort_unstable();
    assert_eq!(negatives, vec![2, 3, 4]);

    let mut pool = plan.pool();
    pool.sort_unstable();
    assert_eq!(pool, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_plan_is_deterministic_for_a_seed() {
    let dataset = InMemoryDataset::line("toy/train", 12, 100.0).unwrap();
    let config = TrainConfig {
        neg_samples_num: 4,
        ..TrainConfig::for_testing()
    };
    let miner = TripletMiner::new(&dataset, &config).unwrap();

    let a = miner.plan(&[0, 3, 5], &mut rng(42));
    let b = miner.plan(&[0, 3, 5], &mut rng(42));
    assert_eq!(a.queries(), b.queries());
    assert!(a.queries().iter().all(|q| q.neg_samples.len() == 4));
}

#[test]
fn test_compute_triplets_picks_hardest_examples() {
    let dataset = two_positive_dataset();
    let miner = TripletMiner::new(&dataset, &TrainConfig::for_testing()).unwrap();
    let plan = miner.plan(&[0], &mut rng(3));

    // Query 5 sits at 1.0; database 1 is the closer positive in embedding space
    // even though database 0 is geographically closer.
    let snapshot = scalar_snapshot(&[
        (0, 3.0),
        (1, 1.2),
        (2, 9.0),
        (3, 1.5),
        (4, 0.0),
        (5, 1.0),
    ]);

    let triplets = miner.compute_triplets(&plan, &snapshot).unwrap();
    assert_eq!(
        triplets,
        vec![Triplet {
            query: 5,
            positive: 1,
            negatives: vec![3, 4],
        }]
    );
}

#[test]
fn test_compute_triplets_drops_query_short_of_negatives() {
    let dataset = two_positive_dataset();
    let config = TrainConfig {
        negs_num_per_query: 4,
        ..TrainConfig::for_testing()
    };
    let miner = TripletMiner::new(&dataset, &config).unwrap();
    let plan = miner.plan(&[0], &mut rng(3));
    assert_eq!(plan.queries()[0].neg_samples.len(), 3);

    let snapshot = scalar_snapshot(&[(0, 0.0), (1, 0.0), (2, 0.0), (3, 0.0), (4, 0.0), (5, 0.0)]);
    assert!(miner.compute_triplets(&plan, &snapshot).unwrap().is_empty());
}

#[test]
fn test_compute_triplets_requires_cached_pool() {
    let dataset = two_positive_dataset();
    let miner = TripletMiner::new(&dataset, &TrainConfig::for_testing()).unwrap();
    let plan = miner.plan(&[0], &mut rng(3));

    let snapshot = scalar_snapshot(&[(5, 0.0), (0, 0.0)]);
    let err = miner.compute_triplets(&plan, &snapshot).unwrap_err();
    assert!(matches!(err, MiningError::NotCached { version: 1, .. }));
}

#[test]
fn test_mining_loop_with_refreshed_cache() {
    // refresh 2, 4 queries per epoch, 5 negative samples, 2 negatives per query.
    let config = TrainConfig::for_testing();
    let dataset = InMemoryDataset::line("toy/train", 6, 100.0).unwrap();
    let model = GeoLocalizationNet::new(&config, 3, &Device::Cpu).unwrap();
    let miner = TripletMiner::new(&dataset, &config).unwrap();
    let mut cache = EmbeddingCache::new(config.features_dim, config.infer_batch_size);
    let mut rng = rng(0);

    assert_eq!(config.loops_num(), 2);
    for loop_num in 0..config.loops_num() {
        let queries = miner.sample_queries(&mut rng);
        let plan = miner.plan(&queries, &mut rng);
        let snapshot = cache.refresh(&model, &dataset, &plan.pool()).unwrap();
        assert_eq!(snapshot.version(), loop_num as u64 + 1);

        let triplets = miner.compute_triplets(&plan, &snapshot).unwrap();
        assert_eq!(triplets.len(), 2);
        for t in &triplets {
            let q = dataset.location(t.query).unwrap();
            // Each query's only positive is the database image it was placed next to.
            assert_eq!(t.query - dataset.database_len(), t.positive);
            assert_eq!(t.negatives.len(), 2);
            for &n in &t.negatives {
                assert!(q.distance(&dataset.location(n).unwrap()) > config.val_positive_dist_threshold);
            }
        }
    }
}
