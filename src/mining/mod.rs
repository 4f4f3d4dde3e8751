//! Hard-negative triplet mining.
//!
//! Mining is split around the cache refresh:
//!
//! 1. [`TripletMiner::plan`] draws the random negative samples and tells the
//!    controller which images the cache must cover ([`MiningPlan::pool`]).
//! 2. [`TripletMiner::compute_triplets`] ranks those images by embedding distance
//!    in a given [`CacheSnapshot`] and emits one [`Triplet`] per usable query.

#[cfg(test)]
mod tests;

use std::collections::HashSet;

use rand::Rng;
use rand::seq::index;
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::{CacheSnapshot, squared_l2};
use crate::config::TrainConfig;
use crate::dataset::{DatasetResult, GeoDataset, Query};

#[derive(Debug, Error)]
pub enum MiningError {
    /// The snapshot does not cover an image the plan needs.
    #[error("image {index} is missing from cache snapshot v{version}")]
    NotCached { index: usize, version: u64 },
}

/// A query with its hardest positive and hardest negatives (flat dataset indices).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triplet {
    pub query: usize,
    pub positive: usize,
    /// Ordered hardest first.
    pub negatives: Vec<usize>,
}

/// One scheduled query with its candidate positives and sampled true negatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub query: usize,
    pub positives: Vec<usize>,
    pub neg_samples: Vec<usize>,
}

/// Output of [`TripletMiner::plan`].
#[derive(Debug, Clone, Default)]
pub struct MiningPlan {
    queries: Vec<QueryPlan>,
    without_positive: usize,
}

impl MiningPlan {
    pub fn queries(&self) -> &[QueryPlan] {
        &self.queries
    }

    /// Scheduled queries skipped because no database image lies within the train threshold.
    pub fn without_positive(&self) -> usize {
        self.without_positive
    }

    /// Every image the cache must embed for this plan, deduplicated, in first-seen order.
    pub fn pool(&self) -> Vec<usize> {
        let mut seen = HashSet::new();
        self.queries
            .iter()
            .flat_map(|q| {
                std::iter::once(q.query)
                    .chain(q.positives.iter().copied())
                    .chain(q.neg_samples.iter().copied())
            })
            .filter(|i| seen.insert(*i))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct QueryRecord {
    query: Query,
    /// Database indices within the train threshold.
    train_positives: Vec<usize>,
    /// Database indices within the val threshold, sorted ascending.
    soft_positives: Vec<usize>,
}

/// Selects triplets for the training split.
#[derive(Debug, Clone)]
pub struct TripletMiner {
    records: Vec<QueryRecord>,
    database_len: usize,
    cache_refresh_rate: usize,
    neg_samples_num: usize,
    negs_num_per_query: usize,
}

impl TripletMiner {
    /// Precomputes train and soft positives for every query of `dataset`.
    pub fn new<D: GeoDataset + ?Sized>(dataset: &D, config: &TrainConfig) -> DatasetResult<Self> {
        let geo = dataset.geo_index()?;

        let records = (0..dataset.queries_len())
            .map(|q| {
                let query = dataset.query(q)?;
                let train_positives =
                    geo.within(&query.location, config.train_positives_dist_threshold);
                let mut soft_positives =
                    geo.within(&query.location, config.val_positive_dist_threshold);
                soft_positives.sort_unstable();
                Ok(QueryRecord {
                    query,
                    train_positives,
                    soft_positives,
                })
            })
            .collect::<DatasetResult<Vec<_>>>()?;

        let without = records
            .iter()
            .filter(|r| r.train_positives.is_empty())
            .count();
        info!(
            queries = records.len(),
            without_positive = without,
            database = dataset.database_len(),
            "Triplet miner ready"
        );

        Ok(Self {
            records,
            database_len: dataset.database_len(),
            cache_refresh_rate: config.cache_refresh_rate,
            neg_samples_num: config.neg_samples_num,
            negs_num_per_query: config.negs_num_per_query,
        })
    }

    pub fn queries_len(&self) -> usize {
        self.records.len()
    }

    /// Draws `cache_refresh_rate` distinct query numbers (fewer if the split is smaller).
    pub fn sample_queries<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let amount = self.cache_refresh_rate.min(self.records.len());
        index::sample(rng, self.records.len(), amount).into_vec()
    }

    /// Draws the negative samples of each query and collects the images to cache.
    pub fn plan<R: Rng + ?Sized>(&self, queries: &[usize], rng: &mut R) -> MiningPlan {
        let mut plan = MiningPlan::default();

        for &q in queries {
            let Some(record) = self.records.get(q) else {
                continue;
            };
            if record.train_positives.is_empty() {
                plan.without_positive += 1;
                continue;
            }

            let available = self.database_len - record.soft_positives.len();
            let amount = self.neg_samples_num.min(available);
            let neg_samples = index::sample(rng, available, amount)
                .into_iter()
                .map(|rank| nth_outside(&record.soft_positives, rank))
                .collect();

            plan.queries.push(QueryPlan {
                query: record.query.index,
                positives: record.train_positives.clone(),
                neg_samples,
            });
        }

        plan
    }

    /// Picks the hardest positive and the `negs_num_per_query` hardest negatives per query.
    ///
    /// Queries whose sampled negatives are fewer than `negs_num_per_query` are dropped.
    pub fn compute_triplets(
        &self,
        plan: &MiningPlan,
        snapshot: &CacheSnapshot,
    ) -> Result<Vec<Triplet>, MiningError> {
        let embedding = |index: usize| {
            snapshot.get(index).ok_or(MiningError::NotCached {
                index,
                version: snapshot.version(),
            })
        };

        let mut triplets = Vec::with_capacity(plan.queries.len());
        let mut short_of_negatives = 0usize;

        for qp in &plan.queries {
            if qp.positives.is_empty() {
                continue;
            }
            if qp.neg_samples.len() < self.negs_num_per_query {
                short_of_negatives += 1;
                continue;
            }

            let query = embedding(qp.query)?;

            let mut best_positive: Option<(usize, f32)> = None;
            for &p in &qp.positives {
                let d = squared_l2(query, embedding(p)?);
                if best_positive.is_none_or(|(_, best)| d < best) {
                    best_positive = Some((p, d));
                }
            }
            let Some((positive, _)) = best_positive else {
                continue;
            };

            let mut ranked = qp
                .neg_samples
                .iter()
                .map(|&n| Ok((n, squared_l2(query, embedding(n)?))))
                .collect::<Result<Vec<_>, MiningError>>()?;
            ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

            triplets.push(Triplet {
                query: qp.query,
                positive,
                negatives: ranked
                    .into_iter()
                    .take(self.negs_num_per_query)
                    .map(|(n, _)| n)
                    .collect(),
            });
        }

        if plan.without_positive > 0 || short_of_negatives > 0 {
            debug!(
                without_positive = plan.without_positive,
                short_of_negatives, "Dropped queries while mining"
            );
        }

        Ok(triplets)
    }
}

/// The `rank`-th index of `0..` that is not in `excluded` (sorted ascending).
fn nth_outside(excluded: &[usize], rank: usize) -> usize {
    let mut index = rank;
    for &e in excluded {
        if e <= index {
            index += 1;
        } else {
            break;
        }
    }
    index
}
