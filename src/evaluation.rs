//! Ground-truth assembly and prediction fan-out.
//!
//! Ranking metrics themselves (MAP, NDCG@K, precision@K) are computed by
//! an external [`RankingEvaluator`]; this module only builds the
//! per-user (predicted, actual) item-list pairs it consumes.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};

use crate::data::Interactions;
use crate::{ItemId, PredictionError, Recommender, UserId};

/// Ranking metrics produced by an external evaluator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankingScores {
    /// Mean average precision over the evaluated users.
    pub mean_average_precision: f64,
    /// Normalized discounted cumulative gain at K.
    pub ndcg_at_k: f64,
    /// Precision at K.
    pub precision_at_k: f64,
}

/// The predicted and actual item lists for one evaluation user.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictionPair {
    /// The evaluated user.
    pub user_id: UserId,
    /// Top-K recommendations, best first.
    pub predicted: Vec<ItemId>,
    /// The user's relevant held-out items.
    pub actual: Vec<ItemId>,
}

/// Trait describing external ranking-metric evaluators.
pub trait RankingEvaluator {
    /// Score a batch of (predicted, actual) pairs at the given K.
    fn score(&self, pairs: &[PredictionPair], k: usize) -> RankingScores;
}

/// Collect each user's relevant held-out items.
///
/// An item counts as relevant when its rating is strictly greater than
/// `min_rating`; unrated rows never count. Users without a single
/// relevant item are omitted. The result is sorted by user id.
pub fn ground_truth(held_out: &Interactions, min_rating: f32) -> Vec<(UserId, Vec<ItemId>)> {
    let mut by_user: BTreeMap<UserId, Vec<ItemId>> = BTreeMap::new();

    for interaction in held_out.data() {
        if interaction.rating().map_or(false, |r| r > min_rating) {
            by_user
                .entry(interaction.user_id())
                .or_insert_with(Vec::new)
                .push(interaction.item_id());
        }
    }

    by_user.into_iter().collect()
}

/// Pair every ground-truth user's relevant items with the model's top-K
/// recommendations for them.
///
/// Users are scored in parallel; the output preserves the input order.
pub fn prediction_pairs<M>(
    model: &M,
    truth: &[(UserId, Vec<ItemId>)],
    k: usize,
) -> Result<Vec<PredictionPair>, PredictionError>
where
    M: Recommender + Sync,
{
    truth
        .par_iter()
        .map(|(user_id, actual)| {
            let predicted = model.recommend(*user_id, k)?;

            Ok(PredictionPair {
                user_id: *user_id,
                predicted,
                actual: actual.clone(),
            })
        })
        .collect()
}
