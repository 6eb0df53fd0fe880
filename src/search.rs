//! Hyperparameter grid search over external collaborators.
//!
//! The search iterates a (rank, regularization) grid, obtains a model
//! for each combination from the [`Trainer`] (or from a
//! [`ModelCache`]), fans out top-K predictions for the validation
//! users and hands the (predicted, actual) pairs to the external
//! [`RankingEvaluator`].

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use derive_builder::Builder;
use itertools::iproduct;
use serde_derive::{Deserialize, Serialize};

use crate::data::Interactions;
use crate::evaluation::{self, RankingEvaluator, RankingScores};
use crate::report::{Event, Reporter};
use crate::{ModelParams, Trainer};

/// Configuration of a grid search.
///
/// The defaults reproduce the original experiment grid: ranks
/// {10, 20, 100, 500}, regularization {0.01, 0.1, 1, 10}, 500
/// recommendations per user, relevance above a 3-star rating.
#[derive(Builder, Clone, Debug)]
pub struct SearchConfig {
    /// Latent dimensionalities to try.
    #[builder(default = "vec![10, 20, 100, 500]")]
    ranks: Vec<usize>,
    /// Regularization strengths to try.
    #[builder(default = "vec![0.01, 0.1, 1.0, 10.0]")]
    regularizations: Vec<f64>,
    /// How many recommendations to request per user.
    #[builder(default = "500")]
    k: usize,
    /// Held-out rows rated strictly above this count as relevant.
    #[builder(default = "3.0")]
    min_rating: f32,
}

/// Cache of fitted models keyed by their hyperparameters.
///
/// Stands in for the original pipeline's habit of reloading models from
/// convention-named filesystem paths: the cache key is the parameter
/// set itself, not where a particular run chose to store the artifact.
pub trait ModelCache<M> {
    /// Look up a model fitted with exactly these parameters.
    fn fetch(&self, params: &ModelParams) -> Option<M>;
    /// Remember a fitted model.
    fn store(&self, params: &ModelParams, model: &M);
}

/// A cache that never holds anything.
pub struct NoCache;

impl<M> ModelCache<M> for NoCache {
    fn fetch(&self, _params: &ModelParams) -> Option<M> {
        None
    }

    fn store(&self, _params: &ModelParams, _model: &M) {}
}

/// In-memory parameter-keyed model cache.
pub struct MemoryCache<M> {
    models: RwLock<HashMap<(usize, u64), M>>,
}

impl<M: Clone> MemoryCache<M> {
    /// Create an empty cache.
    pub fn new() -> Self {
        MemoryCache {
            models: RwLock::new(HashMap::new()),
        }
    }
}

impl<M: Clone> Default for MemoryCache<M> {
    fn default() -> Self {
        MemoryCache::new()
    }
}

impl<M: Clone> ModelCache<M> for MemoryCache<M> {
    fn fetch(&self, params: &ModelParams) -> Option<M> {
        self.models.read().unwrap().get(&params.key()).cloned()
    }

    fn store(&self, params: &ModelParams, model: &M) {
        self.models
            .write()
            .unwrap()
            .insert(params.key(), model.clone());
    }
}

/// The outcome of evaluating one grid point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    /// Hyperparameters of the candidate.
    pub params: ModelParams,
    /// Scores returned by the external evaluator.
    pub scores: RankingScores,
    /// Wall-clock time spent obtaining and scoring the model.
    pub elapsed: Duration,
    /// Whether the model came from the cache instead of being fitted.
    pub cached: bool,
}

/// Fit and evaluate every (rank, regularization) combination of the
/// grid.
///
/// Results are returned best first, ordered by mean average precision.
pub fn grid_search<T, E, C, R>(
    train: &Interactions,
    val: &Interactions,
    config: &SearchConfig,
    trainer: &T,
    evaluator: &E,
    cache: &C,
    reporter: &R,
) -> Result<Vec<SearchResult>, failure::Error>
where
    T: Trainer,
    T::Model: Sync,
    E: RankingEvaluator,
    C: ModelCache<T::Model>,
    R: Reporter + ?Sized,
{
    let truth = evaluation::ground_truth(val, config.min_rating);

    let mut results = Vec::with_capacity(config.ranks.len() * config.regularizations.len());

    for (&rank, &regularization) in iproduct!(config.ranks.iter(), config.regularizations.iter()) {
        let params = ModelParams {
            rank,
            regularization,
        };

        let start = Instant::now();
        let (model, cached) = match cache.fetch(&params) {
            Some(model) => (model, true),
            None => {
                reporter.report(&Event::FitStarted {
                    params: params.clone(),
                });
                let model = trainer.fit(train, &params)?;
                cache.store(&params, &model);
                (model, false)
            }
        };
        reporter.report(&Event::FitFinished {
            params: params.clone(),
            elapsed: start.elapsed(),
            cached,
        });

        let pairs = evaluation::prediction_pairs(&model, &truth, config.k)?;
        let scores = evaluator.score(&pairs, config.k);
        reporter.report(&Event::CandidateEvaluated {
            params: params.clone(),
            scores: scores.clone(),
        });

        results.push(SearchResult {
            params,
            scores,
            elapsed: start.elapsed(),
            cached,
        });
    }

    results.sort_by(|a, b| {
        b.scores
            .mean_average_precision
            .partial_cmp(&a.scores.mean_average_precision)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(results)
}
