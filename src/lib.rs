//! # goodsplit
//!
//! `goodsplit` prepares user-item interaction data for offline top-K
//! recommender experiments: it downsamples interactions at user
//! granularity, produces a reproducible grouped train/validation/test
//! partition, and assembles the (predicted, actual) item lists that an
//! external ranking evaluator consumes.
//!
//! Model fitting and metric computation stay behind the [`Trainer`],
//! [`Recommender`] and [`evaluation::RankingEvaluator`] traits; the crate
//! itself only guarantees the partitioning protocol: users (never
//! individual rows) are assigned to a partition, evaluation users have
//! half of their history merged into the training pool, and the whole
//! split is bit-reproducible from a single seed.
//!
//! ## Example
//!
//! ```
//! use goodsplit::data::{Interaction, Interactions};
//! use goodsplit::split::{self, SplitConfigBuilder};
//!
//! let records: Vec<Interaction> = (0..200)
//!     .flat_map(|user_id| {
//!         (0..10).map(move |i| {
//!             Interaction::new(user_id, (user_id + i) % 50, Some(4.0), true, false)
//!         })
//!     })
//!     .collect();
//!
//! let data = Interactions::from(records);
//! let config = SplitConfigBuilder::default()
//!     .seed(42)
//!     .drop_cold_items(false)
//!     .build()
//!     .unwrap();
//! let partitioned = split::user_partition(&data, &config).unwrap();
//!
//! assert_eq!(
//!     partitioned.train.len() + partitioned.val.len() + partitioned.test.len(),
//!     2000
//! );
//! ```

use failure::Fail;
use serde_derive::{Deserialize, Serialize};

pub mod data;
#[cfg(feature = "default")]
pub mod datasets;
pub mod evaluation;
pub mod report;
pub mod search;
pub mod split;

/// Alias for user identifiers.
pub type UserId = usize;
/// Alias for item identifiers.
pub type ItemId = usize;

/// Prediction error types.
#[derive(Debug, Fail)]
pub enum PredictionError {
    /// Failed prediction due to numerical issues.
    #[fail(display = "invalid prediction value: non-finite or not a number")]
    InvalidPredictionValue,
    /// The model has no representation for the requested user.
    #[fail(display = "unknown user: {}", _0)]
    UnknownUser(UserId),
}

/// Hyperparameters identifying a single candidate model.
///
/// Doubles as the key for [`search::ModelCache`], so that a fitted model
/// is reused across search invocations with the same parameters instead
/// of being keyed by filesystem path conventions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Number of latent factors.
    pub rank: usize,
    /// Regularization strength.
    pub regularization: f64,
}

impl ModelParams {
    pub(crate) fn key(&self) -> (usize, u64) {
        (self.rank, self.regularization.to_bits())
    }
}

/// Trait describing fitted models that can produce top-K recommendations
/// for a user seen during training.
pub trait Recommender {
    /// Return up to `k` item ids, best first, for the given user.
    fn recommend(&self, user_id: UserId, k: usize) -> Result<Vec<ItemId>, PredictionError>;
}

/// Trait describing external trainers that fit a scoring model on a
/// training partition.
pub trait Trainer {
    /// The fitted model produced by this trainer.
    type Model: Recommender;
    /// Fit a model on `train` with the given hyperparameters.
    fn fit(
        &self,
        train: &data::Interactions,
        params: &ModelParams,
    ) -> Result<Self::Model, failure::Error>;
}
