//! Checkpoint reporting.
//!
//! The partitioner and the grid search announce their progress through an
//! injectable [`Reporter`] instead of writing to a results file, so the
//! core logic stays decoupled from any particular sink. [`LogReporter`]
//! forwards checkpoints to `tracing`; [`NullReporter`] discards them.

use std::time::Duration;

use crate::evaluation::RankingScores;
use crate::{ModelParams, UserId};

/// A checkpoint emitted by the partitioner or the grid search.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// The user-to-partition assignment has been computed.
    UsersAssigned {
        /// Users whose full history goes to the training set.
        train_users: usize,
        /// Users assigned to the validation role.
        val_users: usize,
        /// Users assigned to the test role.
        test_users: usize,
        /// Evaluation users excluded for having too few interactions.
        dropped_users: usize,
    },
    /// A user with a single interaction could not be halved; the
    /// interaction was kept in the training pool.
    DegenerateUser {
        /// The affected user.
        user_id: UserId,
    },
    /// An evaluation user fell below the minimum interaction count and
    /// contributes no held-out rows.
    EvaluationUserDropped {
        /// The affected user.
        user_id: UserId,
        /// How many interactions the user had.
        interactions: usize,
    },
    /// Held-out rows referring to items never observed in training were
    /// removed.
    ColdItemsRemoved {
        /// Number of rows removed across val and test.
        rows: usize,
    },
    /// The partition is complete.
    PartitionFinished {
        /// Rows in the training set.
        train: usize,
        /// Held-out rows in the validation set.
        val: usize,
        /// Held-out rows in the test set.
        test: usize,
    },
    /// A model fit is about to start.
    FitStarted {
        /// Hyperparameters of the candidate.
        params: ModelParams,
    },
    /// A model is ready, either freshly fitted or taken from the cache.
    FitFinished {
        /// Hyperparameters of the candidate.
        params: ModelParams,
        /// Wall-clock time spent obtaining the model.
        elapsed: Duration,
        /// Whether the model came from the cache.
        cached: bool,
    },
    /// A candidate has been scored by the external evaluator.
    CandidateEvaluated {
        /// Hyperparameters of the candidate.
        params: ModelParams,
        /// Scores returned by the evaluator.
        scores: RankingScores,
    },
}

/// Observer for pipeline checkpoints.
pub trait Reporter {
    /// Called once per checkpoint, in order.
    fn report(&self, event: &Event);
}

/// Reporter forwarding every checkpoint to `tracing`.
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, event: &Event) {
        match event {
            Event::UsersAssigned {
                train_users,
                val_users,
                test_users,
                dropped_users,
            } => tracing::info!(
                train_users,
                val_users,
                test_users,
                dropped_users,
                "assigned users to partitions"
            ),
            Event::DegenerateUser { user_id } => tracing::warn!(
                user_id,
                "user has a single interaction and cannot be halved; keeping it in train"
            ),
            Event::EvaluationUserDropped {
                user_id,
                interactions,
            } => tracing::debug!(user_id, interactions, "dropped user from evaluation"),
            Event::ColdItemsRemoved { rows } => {
                tracing::info!(rows, "removed held-out rows for cold items")
            }
            Event::PartitionFinished { train, val, test } => {
                tracing::info!(train, val, test, "partitioning finished")
            }
            Event::FitStarted { params } => {
                tracing::info!(rank = params.rank, regularization = params.regularization, "fitting model")
            }
            Event::FitFinished {
                params,
                elapsed,
                cached,
            } => tracing::info!(
                rank = params.rank,
                regularization = params.regularization,
                elapsed_ms = elapsed.as_millis() as u64,
                cached,
                "model ready"
            ),
            Event::CandidateEvaluated { params, scores } => tracing::info!(
                rank = params.rank,
                regularization = params.regularization,
                map = scores.mean_average_precision,
                ndcg_at_k = scores.ndcg_at_k,
                precision_at_k = scores.precision_at_k,
                "candidate evaluated"
            ),
        }
    }
}

/// Reporter that discards every checkpoint.
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _event: &Event) {}
}
