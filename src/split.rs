//! Grouped train/validation/test partitioning.
//!
//! Users, not individual interactions, are the unit of random assignment:
//! a user's whole history moves together, which keeps one user's
//! behaviour from leaking across partitions. Evaluation (val/test) users
//! additionally have half of their history merged into the training pool
//! so the model has something to build their representation from, while
//! the other half stays secret for scoring.
//!
//! Every random decision is drawn from an independent keyed hash stream
//! derived from the configured seed, the decision label and the user id,
//! so the partition is a pure function of (input set, seed): reordering
//! the input rows, or adding and removing unrelated users, cannot change
//! the outcome for a given user.

use std::collections::{BTreeMap, HashSet};

use derive_builder::Builder;
use failure::Fail;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use serde_derive::{Deserialize, Serialize};

use crate::data::{self, Interaction, Interactions};
use crate::report::{Event, LogReporter, Reporter};
use crate::{ItemId, UserId};

const TRAIN_STREAM: &str = "partition/train";
const VAL_STREAM: &str = "partition/val";
const HALF_SPLIT_STREAM: &str = "partition/half-split";

/// Partitioning error types.
#[derive(Debug, Fail)]
pub enum SplitError {
    /// Malformed fraction or threshold configuration.
    #[fail(display = "invalid partitioning configuration: {}", _0)]
    InvalidConfig(String),
    /// No interactions were supplied.
    #[fail(display = "no interactions supplied")]
    EmptyInput,
}

/// Configuration of a partitioning run.
///
/// Build one with [`SplitConfigBuilder`]; the defaults reproduce the
/// standard 60/20/20 protocol with a minimum of 10 interactions per
/// evaluation user and cold-item exclusion enabled.
#[derive(Builder, Clone, Debug, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of users assigned to the training set.
    #[builder(default = "0.6")]
    train_fraction: f64,
    /// Fraction of users assigned to the validation set. The test set
    /// receives the remainder.
    #[builder(default = "0.2")]
    val_fraction: f64,
    /// Seed for all random decisions.
    #[builder(default = "42")]
    seed: u64,
    /// Evaluation users with fewer interactions than this contribute no
    /// held-out rows. Zero disables the filter.
    #[builder(default = "10")]
    min_user_interactions: usize,
    /// Remove held-out rows whose item never appears in the final
    /// training set.
    #[builder(default = "true")]
    drop_cold_items: bool,
}

impl SplitConfig {
    fn validate(&self) -> Result<(), SplitError> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(SplitError::InvalidConfig(format!(
                "train_fraction must lie in (0, 1), got {}",
                self.train_fraction
            )));
        }
        if !(self.val_fraction > 0.0 && self.val_fraction < 1.0) {
            return Err(SplitError::InvalidConfig(format!(
                "val_fraction must lie in (0, 1), got {}",
                self.val_fraction
            )));
        }
        if self.train_fraction + self.val_fraction >= 1.0 {
            return Err(SplitError::InvalidConfig(format!(
                "train_fraction + val_fraction must leave room for the test set, got {}",
                self.train_fraction + self.val_fraction
            )));
        }

        Ok(())
    }
}

/// The final (train, val, test) triple.
///
/// `train` holds the full history of train-assigned users plus the
/// visible halves of every evaluation user; `val` and `test` hold only
/// held-out rows.
#[derive(Clone, Debug)]
pub struct PartitionedDataset {
    /// Training interactions.
    pub train: Interactions,
    /// Held-out validation interactions.
    pub val: Interactions,
    /// Held-out test interactions.
    pub test: Interactions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Assignment {
    Train,
    Val,
    Test,
}

fn assign(config: &SplitConfig, user_id: UserId) -> Assignment {
    let train_position =
        data::user_stream(config.seed, TRAIN_STREAM, user_id) % data::STREAM_DENOMINATOR;
    if train_position < data::fraction_cutoff(config.train_fraction) {
        return Assignment::Train;
    }

    // Among the users left over after the train draw, the val share is
    // val_fraction of the whole rescaled to the remainder.
    let val_share = config.val_fraction / (1.0 - config.train_fraction);
    let val_position =
        data::user_stream(config.seed, VAL_STREAM, user_id) % data::STREAM_DENOMINATOR;
    if val_position < data::fraction_cutoff(val_share) {
        Assignment::Val
    } else {
        Assignment::Test
    }
}

/// Split one evaluation user's rows into (visible, held_out).
///
/// Rows are put into a canonical order first so the outcome cannot depend
/// on the order they were read in, then shuffled with a generator seeded
/// from the user's own hash stream. The held-out side receives the
/// ceiling of an odd count, biasing toward a harder evaluation.
fn half_split(
    seed: u64,
    user_id: UserId,
    rows: &[Interaction],
) -> (Vec<Interaction>, Vec<Interaction>) {
    let mut visible = rows.to_owned();
    visible.sort_by(data::cmp_canonical);

    let mut rng = XorShiftRng::seed_from_u64(data::user_stream(seed, HALF_SPLIT_STREAM, user_id));
    visible.shuffle(&mut rng);

    let held_out = visible.split_off(visible.len() / 2);

    (visible, held_out)
}

/// Partition `interactions` into (train, val, test), reporting
/// checkpoints to `tracing`.
///
/// See [`user_partition_with`] for the full contract.
pub fn user_partition(
    interactions: &Interactions,
    config: &SplitConfig,
) -> Result<PartitionedDataset, SplitError> {
    user_partition_with(interactions, config, &LogReporter)
}

/// Partition `interactions` into (train, val, test) with an explicit
/// checkpoint reporter.
///
/// The protocol, in order:
///
/// 1. every distinct user is assigned to train, val or test on
///    independent hash streams keyed by the seed;
/// 2. train users contribute their full history to the training set;
/// 3. every val/test user's history is split in half: the visible half
///    joins the training set, the held-out half (the larger one for odd
///    counts) stays in that user's partition;
/// 4. evaluation users with fewer than the configured minimum number of
///    interactions have their held-out rows discarded, their visible
///    rows staying in the training set;
/// 5. optionally, held-out rows whose item never occurs in the final
///    training set are removed.
///
/// A user with a single interaction cannot be halved; their one row goes
/// to the training set and a [`Event::DegenerateUser`] checkpoint is
/// emitted.
///
/// The returned collections are sorted canonically, so two invocations
/// with the same seed produce identical outputs whatever the input row
/// order.
pub fn user_partition_with<R: Reporter + ?Sized>(
    interactions: &Interactions,
    config: &SplitConfig,
    reporter: &R,
) -> Result<PartitionedDataset, SplitError> {
    config.validate()?;

    if interactions.is_empty() {
        return Err(SplitError::EmptyInput);
    }

    let mut by_user: BTreeMap<UserId, Vec<Interaction>> = BTreeMap::new();
    for interaction in interactions.data() {
        by_user
            .entry(interaction.user_id())
            .or_insert_with(Vec::new)
            .push(interaction.clone());
    }

    let mut train = Vec::with_capacity(interactions.len());
    let mut val = Vec::new();
    let mut test = Vec::new();

    let (mut train_users, mut val_users, mut test_users) = (0, 0, 0);
    let mut dropped_users = 0;

    for (&user_id, rows) in &by_user {
        let assignment = assign(config, user_id);

        match assignment {
            Assignment::Train => {
                train_users += 1;
                train.extend_from_slice(rows);
            }
            Assignment::Val | Assignment::Test => {
                if assignment == Assignment::Val {
                    val_users += 1;
                } else {
                    test_users += 1;
                }

                if rows.len() == 1 {
                    reporter.report(&Event::DegenerateUser { user_id });
                    train.extend_from_slice(rows);
                    continue;
                }

                let (visible, held_out) = half_split(config.seed, user_id, rows);
                train.extend(visible);

                if config.min_user_interactions > 0 && rows.len() < config.min_user_interactions {
                    // The held-out rows are discarded outright; the
                    // visible rows above stay in the training set.
                    dropped_users += 1;
                    reporter.report(&Event::EvaluationUserDropped {
                        user_id,
                        interactions: rows.len(),
                    });
                } else if assignment == Assignment::Val {
                    val.extend(held_out);
                } else {
                    test.extend(held_out);
                }
            }
        }
    }

    reporter.report(&Event::UsersAssigned {
        train_users,
        val_users,
        test_users,
        dropped_users,
    });

    if config.drop_cold_items {
        let observed: HashSet<ItemId> = train.iter().map(|x| x.item_id()).collect();
        let before = val.len() + test.len();

        val.retain(|x| observed.contains(&x.item_id()));
        test.retain(|x| observed.contains(&x.item_id()));

        reporter.report(&Event::ColdItemsRemoved {
            rows: before - (val.len() + test.len()),
        });
    }

    // Canonical output order makes the partition reproducible down to the
    // byte, independently of input row order.
    train.sort_by(data::cmp_canonical);
    val.sort_by(data::cmp_canonical);
    test.sort_by(data::cmp_canonical);

    reporter.report(&Event::PartitionFinished {
        train: train.len(),
        val: val.len(),
        test: test.len(),
    });

    let (num_users, num_items) = interactions.shape();

    Ok(PartitionedDataset {
        train: Interactions::with_interactions(num_users, num_items, train),
        val: Interactions::with_interactions(num_users, num_items, val),
        test: Interactions::with_interactions(num_users, num_items, test),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use super::*;

    struct RecordingReporter {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingReporter {
        fn new() -> Self {
            RecordingReporter {
                events: Mutex::new(Vec::new()),
            }
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Reporter for RecordingReporter {
        fn report(&self, event: &Event) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn fixture(num_users: usize, per_user: usize) -> Interactions {
        // item ids are drawn from a small shared pool so that no item is
        // cold, but remain distinct within a single user
        let records: Vec<Interaction> = (0..num_users)
            .flat_map(|user_id| {
                (0..per_user).map(move |i| {
                    Interaction::new(
                        user_id,
                        (user_id + i * 7) % 199,
                        Some(((i % 5) + 1) as f32),
                        true,
                        i % 2 == 0,
                    )
                })
            })
            .collect();

        Interactions::from(records)
    }

    fn config(min_user_interactions: usize, drop_cold_items: bool) -> SplitConfig {
        SplitConfigBuilder::default()
            .seed(42)
            .min_user_interactions(min_user_interactions)
            .drop_cold_items(drop_cold_items)
            .build()
            .unwrap()
    }

    fn rows_of<'a>(data: &'a Interactions, user_id: UserId) -> Vec<&'a Interaction> {
        data.data()
            .iter()
            .filter(|x| x.user_id() == user_id)
            .collect()
    }

    #[test]
    fn every_row_is_accounted_for_without_filtering() {
        let data = fixture(500, 10);
        let split = user_partition(&data, &config(0, false)).unwrap();

        assert_eq!(
            split.train.len() + split.val.len() + split.test.len(),
            data.len()
        );
    }

    #[test]
    fn identical_seeds_give_identical_partitions_whatever_the_row_order() {
        let data = fixture(300, 8);
        let mut shuffled = data.clone();
        shuffled.shuffle(&mut XorShiftRng::seed_from_u64(1234));

        let first = user_partition(&data, &config(0, false)).unwrap();
        let second = user_partition(&shuffled, &config(0, false)).unwrap();

        assert_eq!(first.train.data(), second.train.data());
        assert_eq!(first.val.data(), second.val.data());
        assert_eq!(first.test.data(), second.test.data());
    }

    #[test]
    fn different_seeds_give_different_partitions() {
        let data = fixture(300, 8);

        let first = user_partition(&data, &config(0, false)).unwrap();
        let second = user_partition(
            &data,
            &SplitConfigBuilder::default()
                .seed(43)
                .min_user_interactions(0)
                .drop_cold_items(false)
                .build()
                .unwrap(),
        )
        .unwrap();

        assert_ne!(first.train.data(), second.train.data());
    }

    #[test]
    fn assignment_ratios_approximate_configured_fractions() {
        let config = config(0, false);

        let assignments: Vec<Assignment> = (0..10_000).map(|u| assign(&config, u)).collect();
        let count =
            |wanted: Assignment| assignments.iter().filter(|&&a| a == wanted).count() as i64;

        // 60/20/20 within +-3% of the user population
        assert!((count(Assignment::Train) - 6_000).abs() < 300);
        assert!((count(Assignment::Val) - 2_000).abs() < 300);
        assert!((count(Assignment::Test) - 2_000).abs() < 300);
    }

    #[test]
    fn evaluation_users_are_halved_exactly() {
        let data = fixture(400, 10);
        let split = user_partition(&data, &config(10, false)).unwrap();

        let val_users: HashSet<UserId> =
            split.val.data().iter().map(|x| x.user_id()).collect();
        assert!(!val_users.is_empty());

        for &user_id in &val_users {
            let held_out = rows_of(&split.val, user_id);
            let visible = rows_of(&split.train, user_id);

            assert_eq!(held_out.len(), 5);
            assert_eq!(visible.len(), 5);

            let held_items: HashSet<usize> = held_out.iter().map(|x| x.item_id()).collect();
            let visible_items: HashSet<usize> = visible.iter().map(|x| x.item_id()).collect();
            let original_items: HashSet<usize> = rows_of(&data, user_id)
                .iter()
                .map(|x| x.item_id())
                .collect();

            assert!(held_items.is_disjoint(&visible_items));
            assert_eq!(
                held_items.union(&visible_items).cloned().collect::<HashSet<_>>(),
                original_items
            );
        }
    }

    #[test]
    fn odd_histories_put_the_extra_row_in_the_held_out_half() {
        let data = fixture(400, 3);
        let split = user_partition(&data, &config(0, false)).unwrap();

        let eval_users: HashSet<UserId> = split
            .val
            .data()
            .iter()
            .chain(split.test.data().iter())
            .map(|x| x.user_id())
            .collect();
        assert!(!eval_users.is_empty());

        for &user_id in &eval_users {
            let held_out = rows_of(&split.val, user_id).len() + rows_of(&split.test, user_id).len();
            let visible = rows_of(&split.train, user_id).len();

            assert_eq!(held_out, 2);
            assert_eq!(visible, 1);
        }
    }

    #[test]
    fn users_below_the_interaction_threshold_contribute_no_held_out_rows() {
        // 3 interactions per user, threshold of 10: every evaluation
        // user keeps 1 visible row in train and loses the 2 held-out ones
        let data = fixture(200, 3);
        let config = config(10, false);

        let split = user_partition(&data, &config).unwrap();

        assert_eq!(split.val.len(), 0);
        assert_eq!(split.test.len(), 0);

        let train_assigned = (0..200)
            .filter(|&u| assign(&config, u) == Assignment::Train)
            .count();
        assert_eq!(split.train.len(), train_assigned * 3 + (200 - train_assigned));
    }

    #[test]
    fn single_interaction_users_end_up_in_train() {
        let config = config(10, false);
        let val_user = (0..)
            .find(|&u| assign(&config, u) == Assignment::Val)
            .unwrap();
        let train_user = (0..)
            .find(|&u| assign(&config, u) == Assignment::Train)
            .unwrap();

        let data = Interactions::from(vec![
            Interaction::new(val_user, 1, Some(5.0), true, false),
            Interaction::new(train_user, 1, Some(3.0), true, false),
            Interaction::new(train_user, 2, Some(4.0), true, false),
        ]);

        let reporter = RecordingReporter::new();
        let split = user_partition_with(&data, &config, &reporter).unwrap();

        assert_eq!(split.val.len(), 0);
        assert_eq!(rows_of(&split.train, val_user).len(), 1);
        assert!(reporter
            .events()
            .contains(&Event::DegenerateUser { user_id: val_user }));
    }

    #[test]
    fn cold_items_are_excluded_only_when_configured() {
        let keep_cold = config(0, false);
        let drop_cold = config(0, true);

        let val_user = (0..)
            .find(|&u| assign(&keep_cold, u) == Assignment::Val)
            .unwrap();
        let train_users: Vec<UserId> = (0..)
            .filter(|&u| assign(&keep_cold, u) == Assignment::Train)
            .take(5)
            .collect();

        // the val user's items occur nowhere else, so their held-out half
        // is cold by construction
        let mut records: Vec<Interaction> = (0..4)
            .map(|i| Interaction::new(val_user, 1_000 + i, Some(5.0), true, false))
            .collect();
        for &user_id in &train_users {
            records.push(Interaction::new(user_id, 1, Some(4.0), true, false));
            records.push(Interaction::new(user_id, 2, Some(3.0), true, false));
        }
        let data = Interactions::from(records);

        let kept = user_partition(&data, &keep_cold).unwrap();
        assert_eq!(kept.val.len(), 2);
        assert!(kept
            .val
            .data()
            .iter()
            .all(|x| x.user_id() == val_user && x.item_id() >= 1_000));

        let dropped = user_partition(&data, &drop_cold).unwrap();
        assert_eq!(dropped.val.len(), 0);
        // the visible half stays in train either way
        assert_eq!(rows_of(&dropped.train, val_user).len(), 2);
    }

    #[test]
    fn held_out_users_never_span_partitions() {
        let data = fixture(400, 10);
        let split = user_partition(&data, &config(0, false)).unwrap();

        let val_users: HashSet<UserId> =
            split.val.data().iter().map(|x| x.user_id()).collect();
        let test_users: HashSet<UserId> =
            split.test.data().iter().map(|x| x.user_id()).collect();

        assert!(!val_users.is_empty());
        assert!(!test_users.is_empty());
        assert!(val_users.is_disjoint(&test_users));
    }

    #[test]
    fn empty_input_is_rejected() {
        let data = Interactions::from(Vec::new());

        match user_partition(&data, &config(0, false)) {
            Err(SplitError::EmptyInput) => {}
            other => panic!("expected EmptyInput, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn malformed_fractions_are_rejected() {
        let data = fixture(10, 10);

        for (train_fraction, val_fraction) in
            &[(0.0, 0.2), (1.0, 0.2), (0.6, 0.0), (0.6, 0.4), (0.8, 0.3)]
        {
            let config = SplitConfigBuilder::default()
                .train_fraction(*train_fraction)
                .val_fraction(*val_fraction)
                .build()
                .unwrap();

            match user_partition(&data, &config) {
                Err(SplitError::InvalidConfig(_)) => {}
                other => panic!(
                    "expected InvalidConfig for ({}, {}), got {:?}",
                    train_fraction,
                    val_fraction,
                    other.map(|_| ())
                ),
            }
        }
    }

    #[test]
    fn reporter_receives_the_documented_checkpoints() {
        let data = fixture(100, 10);
        let reporter = RecordingReporter::new();

        user_partition_with(&data, &config(10, true), &reporter).unwrap();

        let events = reporter.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::UsersAssigned { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::ColdItemsRemoved { .. })));
        assert!(matches!(
            events.last(),
            Some(Event::PartitionFinished { .. })
        ));
    }
}
