//! Interaction records and collections.

use std::cmp::Ordering;
use std::hash::Hasher;

use rand::seq::SliceRandom;
use rand::Rng;
use serde_derive::{Deserialize, Serialize};
use siphasher::sip::SipHasher;

use crate::{ItemId, UserId};

/// Denominator used when mapping a hash stream position to a fraction
/// cutoff.
pub(crate) const STREAM_DENOMINATOR: u64 = 1_000_000;

/// Position of `user_id` on the keyed hash stream identified by
/// (`seed`, `label`).
///
/// Streams with distinct labels are independent, so a decision drawn on
/// one stream (say, the train/rest assignment) does not correlate with a
/// decision drawn on another (the val/test assignment), and no decision
/// depends on the order in which users are visited.
pub(crate) fn user_stream(seed: u64, label: &str, user_id: UserId) -> u64 {
    let mut hasher = SipHasher::new_with_keys(seed, seed.rotate_left(32) ^ 0x9e37_79b9_7f4a_7c15);
    hasher.write(label.as_bytes());
    hasher.write_usize(user_id);
    hasher.finish()
}

pub(crate) fn fraction_cutoff(fraction: f64) -> u64 {
    (fraction * STREAM_DENOMINATOR as f64) as u64
}

/// A single user-item interaction.
///
/// `rating` is absent when the user shelved the item without rating it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    user_id: UserId,
    item_id: ItemId,
    rating: Option<f32>,
    is_read: bool,
    is_reviewed: bool,
}

impl Interaction {
    /// Build a new interaction record.
    pub fn new(
        user_id: UserId,
        item_id: ItemId,
        rating: Option<f32>,
        is_read: bool,
        is_reviewed: bool,
    ) -> Self {
        Interaction {
            user_id,
            item_id,
            rating,
            is_read,
            is_reviewed,
        }
    }

    /// Id of the interacting user.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Id of the item interacted with.
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// Explicit rating, if the user left one.
    pub fn rating(&self) -> Option<f32> {
        self.rating
    }

    /// Whether the user read the item.
    pub fn is_read(&self) -> bool {
        self.is_read
    }

    /// Whether the user reviewed the item.
    pub fn is_reviewed(&self) -> bool {
        self.is_reviewed
    }
}

/// Total order on interactions that does not depend on the order rows
/// were read in: (user, item, rating, flags).
pub(crate) fn cmp_canonical(x: &Interaction, y: &Interaction) -> Ordering {
    let rating_bits = |i: &Interaction| i.rating().map(f32::to_bits).unwrap_or(u32::MAX);

    x.user_id()
        .cmp(&y.user_id())
        .then(x.item_id().cmp(&y.item_id()))
        .then(rating_bits(x).cmp(&rating_bits(y)))
        .then(x.is_read().cmp(&y.is_read()))
        .then(x.is_reviewed().cmp(&y.is_reviewed()))
}

/// A collection of interactions together with the (num_users, num_items)
/// shape of the id space it was drawn from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Interactions {
    num_users: usize,
    num_items: usize,
    interactions: Vec<Interaction>,
}

impl Interactions {
    /// Create an empty collection with the given shape.
    pub fn new(num_users: usize, num_items: usize) -> Self {
        Interactions {
            num_users,
            num_items,
            interactions: Vec::new(),
        }
    }

    pub(crate) fn with_interactions(
        num_users: usize,
        num_items: usize,
        interactions: Vec<Interaction>,
    ) -> Self {
        Interactions {
            num_users,
            num_items,
            interactions,
        }
    }

    /// Append a single interaction.
    pub fn push(&mut self, interaction: Interaction) {
        self.interactions.push(interaction);
    }

    /// The underlying records.
    pub fn data(&self) -> &[Interaction] {
        &self.interactions
    }

    /// Number of interactions.
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Whether the collection holds no interactions.
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Shuffle the rows in place.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        self.interactions.shuffle(rng);
    }

    /// Split into (matching, non-matching) collections, preserving shape.
    pub fn split_by<F: Fn(&Interaction) -> bool>(&self, func: F) -> (Self, Self) {
        let head = Interactions {
            num_users: self.num_users,
            num_items: self.num_items,
            interactions: self
                .interactions
                .iter()
                .filter(|x| func(x))
                .cloned()
                .collect(),
        };
        let tail = Interactions {
            num_users: self.num_users,
            num_items: self.num_items,
            interactions: self
                .interactions
                .iter()
                .filter(|x| !func(x))
                .cloned()
                .collect(),
        };

        (head, tail)
    }

    /// Number of distinct user ids the shape accounts for.
    pub fn num_users(&self) -> usize {
        self.num_users
    }

    /// Number of distinct item ids the shape accounts for.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// (num_users, num_items).
    pub fn shape(&self) -> (usize, usize) {
        (self.num_users, self.num_items)
    }
}

impl From<Vec<Interaction>> for Interactions {
    fn from(data: Vec<Interaction>) -> Interactions {
        let num_users = data.iter().map(|x| x.user_id()).max().map_or(0, |x| x + 1);
        let num_items = data.iter().map(|x| x.item_id()).max().map_or(0, |x| x + 1);

        Interactions {
            num_users,
            num_items,
            interactions: data,
        }
    }
}

/// Keep a `fraction`-sized random subset of users, with all of their
/// interactions, discarding everything else.
///
/// Sampling happens at user granularity: a kept user keeps their full
/// history, so the downsampled set remains a miniature version of the
/// original rather than a sparsified one. The subset is a pure function
/// of (`seed`, user id); row order and the presence of other users do
/// not affect it.
pub fn downsample_users(interactions: &Interactions, fraction: f64, seed: u64) -> Interactions {
    if fraction >= 1.0 {
        return interactions.clone();
    }

    let cutoff = fraction_cutoff(fraction);
    let (kept, _) = interactions.split_by(|x| {
        user_stream(seed, "downsample", x.user_id()) % STREAM_DENOMINATOR < cutoff
    });

    kept
}
