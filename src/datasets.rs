//! Loading Goodreads-style interaction data.
use std::fs::{create_dir_all, rename, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use failure::Fail;
use serde_derive::{Deserialize, Serialize};

use crate::data::{Interaction, Interactions};

/// Dataset error types.
#[derive(Debug, Fail)]
pub enum DatasetError {
    /// Can't find the home directory.
    #[fail(display = "cannot find home directory")]
    NoHomeDir,
}

/// One row of the full Goodreads interactions CSV
/// (`user_id, book_id, is_read, rating, is_reviewed`).
#[derive(Debug, Serialize, Deserialize)]
struct InteractionRow {
    user_id: usize,
    book_id: usize,
    is_read: u8,
    rating: Option<f32>,
    is_reviewed: u8,
}

impl From<InteractionRow> for Interaction {
    fn from(row: InteractionRow) -> Interaction {
        // a zero rating means the user shelved the book without rating it
        let rating = row.rating.filter(|&r| r > 0.0);

        Interaction::new(
            row.user_id,
            row.book_id,
            rating,
            row.is_read != 0,
            row.is_reviewed != 0,
        )
    }
}

/// One row of the goodbooks-10k ratings CSV.
#[derive(Debug, Deserialize)]
struct RatingsRow {
    user_id: usize,
    book_id: usize,
    rating: f32,
}

fn create_data_dir() -> Result<PathBuf, failure::Error> {
    let path = dirs::home_dir()
        .ok_or(DatasetError::NoHomeDir)?
        .join(".goodsplit");

    if !path.exists() {
        create_dir_all(&path)?;
    }

    Ok(path)
}

fn download(url: &str, dest_filename: &Path) -> Result<PathBuf, failure::Error> {
    let data_dir = create_data_dir()?;
    let desired_filename = data_dir.join(dest_filename);
    let temp_filename = std::env::temp_dir().join(dest_filename);

    if !desired_filename.exists() {
        let file = File::create(&temp_filename)?;
        let mut writer = BufWriter::new(file);

        let mut response = reqwest::blocking::get(url)?;
        response.copy_to(&mut writer)?;

        rename(temp_filename, &desired_filename)?;
    }

    Ok(desired_filename)
}

/// Read a full-schema Goodreads interactions CSV from `path`.
pub fn load_interactions<P: AsRef<Path>>(path: P) -> Result<Interactions, failure::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    let interactions = reader
        .deserialize::<InteractionRow>()
        .map(|row| row.map(Interaction::from))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Interactions::from(interactions))
}

/// Download the goodbooks-10k ratings and return them as interactions.
///
/// The data is stored in `~/.goodsplit/`. The ratings-only schema has no
/// shelving flags, so every row is marked read and unreviewed.
pub fn download_goodbooks_10k() -> Result<Interactions, failure::Error> {
    let path = download(
        "https://github.com/zygmuntz/goodbooks-10k/raw/master/ratings.csv",
        Path::new("goodbooks_10k_ratings.csv"),
    )?;

    let mut reader = csv::Reader::from_path(path)?;
    let interactions = reader
        .deserialize::<RatingsRow>()
        .map(|row| {
            row.map(|x| Interaction::new(x.user_id, x.book_id, Some(x.rating), true, false))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Interactions::from(interactions))
}
