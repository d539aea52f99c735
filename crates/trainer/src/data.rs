use std::path::Path;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// One labeled row of the training CSV. Other columns are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub content: String,
    pub sentiment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentiment {
    Neutral,
    Positive,
    Negative,
}

impl Sentiment {
    pub const COUNT: usize = 3;

    /// `positive` and `neutral` are matched exactly; every other label is
    /// treated as negative.
    pub fn from_label(label: &str) -> Self {
        match label {
            "positive" => Sentiment::Positive,
            "neutral" => Sentiment::Neutral,
            _ => Sentiment::Negative,
        }
    }

    pub fn class_id(self) -> i64 {
        match self {
            Sentiment::Neutral => 0,
            Sentiment::Positive => 1,
            Sentiment::Negative => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Sentiment::Neutral => "neutral",
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
        }
    }

    pub fn from_class_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(Sentiment::Neutral),
            1 => Some(Sentiment::Positive),
            2 => Some(Sentiment::Negative),
            _ => None,
        }
    }
}

impl Review {
    pub fn label(&self) -> Sentiment {
        Sentiment::from_label(&self.sentiment)
    }
}

pub fn load_reviews<P: AsRef<Path>>(path: P) -> Result<Vec<Review>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open dataset {:?}", path))?;

    let mut reviews = Vec::new();
    for (i, record) in reader.deserialize::<Review>().enumerate() {
        // +2: one for the header, one for 1-based line numbers.
        let review: Review =
            record.with_context(|| format!("Malformed row at line {} of {:?}", i + 2, path))?;
        reviews.push(review);
    }
    Ok(reviews)
}

/// Seeded shuffle, then holds out `ceil(test_size * n)` rows for validation.
/// Returns `(train, valid)`.
pub fn train_test_split<T>(mut rows: Vec<T>, test_size: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let total = rows.len();
    let n_test = ((total as f64) * test_size).ceil() as usize;
    let n_train = total - n_test.min(total);

    let mut rng = StdRng::seed_from_u64(seed);
    rows.shuffle(&mut rng);
    let valid = rows.split_off(n_train);

    log::debug!("Dataset split: {} training, {} validation", rows.len(), valid.len());
    (rows, valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn label_mapping() {
        assert_eq!(Sentiment::from_label("positive").class_id(), 1);
        assert_eq!(Sentiment::from_label("neutral").class_id(), 0);
        assert_eq!(Sentiment::from_label("negative").class_id(), 2);
        assert_eq!(Sentiment::from_label("Positive"), Sentiment::Negative);
        assert_eq!(Sentiment::from_class_id(1), Some(Sentiment::Positive));
        assert_eq!(Sentiment::from_class_id(3), None);
        assert_eq!(Sentiment::from_class_id(2).map(Sentiment::name), Some("negative"));
    }

    #[test]
    fn split_sizes_round_test_up() {
        let (train, valid) = train_test_split((0..101).collect::<Vec<_>>(), 0.2, 42);
        assert_eq!(valid.len(), 21);
        assert_eq!(train.len(), 80);

        let (train, valid) = train_test_split((0..10).collect::<Vec<_>>(), 0.2, 42);
        assert_eq!((train.len(), valid.len()), (8, 2));
    }

    #[test]
    fn split_is_deterministic_and_lossless() {
        let rows: Vec<usize> = (0..50).collect();
        let a = train_test_split(rows.clone(), 0.2, 7);
        let b = train_test_split(rows.clone(), 0.2, 7);
        assert_eq!(a, b);

        let mut all: Vec<usize> = a.0.into_iter().chain(a.1).collect();
        all.sort();
        assert_eq!(all, rows);
    }

    #[test]
    fn empty_split() {
        let (train, valid) = train_test_split(Vec::<u8>::new(), 0.2, 42);
        assert!(train.is_empty() && valid.is_empty());
    }

    #[test]
    fn reads_csv_ignoring_extra_columns() {
        let path = std::env::temp_dir().join(format!("reviews_{}.csv", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "id,content,sentiment").unwrap();
        writeln!(file, "1,\"Great film, really\",positive").unwrap();
        writeln!(file, "2,meh,neutral").unwrap();
        drop(file);

        let reviews = load_reviews(&path).unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].content, "Great film, really");
        assert_eq!(reviews[1].label(), Sentiment::Neutral);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_reviews("no/such/train.csv").is_err());
    }
}
