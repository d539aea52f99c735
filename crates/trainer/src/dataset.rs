use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tch::{Device, Tensor};
use tokenizer::{BertTokenizer, PaddedEncoding};

use crate::data::Review;

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedReview {
    pub encoding: PaddedEncoding,
    pub label: i64,
}

/// Reviews tokenized once up front, each padded to `max_len`.
pub struct SentimentDataset {
    records: Vec<EncodedReview>,
    max_len: usize,
}

impl SentimentDataset {
    pub fn new(reviews: &[Review], tokenizer: &BertTokenizer, max_len: usize) -> Result<Self> {
        let records = reviews
            .iter()
            .enumerate()
            .map(|(i, review)| {
                let encoding = tokenizer
                    .encode_plus(&review.content, max_len)
                    .with_context(|| format!("Failed to tokenize row {}", i))?;
                Ok(EncodedReview {
                    encoding,
                    label: review.label().class_id(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { records, max_len })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn get(&self, index: usize) -> Option<&EncodedReview> {
        self.records.get(index)
    }
}

/// Tensors for one batch, already on the training device.
/// ids / mask / token_type_ids: [batch, max_len]; labels: [batch]
pub struct Batch {
    pub ids: Tensor,
    pub mask: Tensor,
    pub token_type_ids: Tensor,
    pub labels: Tensor,
}

impl Batch {
    pub fn from_records(records: &[&EncodedReview], max_len: usize, device: Device) -> Self {
        let batch_size = records.len();
        let mut ids = Vec::with_capacity(batch_size * max_len);
        let mut mask = Vec::with_capacity(batch_size * max_len);
        let mut token_type_ids = Vec::with_capacity(batch_size * max_len);
        let mut labels = Vec::with_capacity(batch_size);

        for record in records {
            ids.extend_from_slice(&record.encoding.ids);
            mask.extend_from_slice(&record.encoding.attention_mask);
            token_type_ids.extend_from_slice(&record.encoding.token_type_ids);
            labels.push(record.label);
        }

        let shape = [batch_size as i64, max_len as i64];
        Self {
            ids: Tensor::from_slice(&ids).view(shape).to(device),
            mask: Tensor::from_slice(&mask).view(shape).to(device),
            token_type_ids: Tensor::from_slice(&token_type_ids).view(shape).to(device),
            labels: Tensor::from_slice(&labels).to(device),
        }
    }

    pub fn size(&self) -> i64 {
        self.labels.size()[0]
    }
}

/// Walks a dataset in batches, either in order or reshuffled every epoch.
pub struct DataLoader<'a> {
    dataset: &'a SentimentDataset,
    batch_size: usize,
    device: Device,
    rng: Option<StdRng>,
}

impl<'a> DataLoader<'a> {
    pub fn sequential(dataset: &'a SentimentDataset, batch_size: usize, device: Device) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            device,
            rng: None,
        }
    }

    pub fn shuffled(dataset: &'a SentimentDataset, batch_size: usize, device: Device, seed: u64) -> Self {
        Self {
            rng: Some(StdRng::seed_from_u64(seed)),
            ..Self::sequential(dataset, batch_size, device)
        }
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Batches per epoch; the last one may be short.
    pub fn num_batches(&self) -> usize {
        (self.dataset.len() + self.batch_size - 1) / self.batch_size
    }

    /// Starts a new pass over the data.
    pub fn epoch(&mut self) -> Batches<'a> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if let Some(rng) = self.rng.as_mut() {
            order.shuffle(rng);
        }
        Batches {
            dataset: self.dataset,
            order,
            batch_size: self.batch_size,
            device: self.device,
            position: 0,
        }
    }
}

pub struct Batches<'a> {
    dataset: &'a SentimentDataset,
    order: Vec<usize>,
    batch_size: usize,
    device: Device,
    position: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.position >= self.order.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.order.len());
        let records: Vec<&EncodedReview> = self.order[self.position..end]
            .iter()
            .map(|&i| &self.dataset.records[i])
            .collect();
        self.position = end;

        Some(Batch::from_records(&records, self.dataset.max_len, self.device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../../../testdata/tokenizer.json");

    fn review(content: &str, sentiment: &str) -> Review {
        Review {
            content: content.to_string(),
            sentiment: sentiment.to_string(),
        }
    }

    fn dataset(n: usize) -> SentimentDataset {
        let tokenizer = BertTokenizer::from_json(FIXTURE).unwrap().with_lowercase(true);
        let reviews: Vec<Review> = (0..n)
            .map(|i| match i % 3 {
                0 => review("I love this movie", "positive"),
                1 => review("the film is ok", "neutral"),
                _ => review("I hate it", "negative"),
            })
            .collect();
        SentimentDataset::new(&reviews, &tokenizer, 8).unwrap()
    }

    #[test]
    fn encodes_every_row_with_labels() {
        let ds = dataset(3);
        assert_eq!(ds.len(), 3);
        let first = ds.get(0).unwrap();
        assert_eq!(first.encoding.ids, vec![2, 5, 6, 7, 8, 3, 0, 0]);
        assert_eq!(first.label, 1);
        assert_eq!(ds.get(1).unwrap().label, 0);
        assert_eq!(ds.get(2).unwrap().label, 2);
        assert!(ds.get(3).is_none());
    }

    #[test]
    fn sequential_batches_keep_order_and_short_tail() {
        let ds = dataset(7);
        let mut loader = DataLoader::sequential(&ds, 3, Device::Cpu);
        assert_eq!(loader.num_batches(), 3);

        let batches: Vec<Batch> = loader.epoch().collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].ids.size(), vec![3, 8]);
        assert_eq!(batches[2].size(), 1);
        assert_eq!(Vec::<i64>::try_from(&batches[0].labels).unwrap(), vec![1, 0, 2]);
        assert_eq!(batches[0].mask.sum(tch::Kind::Int64).int64_value(&[]), 6 + 6 + 5);
    }

    #[test]
    fn shuffled_loader_covers_every_row_once() {
        let ds = dataset(10);
        let mut loader = DataLoader::shuffled(&ds, 4, Device::Cpu, 42);

        let first: Vec<i64> = loader
            .epoch()
            .flat_map(|b| Vec::<i64>::try_from(&b.labels).unwrap())
            .collect();
        assert_eq!(first.len(), 10);
        assert_eq!(first.iter().filter(|&&l| l == 1).count(), 4);
        assert_eq!(first.iter().filter(|&&l| l == 0).count(), 3);
        assert_eq!(first.iter().filter(|&&l| l == 2).count(), 3);
    }

    #[test]
    fn shuffling_is_reproducible_per_seed() {
        let ds = dataset(12);
        let order = |seed| {
            let mut loader = DataLoader::shuffled(&ds, 12, Device::Cpu, seed);
            let batch = loader.epoch().next().unwrap();
            Vec::<i64>::try_from(&batch.ids.select(1, 1)).unwrap()
        };
        assert_eq!(order(3), order(3));
    }
}
