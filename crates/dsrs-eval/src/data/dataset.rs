use std::collections::HashSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Example;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("{count} example(s) appear in both the training and validation splits")]
    Overlap { count: usize },

    #[error("train fraction must be within (0, 1), got {fraction}")]
    InvalidFraction { fraction: f32 },

    #[error("failed to read dataset file")]
    Io(#[from] std::io::Error),

    #[error("failed to decode JSON dataset")]
    Json(#[from] serde_json::Error),

    #[error("failed to decode CSV dataset")]
    Csv(#[from] csv::Error),

    #[error("CSV row {row} has no value for column `{column}`")]
    MissingColumn { row: usize, column: String },
}

/// Labeled examples partitioned into training and validation splits.
///
/// The two splits never share an example, where identity is the tuple of
/// input-field values ([`Example::identity`]). Both constructors enforce this.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Dataset {
    train: Vec<Example>,
    validation: Vec<Example>,
}

impl Dataset {
    /// Wraps pre-split examples, rejecting any example present in both splits.
    pub fn new(train: Vec<Example>, validation: Vec<Example>) -> Result<Self, DatasetError> {
        let count = {
            let train_ids: HashSet<Vec<&str>> = train.iter().map(Example::identity).collect();
            validation
                .iter()
                .filter(|example| train_ids.contains(&example.identity()))
                .count()
        };
        if count > 0 {
            return Err(DatasetError::Overlap { count });
        }

        Ok(Self { train, validation })
    }

    /// Deduplicates, shuffles with a fixed seed and partitions `examples`.
    ///
    /// At least one example lands in each split when there are two or more
    /// distinct examples.
    pub fn split(
        examples: Vec<Example>,
        train_fraction: f32,
        seed: u64,
    ) -> Result<Self, DatasetError> {
        if !(train_fraction > 0.0 && train_fraction < 1.0) {
            return Err(DatasetError::InvalidFraction {
                fraction: train_fraction,
            });
        }

        let mut seen = HashSet::new();
        let mut unique: Vec<Example> = Vec::with_capacity(examples.len());
        for example in examples {
            let id: Vec<String> = example.identity().into_iter().map(str::to_string).collect();
            if seen.insert(id) {
                unique.push(example);
            }
        }

        let mut rng = StdRng::seed_from_u64(seed);
        unique.shuffle(&mut rng);

        let total = unique.len();
        let mut cut = (total as f32 * train_fraction).round() as usize;
        if total >= 2 {
            cut = cut.clamp(1, total - 1);
        } else {
            cut = total;
        }

        let validation = unique.split_off(cut);
        debug!(
            train = unique.len(),
            validation = validation.len(),
            seed,
            "split dataset"
        );

        Ok(Self {
            train: unique,
            validation,
        })
    }

    pub fn train(&self) -> &[Example] {
        &self.train
    }

    pub fn validation(&self) -> &[Example] {
        &self.validation
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
