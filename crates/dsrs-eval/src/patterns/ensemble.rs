use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::warn;

use crate::{
    Example, LabelSet, LmUsage, Module, PredictError, Prediction, describe_error, normalize,
};

/// Weighted majority vote over several modules.
///
/// Members run one after another. Each successful member casts `weight` votes
/// per field; values are compared after normalization and ties go to the value
/// seen first. The prediction carries `<field>_confidence` (share of votes for
/// the winner) and `num_models`. Failed members are skipped; if none succeed
/// the last error is returned when every failure was an unreachable backend,
/// otherwise [`PredictError::NoPrediction`].
pub struct Ensemble {
    members: Vec<(String, Box<dyn Module>, usize)>,
    fields: Vec<String>,
    labels: IndexMap<String, LabelSet>,
}

impl Ensemble {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            members: Vec::new(),
            fields: fields.into_iter().map(Into::into).collect(),
            labels: IndexMap::new(),
        }
    }

    pub fn member(
        mut self,
        name: impl Into<String>,
        module: impl Module + 'static,
        weight: usize,
    ) -> Self {
        self.members.push((name.into(), Box::new(module), weight));
        self
    }

    /// Reports winners of `field` with the canonical casing from `labels`.
    pub fn labels(mut self, field: impl Into<String>, labels: LabelSet) -> Self {
        self.labels.insert(field.into(), labels);
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Default)]
struct Tally {
    // normalized value -> (votes, first spelling seen)
    votes: IndexMap<String, (usize, String)>,
    total: usize,
}

impl Tally {
    fn add(&mut self, raw: &str, weight: usize) {
        let entry = self
            .votes
            .entry(normalize(raw))
            .or_insert_with(|| (0, raw.trim().to_string()));
        entry.0 += weight;
        self.total += weight;
    }

    fn winner(&self) -> Option<(&str, f32)> {
        let mut best: Option<&(usize, String)> = None;
        for entry in self.votes.values() {
            if best.is_none_or(|current| entry.0 > current.0) {
                best = Some(entry);
            }
        }
        best.map(|(count, spelling)| (spelling.as_str(), *count as f32 / self.total.max(1) as f32))
    }
}

#[async_trait]
impl Module for Ensemble {
    async fn forward(&self, inputs: &Example) -> Result<Prediction, PredictError> {
        let mut tallies: IndexMap<&str, Tally> = self
            .fields
            .iter()
            .map(|field| (field.as_str(), Tally::default()))
            .collect();
        let mut usage = LmUsage::default();
        let mut errors = Vec::new();

        for (name, module, weight) in &self.members {
            match module.forward(inputs).await {
                Ok(prediction) => {
                    for (field, tally) in tallies.iter_mut() {
                        if let Some(value) = prediction.get(field) {
                            tally.add(value, *weight);
                        }
                    }
                    usage = usage + prediction.lm_usage;
                }
                Err(err) => {
                    warn!(member = %name, error = %describe_error(&err), "ensemble member failed");
                    errors.push(err);
                }
            }
        }

        if errors.len() == self.members.len() {
            if !errors.is_empty() && errors.iter().all(PredictError::is_backend_unavailable) {
                if let Some(last) = errors.pop() {
                    return Err(last);
                }
            }
            return Err(PredictError::NoPrediction {
                reason: format!("all {} ensemble member(s) failed", self.members.len()),
            });
        }

        let mut prediction = Prediction::new(IndexMap::new(), usage);
        for (field, tally) in &tallies {
            let Some((value, confidence)) = tally.winner() else {
                continue;
            };
            let value = match self.labels.get(*field) {
                Some(labels) => labels.resolve(value).0,
                None => value.to_string(),
            };
            prediction = prediction
                .with_field(*field, value)
                .with_field(format!("{field}_confidence"), format!("{confidence:.2}"));
        }
        Ok(prediction.with_field("num_models", self.members.len().to_string()))
    }
}
