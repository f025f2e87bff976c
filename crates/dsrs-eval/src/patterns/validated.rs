use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::debug;

use crate::{Example, Module, Optimizable, Predict, PredictError, Prediction, normalize};

/// Closed set of labels for one output field, with substring aliases and a
/// fallback for anything unrecognised.
#[derive(Debug, Clone)]
pub struct LabelSet {
    labels: Vec<String>,
    aliases: Vec<(String, String)>,
    fallback: String,
}

impl LabelSet {
    pub fn new<I, S>(labels: I, fallback: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            aliases: Vec::new(),
            fallback: fallback.into(),
        }
    }

    /// Maps any value containing `needle` (case-insensitive) to `label`.
    /// Aliases are tried in insertion order.
    pub fn alias(mut self, needle: impl AsRef<str>, label: impl Into<String>) -> Self {
        self.aliases.push((normalize(needle.as_ref()), label.into()));
        self
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Canonical label for `raw`, and whether it was recognised.
    pub fn resolve(&self, raw: &str) -> (String, bool) {
        let value = normalize(raw);
        if let Some(label) = self.labels.iter().find(|label| normalize(label) == value) {
            return (label.clone(), true);
        }
        if let Some((_, label)) = self
            .aliases
            .iter()
            .find(|(needle, _)| !value.is_empty() && value.contains(needle.as_str()))
        {
            return (label.clone(), true);
        }
        (self.fallback.clone(), false)
    }
}

/// Snaps selected output fields of the wrapped module onto closed label sets.
///
/// Each rule resolves its field through [`LabelSet::resolve`]; the prediction
/// gains an `is_valid` field that is `false` when any field needed the fallback.
#[derive(Debug, Clone)]
pub struct Validated<M> {
    inner: M,
    rules: IndexMap<String, LabelSet>,
}

impl<M> Validated<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            rules: IndexMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, labels: LabelSet) -> Self {
        self.rules.insert(name.into(), labels);
        self
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn validate(&self, prediction: Prediction) -> Prediction {
        let mut all_valid = true;
        let mut prediction = prediction;
        for (field, labels) in &self.rules {
            let raw = prediction.get(field).unwrap_or_default().to_string();
            let (label, valid) = labels.resolve(&raw);
            if !valid || label != raw {
                debug!(%field, %raw, %label, valid, "corrected label");
            }
            all_valid &= valid;
            prediction = prediction.with_field(field.clone(), label);
        }
        prediction.with_field("is_valid", all_valid.to_string())
    }
}

#[async_trait]
impl<M: Module> Module for Validated<M> {
    async fn forward(&self, inputs: &Example) -> Result<Prediction, PredictError> {
        let prediction = self.inner.forward(inputs).await?;
        Ok(self.validate(prediction))
    }
}

impl<M: Optimizable> Optimizable for Validated<M> {
    fn parameters(&mut self) -> IndexMap<String, &mut Predict> {
        self.inner.parameters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priorities() -> LabelSet {
        LabelSet::new(["Low", "Medium", "High", "Urgent", "Critical"], "Low")
            .alias("critiq", "Critical")
            .alias("haut", "High")
    }

    #[test]
    fn resolve_restores_canonical_casing() {
        assert_eq!(priorities().resolve("  urgent "), ("Urgent".to_string(), true));
    }

    #[test]
    fn resolve_uses_aliases_before_fallback() {
        assert_eq!(priorities().resolve("Très critique"), ("Critical".to_string(), true));
        assert_eq!(priorities().resolve("whenever"), ("Low".to_string(), false));
        assert_eq!(priorities().resolve(""), ("Low".to_string(), false));
    }
}
