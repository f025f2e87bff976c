use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{LmUsage, ParseError};

/// Output of a [`Module`](crate::Module) call: field name to produced value.
///
/// Predictions coming out of [`Predict`](crate::Predict) are built with
/// [`Prediction::try_new`], so every declared output field is present.
/// Modules may add auxiliary fields (`reasoning`, `attempts`, `model_used`)
/// which metrics ignore.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Prediction {
    pub data: IndexMap<String, String>,
    #[serde(default)]
    pub lm_usage: LmUsage,
}

impl Prediction {
    pub fn new(data: IndexMap<String, String>, lm_usage: LmUsage) -> Self {
        Self { data, lm_usage }
    }

    /// Builds a prediction, failing on the first declared field that is absent.
    pub fn try_new<S: AsRef<str>>(
        data: IndexMap<String, String>,
        declared: &[S],
        lm_usage: LmUsage,
    ) -> Result<Self, ParseError> {
        let prediction = Self::new(data, lm_usage);
        prediction.validate(declared)?;
        Ok(prediction)
    }

    pub fn validate<S: AsRef<str>>(&self, declared: &[S]) -> Result<(), ParseError> {
        match declared
            .iter()
            .find(|field| !self.data.contains_key(field.as_ref()))
        {
            Some(missing) => Err(ParseError::MissingField {
                field: missing.as_ref().to_string(),
                raw_response: String::new(),
            }),
            None => Ok(()),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<String> {
        self.data.values().cloned().collect()
    }

    /// Copy with one more field set.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn set_lm_usage(mut self, lm_usage: LmUsage) -> Self {
        self.lm_usage = lm_usage;
        self
    }
}
