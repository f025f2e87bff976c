use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const REASONING_FIELD: &str = "reasoning";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub desc: String,
}

impl Field {
    pub fn new(desc: impl Into<String>) -> Self {
        Self { desc: desc.into() }
    }
}

/// Declared contract of a predictor: an instruction plus ordered input and
/// output fields.
///
/// ```
/// use dsrs_eval::Signature;
///
/// let sig = Signature::new("Classify an IT support ticket.")
///     .input("ticket", "IT support ticket description")
///     .output("category", "Category among: Hardware, Software")
///     .output("priority", "Priority among: Low, High");
/// assert_eq!(sig.output_names(), vec!["category", "priority"]);
///
/// let parsed: Signature = "ticket -> category, priority".parse().unwrap();
/// assert_eq!(parsed.input_names(), vec!["ticket"]);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub instruction: String,
    pub input_fields: IndexMap<String, Field>,
    pub output_fields: IndexMap<String, Field>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureParseError {
    #[error("signature `{0}` must contain `->`")]
    MissingArrow(String),
    #[error("signature `{0}` declares no {1} fields")]
    NoFields(String, &'static str),
}

impl Signature {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            ..Self::default()
        }
    }

    pub fn input(mut self, name: impl Into<String>, desc: impl Into<String>) -> Self {
        self.input_fields.insert(name.into(), Field::new(desc));
        self
    }

    pub fn output(mut self, name: impl Into<String>, desc: impl Into<String>) -> Self {
        self.output_fields.insert(name.into(), Field::new(desc));
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Copy with a `reasoning` output placed before every other output field.
    pub fn with_reasoning(&self) -> Self {
        if self.output_fields.contains_key(REASONING_FIELD) {
            return self.clone();
        }

        let mut output_fields = IndexMap::with_capacity(self.output_fields.len() + 1);
        output_fields.insert(
            REASONING_FIELD.to_string(),
            Field::new("Let's think step by step in order to produce the outputs."),
        );
        output_fields.extend(self.output_fields.clone());

        Self {
            instruction: self.instruction.clone(),
            input_fields: self.input_fields.clone(),
            output_fields,
        }
    }

    pub fn input_names(&self) -> Vec<String> {
        self.input_fields.keys().cloned().collect()
    }

    pub fn output_names(&self) -> Vec<String> {
        self.output_fields.keys().cloned().collect()
    }
}

impl FromStr for Signature {
    type Err = SignatureParseError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let (inputs, outputs) = spec
            .split_once("->")
            .ok_or_else(|| SignatureParseError::MissingArrow(spec.to_string()))?;

        let names = |side: &str| -> Vec<String> {
            side.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        };
        let (inputs, outputs) = (names(inputs), names(outputs));
        if inputs.is_empty() {
            return Err(SignatureParseError::NoFields(spec.to_string(), "input"));
        }
        if outputs.is_empty() {
            return Err(SignatureParseError::NoFields(spec.to_string(), "output"));
        }

        let signature = inputs
            .into_iter()
            .fold(Signature::default(), |sig, name| sig.input(name, ""));
        Ok(outputs
            .into_iter()
            .fold(signature, |sig, name| sig.output(name, "")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_reasoning_prepends_once() {
        let sig: Signature = "ticket -> category".parse().expect("valid signature");
        let cot = sig.with_reasoning().with_reasoning();
        assert_eq!(cot.output_names(), vec!["reasoning", "category"]);
        assert_eq!(sig.output_names(), vec!["category"]);
    }

    #[test]
    fn parse_rejects_missing_outputs() {
        let err = "ticket ->".parse::<Signature>().unwrap_err();
        assert_eq!(
            err,
            SignatureParseError::NoFields("ticket ->".to_string(), "output")
        );
    }
}
