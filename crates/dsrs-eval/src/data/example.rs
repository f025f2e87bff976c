use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A labeled record: named input fields plus the expected output fields.
///
/// Field values are plain strings. `input_keys` name the fields a module may
/// read; `output_keys` name the labels a metric compares against. Metrics read
/// labels through [`Example::label`], which never returns an input field, and
/// modules only ever see [`Example::inputs`].
///
/// Examples are immutable once built: every `with_*`/`without` method returns
/// a new value.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Example {
    pub data: IndexMap<String, String>,
    #[serde(default)]
    pub input_keys: Vec<String>,
    #[serde(default)]
    pub output_keys: Vec<String>,
}

impl Example {
    /// Builds an example. When `output_keys` is empty but `input_keys` is not,
    /// every non-input field becomes an output field.
    pub fn new(
        data: IndexMap<String, String>,
        input_keys: Vec<String>,
        output_keys: Vec<String>,
    ) -> Self {
        let output_keys = if !output_keys.is_empty() {
            output_keys
        } else if !input_keys.is_empty() {
            data.keys()
                .filter(|key| !input_keys.contains(key))
                .cloned()
                .collect()
        } else {
            vec![]
        };

        Self {
            data,
            input_keys,
            output_keys,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Expected value of an output field. `None` for input fields and unknown keys.
    pub fn label(&self, key: &str) -> Option<&str> {
        if self.output_keys.iter().any(|k| k == key) {
            self.get(key)
        } else {
            None
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<String> {
        self.data.values().cloned().collect()
    }

    /// Copy holding only the input fields, in `input_keys` order.
    pub fn inputs(&self) -> Example {
        let data = self
            .input_keys
            .iter()
            .filter_map(|key| self.data.get(key).map(|value| (key.clone(), value.clone())))
            .collect();

        Example {
            data,
            input_keys: self.input_keys.clone(),
            output_keys: vec![],
        }
    }

    /// Copy holding only the expected output fields.
    pub fn labels(&self) -> Example {
        let data = self
            .output_keys
            .iter()
            .filter_map(|key| self.data.get(key).map(|value| (key.clone(), value.clone())))
            .collect();

        Example {
            data,
            input_keys: vec![],
            output_keys: self.output_keys.clone(),
        }
    }

    pub fn with_inputs(&self, keys: &[&str]) -> Example {
        let input_keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let output_keys = self
            .data
            .keys()
            .filter(|key| !input_keys.contains(key))
            .cloned()
            .collect();

        Example {
            data: self.data.clone(),
            input_keys,
            output_keys,
        }
    }

    /// Copy with one extra field. The field is an output when `is_output` is set.
    pub fn with_field(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        is_output: bool,
    ) -> Example {
        let key = key.into();
        let mut example = self.clone();
        example.data.insert(key.clone(), value.into());
        let keys = if is_output {
            &mut example.output_keys
        } else {
            &mut example.input_keys
        };
        if !keys.contains(&key) {
            keys.push(key);
        }
        example
    }

    pub fn without(&self, keys: &[&str]) -> Self {
        let drop = |key: &String| keys.contains(&key.as_str());
        Self {
            data: self
                .data
                .iter()
                .filter(|(key, _)| !drop(key))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            input_keys: self.input_keys.iter().filter(|k| !drop(k)).cloned().collect(),
            output_keys: self.output_keys.iter().filter(|k| !drop(k)).cloned().collect(),
        }
    }

    /// Identity used for split disjointness: the input values in `input_keys` order.
    pub fn identity(&self) -> Vec<&str> {
        self.input_keys
            .iter()
            .map(|key| self.get(key).unwrap_or_default())
            .collect()
    }
}
