//! Evaluation and benchmarking harness for DSRs prediction modules.
//!
//! A [`Module`] turns an [`Example`]'s input fields into a [`Prediction`]. The
//! [`Evaluator`] runs one module over a labeled dataset and averages a
//! [`Metric`]; the [`BenchmarkRunner`] repeats that for several modules and
//! records wall-clock timing; an [`Optimizer`] produces a reconfigured copy of a
//! module from a training split.
//!
//! Language-model backends are passed explicitly to every predictor as an
//! `Arc<dyn LanguageModel>`. There is no process-wide "current LM".

pub mod adapter;
pub mod core;
pub mod data;
pub mod evaluate;
pub mod optimizer;
pub mod patterns;
pub mod predictors;
pub mod utils;

pub use adapter::*;
pub use core::*;
pub use data::*;
pub use evaluate::*;
pub use optimizer::*;
pub use patterns::*;
pub use predictors::*;
pub use utils::*;

#[macro_export]
macro_rules! example {
    // Pattern: { "key": "input" | "output" => value, ... }
    { $($key:literal : $field_type:literal => $value:expr),* $(,)? } => {{
        use $crate::indexmap::IndexMap;
        use $crate::data::example::Example;

        let mut input_keys = vec![];
        let mut output_keys = vec![];

        let mut fields = IndexMap::new();
        $(
            if $field_type == "input" {
                input_keys.push($key.to_string());
            } else {
                output_keys.push($key.to_string());
            }

            fields.insert($key.to_string(), $value.to_string());
        )*

        Example::new(fields, input_keys, output_keys)
    }};
}

#[macro_export]
macro_rules! prediction {
    { $($key:literal => $value:expr),* $(,)? } => {{
        use $crate::indexmap::IndexMap;
        use $crate::{LmUsage, Prediction};

        let mut fields = IndexMap::new();
        $(
            fields.insert($key.to_string(), $value.to_string());
        )*

        Prediction::new(fields, LmUsage::default())
    }};
}

#[doc(hidden)]
pub use indexmap;
