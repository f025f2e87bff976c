//! Composite modules that harden a prediction unit: label validation,
//! retries, fallback backends, ensembles and best-of-n sampling.

pub mod best_of_n;
pub mod ensemble;
pub mod fallback;
pub mod retry;
pub mod validated;

pub use best_of_n::*;
pub use ensemble::*;
pub use fallback::*;
pub use retry::*;
pub use validated::*;
