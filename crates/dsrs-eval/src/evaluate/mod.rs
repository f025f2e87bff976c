pub mod benchmark;
pub mod evaluator;
pub mod feedback;
pub mod metrics;

pub use benchmark::*;
pub use evaluator::*;
pub use feedback::*;
pub use metrics::*;
