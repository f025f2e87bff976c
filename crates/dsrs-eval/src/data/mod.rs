pub mod dataloader;
pub mod dataset;
pub mod example;
pub mod prediction;

pub use dataloader::*;
pub use dataset::*;
pub use example::*;
pub use prediction::*;
