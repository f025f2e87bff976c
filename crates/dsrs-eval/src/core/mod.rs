pub mod errors;
pub mod lm;
pub mod module;
pub mod signature;

pub use errors::*;
pub use lm::*;
pub use module::*;
pub use signature::*;
