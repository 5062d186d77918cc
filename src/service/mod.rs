pub mod aggregator;
pub mod engine;
pub mod error;
pub mod gas;
pub mod impact;
pub mod path;
pub mod router;
pub mod token_registry;
pub mod tracker;
pub mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{EngineSettings, SwapEngine};
pub use error::EngineError;
pub use impact::PriceImpact;
pub use token_registry::TokenRegistry;
pub use tracker::TrackingHandle;
pub use types::*;

pub(crate) type ServiceResult<T> = std::result::Result<T, EngineError>;
