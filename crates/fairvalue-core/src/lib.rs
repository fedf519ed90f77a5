pub mod assumptions;
pub mod error;
pub mod stock;
pub mod types;

#[cfg(feature = "valuation")]
pub mod valuation;

#[cfg(feature = "comps")]
pub mod comps;

#[cfg(feature = "blend")]
pub mod blend;

#[cfg(feature = "scenarios")]
pub mod scenarios;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

pub use assumptions::AssumptionSet;
pub use error::FairValueError;
pub use stock::StockRecord;
pub use types::*;

/// Standard result type for all fair-value operations
pub type FairValueResult<T> = Result<T, FairValueError>;
