pub mod assumptions;
pub mod scenarios;
pub mod valuation;
