pub mod engine;
pub mod stock_valuation;
