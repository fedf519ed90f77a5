pub mod capital_cost;
pub mod cash_flow;
pub mod config;
pub mod dcf;
pub mod net_debt;
