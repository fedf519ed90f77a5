use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use fairvalue_core::monte_carlo::simulation::{dcf_monte_carlo, MonteCarloConfig};
use fairvalue_core::scenarios::sensitivity::{dcf_sensitivity, SensitivityConfig};
use fairvalue_core::AssumptionSet;

use crate::commands::valuation::{absent, OverrideArgs, ValuationRequest};

/// Arguments for the WACC x terminal growth sensitivity grid
#[derive(Args)]
pub struct SensitivityArgs {
    /// JSON file holding a stock record, or {"stock": ..., "overrides": ...}
    #[arg(long)]
    pub input: Option<String>,

    /// WACC step between grid rows
    #[arg(long, default_value = "0.005")]
    pub wacc_step: Decimal,

    /// Terminal growth step between grid columns
    #[arg(long, default_value = "0.0025")]
    pub growth_step: Decimal,

    /// Steps either side of the base case
    #[arg(long, default_value = "2")]
    pub steps: usize,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

/// Arguments for the Monte Carlo DCF
#[derive(Args)]
pub struct MonteCarloArgs {
    /// JSON file holding a stock record, or {"stock": ..., "overrides": ...}
    #[arg(long)]
    pub input: Option<String>,

    /// Number of trials
    #[arg(long, default_value = "1000")]
    pub trials: u32,

    /// Seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

pub fn run_sensitivity(
    args: SensitivityArgs,
    assumptions: &AssumptionSet,
) -> Result<Value, Box<dyn std::error::Error>> {
    let request = ValuationRequest::load(args.input.as_deref(), None, &args.overrides)?;
    let config = SensitivityConfig {
        wacc_step: args.wacc_step,
        growth_step: args.growth_step,
        steps: args.steps,
    };
    match dcf_sensitivity(&request.stock, assumptions, &request.overrides, &config)? {
        Some(output) => Ok(serde_json::to_value(output)?),
        None => Ok(absent(
            &request.stock.ticker,
            "DCF sensitivity",
            "no base-case DCF",
        )),
    }
}

pub fn run_monte_carlo(
    args: MonteCarloArgs,
    assumptions: &AssumptionSet,
) -> Result<Value, Box<dyn std::error::Error>> {
    let request = ValuationRequest::load(args.input.as_deref(), None, &args.overrides)?;
    let config = MonteCarloConfig {
        trials: args.trials,
        seed: args.seed,
    };
    match dcf_monte_carlo(&request.stock, assumptions, &request.overrides, &config)? {
        Some(output) => Ok(serde_json::to_value(output)?),
        None => Ok(absent(
            &request.stock.ticker,
            "Monte Carlo DCF",
            "no base-case DCF",
        )),
    }
}
