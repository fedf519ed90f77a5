use clap::Args;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use fairvalue_core::blend::stock_valuation::{value_stock, StockValuationOptions};
use fairvalue_core::comps::multiples::value_comps;
use fairvalue_core::monte_carlo::simulation::MonteCarloConfig;
use fairvalue_core::scenarios::sensitivity::SensitivityConfig;
use fairvalue_core::valuation::config::DcfOverrides;
use fairvalue_core::valuation::dcf::value_dcf;
use fairvalue_core::{AssumptionSet, StockRecord};

use crate::input;

/// DCF assumption overrides shared by every DCF-based command
#[derive(Args, Debug, Default)]
#[command(allow_hyphen_values = true)]
pub struct OverrideArgs {
    /// Initial growth rate (e.g. 0.12 for 12%)
    #[arg(long)]
    pub initial_growth: Option<Decimal>,

    /// Terminal growth rate
    #[arg(long)]
    pub terminal_growth: Option<Decimal>,

    /// Explicit forecast years (1-30)
    #[arg(long)]
    pub forecast_years: Option<u32>,

    /// Adjusted beta
    #[arg(long)]
    pub beta: Option<Decimal>,

    /// Risk-free rate
    #[arg(long)]
    pub risk_free_rate: Option<Decimal>,

    /// Equity risk premium
    #[arg(long, alias = "erp")]
    pub equity_risk_premium: Option<Decimal>,

    /// Country risk premium added to the cost of equity
    #[arg(long, alias = "crp")]
    pub country_risk_premium: Option<Decimal>,

    /// Corporate tax rate
    #[arg(long)]
    pub tax_rate: Option<Decimal>,

    /// Discount rate, replacing the computed WACC
    #[arg(long)]
    pub wacc: Option<Decimal>,

    /// Base-year FCFF, replacing the cash-flow cascade
    #[arg(long)]
    pub base_fcf: Option<Decimal>,

    /// Debt-to-equity as a ratio (0.5, not 50)
    #[arg(long)]
    pub de_ratio: Option<Decimal>,

    /// Pre-tax cost of debt, replacing the synthetic-rating spread
    #[arg(long)]
    pub cost_of_debt: Option<Decimal>,
}

impl OverrideArgs {
    pub fn to_overrides(&self) -> DcfOverrides {
        DcfOverrides {
            initial_growth: self.initial_growth,
            terminal_growth: self.terminal_growth,
            forecast_years: self.forecast_years,
            beta: self.beta,
            risk_free_rate: self.risk_free_rate,
            equity_risk_premium: self.equity_risk_premium,
            tax_rate: self.tax_rate,
            wacc: self.wacc,
            base_fcf: self.base_fcf,
            country_risk_premium: self.country_risk_premium,
            de_ratio: self.de_ratio,
            cost_of_debt: self.cost_of_debt,
        }
    }
}

/// Arguments for a single-company DCF
#[derive(Args)]
pub struct DcfArgs {
    /// JSON file holding a stock record, or {"stock": ..., "overrides": ...}
    #[arg(long)]
    pub input: Option<String>,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

/// Arguments for trading comparables
#[derive(Args)]
pub struct CompsArgs {
    /// JSON file holding {"stock": ..., "universe": [...]}
    #[arg(long)]
    pub input: Option<String>,

    /// JSON file holding the peer universe as an array of stock records
    #[arg(long)]
    pub universe: Option<String>,
}

/// Arguments for the full per-stock valuation
#[derive(Args)]
pub struct BlendArgs {
    /// JSON file holding {"stock": ..., "universe": [...], "overrides": ...}
    #[arg(long)]
    pub input: Option<String>,

    /// JSON file holding the peer universe as an array of stock records
    #[arg(long)]
    pub universe: Option<String>,

    /// Include the WACC x terminal growth sensitivity grid
    #[arg(long)]
    pub sensitivity: bool,

    /// Include a Monte Carlo run with this many trials
    #[arg(long)]
    pub trials: Option<u32>,

    /// Seed for the Monte Carlo run
    #[arg(long)]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

/// Request payload accepted by every valuation command. A bare stock
/// record is also accepted in place of the wrapper.
#[derive(Debug, Deserialize)]
pub struct ValuationRequest {
    pub stock: StockRecord,
    #[serde(default)]
    pub universe: Vec<StockRecord>,
    #[serde(default)]
    pub overrides: DcfOverrides,
}

impl ValuationRequest {
    /// Read the payload, add any `--universe` file, and let flag overrides
    /// win over payload overrides.
    pub fn load(
        input_path: Option<&str>,
        universe_path: Option<&str>,
        flags: &OverrideArgs,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let payload = input::read_payload(input_path)?;
        let mut request = if payload.get("stock").is_some() {
            serde_json::from_value::<ValuationRequest>(payload)?
        } else {
            ValuationRequest {
                stock: serde_json::from_value(payload)?,
                universe: Vec::new(),
                overrides: DcfOverrides::default(),
            }
        };
        if let Some(path) = universe_path {
            let extra: Vec<StockRecord> = input::file::read_json(path)?;
            request.universe.extend(extra);
        }
        request.overrides = request.overrides.merged_with(&flags.to_overrides());
        Ok(request)
    }
}

/// Envelope printed when the engine declines to value a stock.
pub fn absent(ticker: &str, method: &str, reason: &str) -> Value {
    serde_json::json!({
        "result": null,
        "methodology": method,
        "warnings": [format!("{method} unavailable for {ticker}: {reason}")],
    })
}

pub fn run_dcf(args: DcfArgs, assumptions: &AssumptionSet) -> Result<Value, Box<dyn std::error::Error>> {
    let request = ValuationRequest::load(args.input.as_deref(), None, &args.overrides)?;
    match value_dcf(&request.stock, assumptions, &request.overrides)? {
        Some(output) => Ok(serde_json::to_value(output)?),
        None => Ok(absent(
            &request.stock.ticker,
            "DCF",
            "market cap or price missing or not positive",
        )),
    }
}

pub fn run_comps(args: CompsArgs, assumptions: &AssumptionSet) -> Result<Value, Box<dyn std::error::Error>> {
    let request = ValuationRequest::load(
        args.input.as_deref(),
        args.universe.as_deref(),
        &OverrideArgs::default(),
    )?;
    if request.universe.is_empty() {
        return Err("Comps needs a peer universe: add \"universe\" to the input or pass --universe".into());
    }
    match value_comps(&request.stock, &request.universe, assumptions)? {
        Some(output) => Ok(serde_json::to_value(output)?),
        None => Ok(absent(
            &request.stock.ticker,
            "Comps",
            "no qualifying peers, or market cap or price missing",
        )),
    }
}

pub fn run_blend(args: BlendArgs, assumptions: &AssumptionSet) -> Result<Value, Box<dyn std::error::Error>> {
    let request = ValuationRequest::load(args.input.as_deref(), args.universe.as_deref(), &args.overrides)?;
    let options = StockValuationOptions {
        overrides: request.overrides,
        sensitivity: args.sensitivity.then(SensitivityConfig::default),
        monte_carlo: args.trials.map(|trials| MonteCarloConfig {
            trials,
            seed: args.seed,
        }),
    };
    let output = value_stock(&request.stock, &request.universe, assumptions, &options)?;
    Ok(serde_json::to_value(output)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rust_decimal_macros::dec;

    #[derive(Parser)]
    struct OverrideCli {
        #[command(flatten)]
        overrides: OverrideArgs,
    }

    #[test]
    fn test_capital_structure_flags_reach_overrides() {
        let cli = OverrideCli::parse_from([
            "fairvalue",
            "--country-risk-premium",
            "0.025",
            "--de-ratio",
            "0.4",
            "--cost-of-debt",
            "0.07",
        ]);
        let overrides = cli.overrides.to_overrides();
        assert_eq!(overrides.country_risk_premium, Some(dec!(0.025)));
        assert_eq!(overrides.de_ratio, Some(dec!(0.4)));
        assert_eq!(overrides.cost_of_debt, Some(dec!(0.07)));
        assert_eq!(overrides.wacc, None);
    }

    #[test]
    fn test_crp_alias() {
        let cli = OverrideCli::parse_from(["fairvalue", "--crp", "0.01"]);
        assert_eq!(cli.overrides.to_overrides().country_risk_premium, Some(dec!(0.01)));
    }
}
