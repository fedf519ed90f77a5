use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use fairvalue_core::blend::stock_valuation::{value_stock as run_value_stock, StockValuationOptions};
use fairvalue_core::monte_carlo::simulation::{dcf_monte_carlo as run_monte_carlo, MonteCarloConfig};
use fairvalue_core::scenarios::sensitivity::{dcf_sensitivity as run_sensitivity, SensitivityConfig};
use fairvalue_core::valuation::config::DcfOverrides;
use fairvalue_core::{AssumptionSet, StockRecord};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// Payload shared by every entry point. `assumptions` replaces the built-in
/// set when present; absent results serialise as `null`.
#[derive(Deserialize)]
struct Request {
    stock: StockRecord,
    #[serde(default)]
    universe: Vec<StockRecord>,
    #[serde(default, alias = "override")]
    overrides: DcfOverrides,
    #[serde(default)]
    assumptions: Option<AssumptionSet>,
    #[serde(default)]
    sensitivity: Option<SensitivityConfig>,
    #[serde(default, alias = "monteCarlo")]
    monte_carlo: Option<MonteCarloConfig>,
}

impl Request {
    fn parse(input_json: &str) -> NapiResult<Self> {
        serde_json::from_str(input_json).map_err(to_napi_error)
    }

    fn assumption_set(&mut self) -> NapiResult<AssumptionSet> {
        match self.assumptions.take() {
            Some(set) => {
                set.validate().map_err(to_napi_error)?;
                Ok(set)
            }
            None => Ok(AssumptionSet::builtin()),
        }
    }
}

// ---------------------------------------------------------------------------
// Valuation
// ---------------------------------------------------------------------------

#[napi]
pub fn value_dcf(input_json: String) -> NapiResult<String> {
    let mut req = Request::parse(&input_json)?;
    let set = req.assumption_set()?;
    let output = fairvalue_core::valuation::dcf::value_dcf(&req.stock, &set, &req.overrides)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn value_comps(input_json: String) -> NapiResult<String> {
    let mut req = Request::parse(&input_json)?;
    let set = req.assumption_set()?;
    let output = fairvalue_core::comps::multiples::value_comps(&req.stock, &req.universe, &set)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn value_stock(input_json: String) -> NapiResult<String> {
    let mut req = Request::parse(&input_json)?;
    let set = req.assumption_set()?;
    let options = StockValuationOptions {
        overrides: req.overrides,
        sensitivity: req.sensitivity,
        monte_carlo: req.monte_carlo,
    };
    let output = run_value_stock(&req.stock, &req.universe, &set, &options).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[napi]
pub fn dcf_sensitivity(input_json: String) -> NapiResult<String> {
    let mut req = Request::parse(&input_json)?;
    let set = req.assumption_set()?;
    let config = req.sensitivity.take().unwrap_or_default();
    let output = run_sensitivity(&req.stock, &set, &req.overrides, &config).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn dcf_monte_carlo(input_json: String) -> NapiResult<String> {
    let mut req = Request::parse(&input_json)?;
    let set = req.assumption_set()?;
    let config = req.monte_carlo.take().unwrap_or_default();
    let output = run_monte_carlo(&req.stock, &set, &req.overrides, &config).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[napi]
pub fn builtin_assumptions() -> NapiResult<String> {
    serde_json::to_string(&AssumptionSet::builtin()).map_err(to_napi_error)
}
