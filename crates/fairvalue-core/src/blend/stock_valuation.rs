use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::assumptions::AssumptionSet;
use crate::blend::engine::{blend_valuations, BlendOutput};
use crate::comps::multiples::{value_comps, CompsOutput};
use crate::stock::StockRecord;
use crate::types::*;
use crate::valuation::config::DcfOverrides;
use crate::valuation::dcf::{value_dcf, DcfOutput};
use crate::FairValueResult;

#[cfg(feature = "monte_carlo")]
use crate::monte_carlo::simulation::{dcf_monte_carlo, MonteCarloConfig, MonteCarloOutput};
#[cfg(feature = "scenarios")]
use crate::scenarios::sensitivity::{dcf_sensitivity, SensitivityConfig, SensitivityOutput};

/// What to run beyond DCF, Comps and the blend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StockValuationOptions {
    pub overrides: DcfOverrides,
    #[cfg(feature = "scenarios")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<SensitivityConfig>,
    #[cfg(feature = "monte_carlo")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monte_carlo: Option<MonteCarloConfig>,
}

/// Every valuation view of one company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockValuation {
    pub ticker: String,
    /// Blended fair value when any method produced one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fair_value: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upside: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dcf: Option<DcfOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comps: Option<CompsOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend: Option<BlendOutput>,
    #[cfg(feature = "scenarios")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<SensitivityOutput>,
    #[cfg(feature = "monte_carlo")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monte_carlo: Option<MonteCarloOutput>,
}

/// Run DCF and Comps for `record`, blend them, and optionally add the
/// sensitivity grid and Monte Carlo distribution.
///
/// Warnings from each method are carried into the envelope prefixed with
/// the method name. An unknown region or invalid overrides are errors;
/// missing data only leaves the affected sections empty.
pub fn value_stock(
    record: &StockRecord,
    universe: &[StockRecord],
    assumptions: &AssumptionSet,
    options: &StockValuationOptions,
) -> FairValueResult<ComputationOutput<StockValuation>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let dcf = value_dcf(record, assumptions, &options.overrides)?
        .map(|out| unwrap_section("DCF", out, &mut warnings));
    let comps = value_comps(record, universe, assumptions)?
        .map(|out| unwrap_section("Comps", out, &mut warnings));
    let blend = blend_valuations(dcf.as_ref(), comps.as_ref())
        .map(|out| unwrap_section("Blend", out, &mut warnings));

    debug!(
        ticker = %record.ticker,
        dcf = dcf.is_some(),
        comps = comps.is_some(),
        "stock valuation sections computed"
    );

    #[cfg(feature = "scenarios")]
    let sensitivity = match (&options.sensitivity, &dcf) {
        (Some(config), Some(_)) => dcf_sensitivity(record, assumptions, &options.overrides, config)?
            .map(|out| unwrap_section("Sensitivity", out, &mut warnings)),
        _ => None,
    };

    #[cfg(feature = "monte_carlo")]
    let monte_carlo = match (&options.monte_carlo, &dcf) {
        (Some(config), Some(_)) => dcf_monte_carlo(record, assumptions, &options.overrides, config)?
            .map(|out| unwrap_section("Monte Carlo", out, &mut warnings)),
        _ => None,
    };

    let output = StockValuation {
        ticker: record.ticker.clone(),
        fair_value: blend.as_ref().map(|b| b.fair_value),
        upside: blend.as_ref().map(|b| b.upside),
        dcf,
        comps,
        blend,
        #[cfg(feature = "scenarios")]
        sensitivity,
        #[cfg(feature = "monte_carlo")]
        monte_carlo,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "DCF + trading comps, confidence-weighted blend",
        options,
        warnings,
        elapsed,
        output,
    ))
}

fn unwrap_section<T: Serialize>(
    method: &str,
    output: ComputationOutput<T>,
    warnings: &mut Vec<String>,
) -> T {
    warnings.extend(output.warnings.into_iter().map(|w| format!("{method}: {w}")));
    output.result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::Classification;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn company(ticker: &str, cap: Decimal, pe: Decimal) -> StockRecord {
        StockRecord {
            classification: Classification::new(Some("Industrial"), Some("Machinery"), Some("Machinery"), None),
            market_cap: Some(cap),
            price: Some(dec!(50)),
            pe: Some(pe),
            pb: Some(dec!(2.5)),
            beta: Some(dec!(1.2)),
            de: Some(dec!(60)),
            ebitda_margin: Some(dec!(18)),
            revenue_growth: Some(dec!(6)),
            ..StockRecord::new(ticker, "US")
        }
    }

    #[test]
    fn test_value_stock_all_sections() {
        let target = company("TGT", dec!(20_000_000_000), dec!(15));
        let universe = vec![
            company("P1", dec!(18_000_000_000), dec!(17)),
            company("P2", dec!(25_000_000_000), dec!(14)),
            company("P3", dec!(15_000_000_000), dec!(19)),
        ];
        let out = value_stock(
            &target,
            &universe,
            &AssumptionSet::builtin(),
            &StockValuationOptions::default(),
        )
        .unwrap();
        let r = &out.result;
        assert!(r.dcf.is_some());
        assert!(r.comps.is_some());
        let blend = r.blend.as_ref().unwrap();
        assert_eq!(r.fair_value, Some(blend.fair_value));
        assert!(out
            .warnings
            .iter()
            .all(|w| w.starts_with("DCF: ") || w.starts_with("Comps: ") || w.starts_with("Blend: ")));
    }

    #[test]
    fn test_value_stock_without_peers_falls_back_to_dcf() {
        let target = company("TGT", dec!(20_000_000_000), dec!(15));
        let out = value_stock(&target, &[], &AssumptionSet::builtin(), &StockValuationOptions::default()).unwrap();
        let r = &out.result;
        assert!(r.comps.is_none());
        assert_eq!(r.blend.as_ref().unwrap().dcf_weight, Decimal::ONE);
        assert!(out.warnings.iter().any(|w| w == "Blend: Comps unavailable; blend uses DCF only"));
    }

    #[test]
    fn test_value_stock_no_market_cap() {
        let target = StockRecord {
            market_cap: None,
            ..company("TGT", dec!(1), dec!(15))
        };
        let out = value_stock(&target, &[], &AssumptionSet::builtin(), &StockValuationOptions::default()).unwrap();
        assert!(out.result.fair_value.is_none());
        assert!(out.result.dcf.is_none());
    }

    #[test]
    fn test_value_stock_unknown_region_errors() {
        let target = StockRecord {
            region: "Atlantis".into(),
            ..company("TGT", dec!(20_000_000_000), dec!(15))
        };
        assert!(value_stock(&target, &[], &AssumptionSet::builtin(), &StockValuationOptions::default()).is_err());
    }
}
