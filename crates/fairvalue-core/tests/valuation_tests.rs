use fairvalue_core::assumptions::AssumptionSet;
use fairvalue_core::stock::StockRecord;
use fairvalue_core::valuation::cash_flow::CashFlowMethod;
use fairvalue_core::valuation::config::DcfOverrides;
use fairvalue_core::valuation::dcf::{value_dcf, DcfOutput, TerminalValueCheck};
use fairvalue_core::FairValueError;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn us_large_cap() -> StockRecord {
    StockRecord {
        market_cap: Some(dec!(1_000_000_000_000)),
        price: Some(dec!(1000)),
        beta: Some(dec!(1.0)),
        de: Some(dec!(50)),
        ebitda_margin: Some(dec!(20)),
        revenue_growth: Some(dec!(8)),
        ..StockRecord::new("SCNA", "US")
    }
}

fn dcf(record: &StockRecord, overrides: &DcfOverrides) -> DcfOutput {
    value_dcf(record, &AssumptionSet::builtin(), overrides)
        .unwrap()
        .expect("DCF should be present")
        .result
}

// ===========================================================================
// Reference scenarios
// ===========================================================================

#[test]
fn test_us_large_cap_values() {
    let r = dcf(&us_large_cap(), &DcfOverrides::new());
    // Rf 4.35% + 1.0 x 5.5% ERP on two-thirds equity, BBB-ish debt on the rest
    assert!(
        r.wacc > dec!(0.085) && r.wacc < dec!(0.10),
        "WACC should be near 9%, got {}",
        r.wacc
    );
    assert_eq!(r.forecast_years, 5);
    let share = r.terminal_value_share.unwrap();
    assert!(share > dec!(0.40) && share < dec!(0.85), "TV share {share}");
    assert_eq!(r.terminal_value_check, TerminalValueCheck::Pass);
}

#[test]
fn test_zero_market_cap_is_absent() {
    let rec = StockRecord {
        market_cap: Some(Decimal::ZERO),
        ..us_large_cap()
    };
    let out = value_dcf(&rec, &AssumptionSet::builtin(), &DcfOverrides::new()).unwrap();
    assert!(out.is_none());
}

#[test]
fn test_indonesia_carries_country_risk() {
    let us = dcf(&us_large_cap(), &DcfOverrides::new());
    let idn = dcf(
        &StockRecord {
            region: "Indonesia".into(),
            ..us_large_cap()
        },
        &DcfOverrides::new(),
    );
    assert_eq!(idn.capital_cost.country_risk_premium, dec!(0.025));
    assert!(idn.wacc > us.wacc);
    assert_eq!(idn.terminal_growth, dec!(0.04));
}

#[test]
fn test_feed_json_record() {
    let rec: StockRecord = serde_json::from_str(
        r#"{
            "Ticker": "FEED", "Region": "US", "GICS Sector": "Information Technology",
            "Market Cap": 500000000000, "Price": 250, "Beta": 1.2, "DE": 35,
            "EBITDA Margin": 32, "Revenue Growth": 12, "FCF": 20000000000,
            "Net Income": 25000000000
        }"#,
    )
    .unwrap();
    let r = dcf(&rec, &DcfOverrides::new());
    assert_eq!(r.ticker, "FEED");
    assert_eq!(r.cash_flow.method, CashFlowMethod::DirectFcf);
}

// ===========================================================================
// Output bounds
// ===========================================================================

#[test]
fn test_output_bounds_hold_across_inputs() {
    let set = AssumptionSet::builtin();
    for region in ["US", "Indonesia"] {
        for beta in [dec!(0.2), dec!(1.0), dec!(3.5)] {
            for growth in [dec!(-40), dec!(5), dec!(60)] {
                for de in [dec!(-5), dec!(0.4), dec!(250)] {
                    let rec = StockRecord {
                        region: region.into(),
                        beta: Some(beta),
                        revenue_growth: Some(growth),
                        de: Some(de),
                        ..us_large_cap()
                    };
                    let out = value_dcf(&rec, &set, &DcfOverrides::new()).unwrap().unwrap();
                    let r = &out.result;
                    let label = format!("{region} beta={beta} g={growth} de={de}");

                    assert!(r.wacc > r.terminal_growth, "{label}");
                    assert!(r.fair_value >= dec!(500) && r.fair_value <= dec!(2500), "{label}");
                    if r.ev_capped {
                        assert!(r.uncapped_enterprise_value > r.market_cap * dec!(5), "{label}");
                        assert_eq!(r.enterprise_value, r.market_cap * dec!(3), "{label}");
                    } else {
                        assert!(r.enterprise_value <= r.market_cap * dec!(5), "{label}");
                    }
                    assert!(r.confidence_score <= 100, "{label}");
                    assert!(r.capital_cost.beta >= dec!(0.4) && r.capital_cost.beta <= dec!(2.5));
                }
            }
        }
    }
}

#[test]
fn test_inverted_wacc_repaired_with_warning() {
    let out = value_dcf(
        &us_large_cap(),
        &AssumptionSet::builtin(),
        &DcfOverrides::new().with_wacc(dec!(0.02)).with_terminal_growth(dec!(0.03)),
    )
    .unwrap()
    .unwrap();
    assert!(out.result.wacc_adjusted);
    assert_eq!(out.result.wacc, dec!(0.06));
    assert!(!out.warnings.is_empty());
}

#[test]
fn test_idempotent_with_overrides() {
    let overrides = DcfOverrides::new()
        .with_initial_growth(dec!(0.12))
        .with_beta(dec!(1.3))
        .with_forecast_years(7);
    let a = dcf(&us_large_cap(), &overrides);
    let b = dcf(&us_large_cap(), &overrides);
    assert_eq!(
        serde_json::to_value(&a).unwrap(),
        serde_json::to_value(&b).unwrap()
    );
    assert_eq!(a.forecast_years, 7);
}

// ===========================================================================
// Monotonicity
// ===========================================================================

#[test]
fn test_fair_value_rises_with_terminal_growth() {
    let values: Vec<Decimal> = [dec!(0.020), dec!(0.025), dec!(0.030)]
        .iter()
        .map(|g| dcf(&us_large_cap(), &DcfOverrides::new().with_terminal_growth(*g)).fair_value)
        .collect();
    assert!(values.windows(2).all(|w| w[0] < w[1]), "{values:?}");
}

#[test]
fn test_fair_value_falls_with_wacc() {
    let values: Vec<Decimal> = [dec!(0.085), dec!(0.090), dec!(0.095), dec!(0.100)]
        .iter()
        .map(|w| dcf(&us_large_cap(), &DcfOverrides::new().with_wacc(*w)).fair_value)
        .collect();
    assert!(values.windows(2).all(|w| w[0] > w[1]), "{values:?}");
}

// ===========================================================================
// Cash-flow cascade
// ===========================================================================

#[test]
fn test_direct_fcf_preferred_when_plausible() {
    let rec = StockRecord {
        fcf: Some(dec!(50_000_000_000)),
        net_income: Some(dec!(60_000_000_000)),
        ..us_large_cap()
    };
    let r = dcf(&rec, &DcfOverrides::new());
    assert_eq!(r.cash_flow.method, CashFlowMethod::DirectFcf);
    assert_eq!(r.base_fcf, dec!(50_000_000_000));
    assert!(r.cash_flow.rejected.is_empty());
}

#[test]
fn test_net_income_used_when_fcf_implausible() {
    let rec = StockRecord {
        fcf: Some(dec!(1_000_000_000)),
        net_income: Some(dec!(60_000_000_000)),
        ..us_large_cap()
    };
    let r = dcf(&rec, &DcfOverrides::new());
    assert_eq!(r.cash_flow.method, CashFlowMethod::NetIncomeConversion);
    assert_eq!(r.cash_flow.rejected, vec![CashFlowMethod::DirectFcf]);
}

// ===========================================================================
// Overrides and contract errors
// ===========================================================================

#[test]
fn test_camel_case_override_payload() {
    let overrides: DcfOverrides =
        serde_json::from_str(r#"{"terminalGrowth": "0.03", "forecastYears": 8, "baseFCF": "40000000000"}"#)
            .unwrap();
    let r = dcf(&us_large_cap(), &overrides);
    assert_eq!(r.terminal_growth, dec!(0.03));
    assert_eq!(r.forecast_years, 8);
    assert_eq!(r.cash_flow.method, CashFlowMethod::Override);
}

#[test]
fn test_unknown_region_is_contract_error() {
    let rec = StockRecord {
        region: "Narnia".into(),
        ..us_large_cap()
    };
    let err = value_dcf(&rec, &AssumptionSet::builtin(), &DcfOverrides::new()).unwrap_err();
    assert!(matches!(err, FairValueError::UnknownRegion(_)));
}

#[test]
fn test_invalid_tax_override_rejected() {
    let overrides = DcfOverrides {
        tax_rate: Some(dec!(1.2)),
        ..DcfOverrides::default()
    };
    let err = value_dcf(&us_large_cap(), &AssumptionSet::builtin(), &overrides).unwrap_err();
    assert!(matches!(err, FairValueError::InvalidInput { .. }));
}
