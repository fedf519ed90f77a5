#![cfg(feature = "blend")]

use fairvalue_core::assumptions::AssumptionSet;
use fairvalue_core::blend::engine::{blend_valuations, Convergence, ValuationMethod};
use fairvalue_core::blend::stock_valuation::{value_stock, StockValuationOptions};
use fairvalue_core::stock::{Classification, StockRecord};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn retailer(ticker: &str, region: &str, industry: &str, cap: Decimal, pe: Decimal) -> StockRecord {
    StockRecord {
        classification: Classification::new(
            Some("Consumer Discretionary"),
            Some("Consumer Discretionary Distribution & Retail"),
            Some(industry),
            None,
        ),
        market_cap: Some(cap),
        price: Some(dec!(200)),
        pe: Some(pe),
        pb: Some(dec!(4)),
        beta: Some(dec!(1.1)),
        de: Some(dec!(45)),
        ebitda_margin: Some(dec!(12)),
        revenue_growth: Some(dec!(9)),
        ..StockRecord::new(ticker, region)
    }
}

// ===========================================================================
// Thin peer set
// ===========================================================================

#[test]
fn test_thin_peer_set_caps_comps_weight() {
    let target = retailer("TGT", "US", "Broadline Retail", dec!(50_000_000_000), dec!(20));
    let universe = vec![
        retailer("P1", "US", "Broadline Retail", dec!(45_000_000_000), dec!(22)),
        retailer("P2", "US", "Broadline Retail", dec!(60_000_000_000), dec!(24)),
    ];
    let out = value_stock(
        &target,
        &universe,
        &AssumptionSet::builtin(),
        &StockValuationOptions::default(),
    )
    .unwrap();
    let r = &out.result;
    assert_eq!(r.comps.as_ref().unwrap().peer_count, 2);
    let blend = r.blend.as_ref().unwrap();
    assert!(blend.comps_weight <= dec!(0.30), "comps weight {}", blend.comps_weight);
    assert_eq!(blend.dcf_weight + blend.comps_weight, Decimal::ONE);
    assert!(blend.adjustments.iter().any(|a| a.contains("peer")));
}

#[test]
fn test_full_peer_set_default_weights() {
    let target = retailer("TGT", "US", "Broadline Retail", dec!(50_000_000_000), dec!(20));
    let universe: Vec<StockRecord> = (1..=5)
        .map(|i| {
            retailer(
                &format!("P{i}"),
                "US",
                "Broadline Retail",
                dec!(40_000_000_000) + Decimal::from(i) * dec!(5_000_000_000),
                dec!(18) + Decimal::from(i),
            )
        })
        .collect();
    let out = value_stock(&target, &universe, &AssumptionSet::builtin(), &StockValuationOptions::default()).unwrap();
    let r = &out.result;
    let dcf = r.dcf.as_ref().unwrap();
    let blend = r.blend.as_ref().unwrap();
    assert!(blend.comps_weight >= dec!(0.35));

    let dcf_part = blend
        .contributions
        .iter()
        .find(|c| c.method == ValuationMethod::Dcf)
        .unwrap();
    assert_eq!(dcf_part.fair_value, dcf.fair_value);
    assert_eq!(dcf_part.weight, blend.dcf_weight);

    let comps_upside = r.comps.as_ref().unwrap().upside.unwrap();
    let expected = Convergence::from_gap(dcf.upside - comps_upside);
    assert_eq!(blend.convergence, Some(expected));
}

#[test]
fn test_blend_without_inputs_is_absent() {
    assert!(blend_valuations(None, None).is_none());
}
