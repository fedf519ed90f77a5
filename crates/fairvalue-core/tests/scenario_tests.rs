#![cfg(all(feature = "scenarios", feature = "monte_carlo"))]

use fairvalue_core::assumptions::AssumptionSet;
use fairvalue_core::monte_carlo::simulation::{dcf_monte_carlo, MonteCarloConfig};
use fairvalue_core::scenarios::sensitivity::{dcf_sensitivity, SensitivityCell, SensitivityConfig};
use fairvalue_core::stock::StockRecord;
use fairvalue_core::valuation::config::DcfOverrides;
use fairvalue_core::valuation::dcf::value_dcf;
use rust_decimal::prelude::ToPrimitive;
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

// ===========================================================================
// Sensitivity grid
// ===========================================================================

#[test]
fn test_grid_values_within_relaxed_bounds() {
    let set = AssumptionSet::builtin();
    for fcf in [dec!(1_000_000_000), dec!(60_000_000_000), dec!(400_000_000_000)] {
        let overrides = DcfOverrides::new().with_base_fcf(fcf);
        let out = dcf_sensitivity(&us_large_cap(), &set, &overrides, &SensitivityConfig::default())
            .unwrap()
            .unwrap()
            .result;
        for cell in out.matrix.iter().flatten() {
            if let SensitivityCell::Valid { fair_value, .. } = cell {
                assert!(*fair_value >= dec!(200) && *fair_value <= dec!(5000), "fcf {fcf}: {fair_value}");
            }
        }
        assert!(out.min_fair_value <= out.max_fair_value);
    }
}

#[test]
fn test_grid_centre_is_base_case() {
    let set = AssumptionSet::builtin();
    let base = value_dcf(&us_large_cap(), &set, &DcfOverrides::new()).unwrap().unwrap().result;
    let grid = dcf_sensitivity(&us_large_cap(), &set, &DcfOverrides::new(), &SensitivityConfig::default())
        .unwrap()
        .unwrap()
        .result;
    let (i, j) = grid.base_case_position;
    assert_eq!(grid.wacc_values[i], base.wacc);
    assert_eq!(grid.terminal_growth_values[j], base.terminal_growth);
    match &grid.matrix[i][j] {
        SensitivityCell::Valid {
            fair_value,
            is_base_case,
            ..
        } => {
            assert!(is_base_case);
            assert_eq!(*fair_value, base.fair_value);
        }
        SensitivityCell::Invalid => panic!("base case cell must be valid"),
    }
    let flagged = grid
        .matrix
        .iter()
        .flatten()
        .filter(|c| matches!(c, SensitivityCell::Valid { is_base_case: true, .. }))
        .count();
    assert_eq!(flagged, 1);
}

#[test]
fn test_grid_marks_inverted_cells_invalid() {
    let overrides = DcfOverrides::new()
        .with_wacc(dec!(0.035))
        .with_terminal_growth(dec!(0.03));
    let out = dcf_sensitivity(
        &us_large_cap(),
        &AssumptionSet::builtin(),
        &overrides,
        &SensitivityConfig::default(),
    )
    .unwrap()
    .unwrap();
    let grid = &out.result;
    assert_eq!(grid.matrix.len(), 5);
    assert!(grid.matrix.iter().all(|row| row.len() == 5));
    for (i, wacc) in grid.wacc_values.iter().enumerate() {
        for (j, g) in grid.terminal_growth_values.iter().enumerate() {
            if wacc <= g {
                assert_eq!(grid.matrix[i][j], SensitivityCell::Invalid);
            }
        }
    }
    assert!(grid.invalid_cells > 0);
    assert!(!out.warnings.is_empty());
}

// ===========================================================================
// Monte Carlo
// ===========================================================================

#[test]
fn test_monte_carlo_median_tracks_base_case() {
    let set = AssumptionSet::builtin();
    let base = value_dcf(&us_large_cap(), &set, &DcfOverrides::new()).unwrap().unwrap().result;
    let mc = dcf_monte_carlo(
        &us_large_cap(),
        &set,
        &DcfOverrides::new(),
        &MonteCarloConfig::seeded(1_000, 2024),
    )
    .unwrap()
    .unwrap()
    .result;

    let base_fv = base.fair_value.to_f64().unwrap();
    assert!(
        (mc.median / base_fv - 1.0).abs() <= 0.15,
        "median {} vs base {}",
        mc.median,
        base_fv
    );
    assert_eq!(mc.trials_requested, 1_000);
    assert_eq!(mc.histogram.len(), 25);
    assert!(mc.percentiles.p5 <= mc.percentiles.p95);
}

#[test]
fn test_monte_carlo_seed_reproducible_across_runs() {
    let set = AssumptionSet::builtin();
    let run = || {
        dcf_monte_carlo(
            &us_large_cap(),
            &set,
            &DcfOverrides::new(),
            &MonteCarloConfig::seeded(250, 99),
        )
        .unwrap()
        .unwrap()
        .result
    };
    let (a, b) = (run(), run());
    assert_eq!(a.median, b.median);
    assert_eq!(a.std_dev, b.std_dev);
    assert_eq!(a.trials_completed, b.trials_completed);
}
