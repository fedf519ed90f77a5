use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::assumptions::AssumptionSet;
use crate::error::FairValueError;
use crate::stock::StockRecord;
use crate::types::*;
use crate::valuation::config::DcfOverrides;
use crate::valuation::dcf::{compute_dcf, per_share_value, project_enterprise_value};
use crate::FairValueResult;

/// Fair-value clamp for grid cells, wider than the base case so the grid
/// shows the model's actual response.
const GRID_FAIR_VALUE_BOUNDS: (Decimal, Decimal) = (dec!(0.2), dec!(5));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Grid shape: `steps` values either side of the base case for each axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityConfig {
    #[serde(default = "default_wacc_step")]
    pub wacc_step: Rate,
    #[serde(default = "default_growth_step")]
    pub growth_step: Rate,
    #[serde(default = "default_steps")]
    pub steps: usize,
}

fn default_wacc_step() -> Rate {
    dec!(0.005)
}

fn default_growth_step() -> Rate {
    dec!(0.0025)
}

fn default_steps() -> usize {
    2
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        SensitivityConfig {
            wacc_step: default_wacc_step(),
            growth_step: default_growth_step(),
            steps: default_steps(),
        }
    }
}

/// One cell of the WACC x terminal growth grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SensitivityCell {
    Valid {
        fair_value: Money,
        upside: Rate,
        is_base_case: bool,
    },
    /// Discount rate not above terminal growth
    Invalid,
}

impl SensitivityCell {
    pub fn fair_value(&self) -> Option<Money> {
        match self {
            SensitivityCell::Valid { fair_value, .. } => Some(*fair_value),
            SensitivityCell::Invalid => None,
        }
    }

    pub fn upside(&self) -> Option<Rate> {
        match self {
            SensitivityCell::Valid { upside, .. } => Some(*upside),
            SensitivityCell::Invalid => None,
        }
    }
}

/// Where in the grid positive upside shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityOutlook {
    /// Even the worst cell shows upside
    RobustUpside,
    /// The median cell shows upside
    BaseCaseUpside,
    /// Only the best cells show upside
    OptimisticOnly,
    Downside,
}

impl SensitivityOutlook {
    pub fn recommendation(&self) -> &'static str {
        match self {
            SensitivityOutlook::RobustUpside => "Upside holds across every valid discount-rate and growth pair",
            SensitivityOutlook::BaseCaseUpside => "Upside in the central scenarios; downside under pessimistic assumptions",
            SensitivityOutlook::OptimisticOnly => "Upside only under optimistic discount-rate and growth assumptions",
            SensitivityOutlook::Downside => "Downside across the grid",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityOutput {
    pub ticker: String,
    pub current_price: Money,
    pub base_wacc: Rate,
    pub base_terminal_growth: Rate,
    pub base_fair_value: Money,
    /// Row axis, ascending
    pub wacc_values: Vec<Rate>,
    /// Column axis, ascending
    pub terminal_growth_values: Vec<Rate>,
    /// matrix[i][j] = cell at wacc_values[i], terminal_growth_values[j]
    pub matrix: Vec<Vec<SensitivityCell>>,
    pub base_case_position: (usize, usize),
    pub valid_cells: usize,
    pub invalid_cells: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_fair_value: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fair_value: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_upside: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_upside: Option<Rate>,
    pub outlook: SensitivityOutlook,
    pub recommendation: String,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Recompute the DCF across a WACC x terminal growth grid centred on the
/// base case, holding the base growth schedule, base FCFF and net debt fixed.
///
/// `Ok(None)` whenever the base-case DCF itself is absent.
pub fn dcf_sensitivity(
    record: &StockRecord,
    assumptions: &AssumptionSet,
    overrides: &DcfOverrides,
    config: &SensitivityConfig,
) -> FairValueResult<Option<ComputationOutput<SensitivityOutput>>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_config(config)?;
    let Some((base, _)) = compute_dcf(record, assumptions, overrides, &mut warnings)? else {
        return Ok(None);
    };

    let wacc_values = sweep(base.wacc, config.wacc_step, config.steps);
    let terminal_growth_values = sweep(base.terminal_growth, config.growth_step, config.steps);
    let growth_schedule: Vec<Rate> = base.projections.iter().map(|p| p.growth_rate).collect();
    let base_case_position = (config.steps, config.steps);

    let matrix: Vec<Vec<SensitivityCell>> = wacc_values
        .iter()
        .enumerate()
        .map(|(i, wacc)| {
            terminal_growth_values
                .iter()
                .enumerate()
                .map(|(j, growth)| {
                    let cell = project_enterprise_value(
                        base.base_fcf,
                        &growth_schedule,
                        *wacc,
                        *growth,
                        base.market_cap,
                    )
                    .and_then(|ev| {
                        per_share_value(
                            ev.value,
                            base.net_debt.net_debt,
                            base.current_price,
                            base.market_cap,
                            GRID_FAIR_VALUE_BOUNDS,
                        )
                    });
                    match cell {
                        Some(v) => SensitivityCell::Valid {
                            fair_value: v.fair_value,
                            upside: relative_change(v.fair_value, base.current_price).unwrap_or_default(),
                            is_base_case: (i, j) == base_case_position,
                        },
                        None => SensitivityCell::Invalid,
                    }
                })
                .collect()
        })
        .collect();

    let cells = || matrix.iter().flatten();
    let fair_values: Vec<Money> = cells().filter_map(SensitivityCell::fair_value).collect();
    let mut upsides: Vec<Rate> = cells().filter_map(SensitivityCell::upside).collect();
    upsides.sort();

    let valid_cells = fair_values.len();
    let invalid_cells = cells().count() - valid_cells;
    if invalid_cells > 0 {
        warnings.push(format!(
            "{invalid_cells} grid cell(s) invalid: discount rate not above terminal growth"
        ));
    }

    let outlook = classify_outlook(&upsides);

    let output = SensitivityOutput {
        ticker: base.ticker.clone(),
        current_price: base.current_price,
        base_wacc: base.wacc,
        base_terminal_growth: base.terminal_growth,
        base_fair_value: base.fair_value,
        wacc_values,
        terminal_growth_values,
        matrix,
        base_case_position,
        valid_cells,
        invalid_cells,
        min_fair_value: fair_values.iter().min().copied(),
        max_fair_value: fair_values.iter().max().copied(),
        min_upside: upsides.first().copied(),
        max_upside: upsides.last().copied(),
        outlook,
        recommendation: outlook.recommendation().to_string(),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(Some(with_metadata(
        "DCF sensitivity: WACC x terminal growth grid",
        config,
        warnings,
        elapsed,
        output,
    )))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_config(config: &SensitivityConfig) -> FairValueResult<()> {
    if config.wacc_step <= Decimal::ZERO || config.growth_step <= Decimal::ZERO {
        return Err(FairValueError::InvalidInput {
            field: "sensitivity step".into(),
            reason: "Step sizes must be positive".into(),
        });
    }
    if config.steps == 0 || config.steps > 10 {
        return Err(FairValueError::InvalidInput {
            field: "steps".into(),
            reason: format!("Steps per side must be between 1 and 10, got {}", config.steps),
        });
    }
    Ok(())
}

/// `centre - steps*step ..= centre + steps*step`, ascending.
fn sweep(centre: Rate, step: Rate, steps: usize) -> Vec<Rate> {
    let n = steps as i64;
    (-n..=n).map(|k| centre + step * Decimal::from(k)).collect()
}

/// Outlook from the sorted upsides of the valid cells.
fn classify_outlook(sorted_upsides: &[Rate]) -> SensitivityOutlook {
    let (Some(worst), Some(best)) = (sorted_upsides.first(), sorted_upsides.last()) else {
        return SensitivityOutlook::Downside;
    };
    let median = sorted_upsides[sorted_upsides.len() / 2];
    if *worst > Decimal::ZERO {
        SensitivityOutlook::RobustUpside
    } else if median > Decimal::ZERO {
        SensitivityOutlook::BaseCaseUpside
    } else if *best > Decimal::ZERO {
        SensitivityOutlook::OptimisticOnly
    } else {
        SensitivityOutlook::Downside
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

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

    fn grid(record: &StockRecord, overrides: &DcfOverrides) -> SensitivityOutput {
        dcf_sensitivity(record, &AssumptionSet::builtin(), overrides, &SensitivityConfig::default())
            .unwrap()
            .unwrap()
            .result
    }

    #[test]
    fn test_grid_shape_and_axes() {
        let out = grid(&us_large_cap(), &DcfOverrides::new());
        assert_eq!(out.matrix.len(), 5);
        assert!(out.matrix.iter().all(|row| row.len() == 5));
        assert_eq!(out.wacc_values[2], out.base_wacc);
        assert_eq!(out.wacc_values[4] - out.wacc_values[0], dec!(0.02));
        assert_eq!(out.terminal_growth_values[0], dec!(0.020));
        assert_eq!(out.terminal_growth_values[4], dec!(0.030));
        assert_eq!(out.base_case_position, (2, 2));
        assert!(matches!(
            out.matrix[2][2],
            SensitivityCell::Valid { is_base_case: true, .. }
        ));
    }

    #[test]
    fn test_centre_matches_base_case() {
        let out = grid(&us_large_cap(), &DcfOverrides::new());
        assert_eq!(out.matrix[2][2].fair_value(), Some(out.base_fair_value));
    }

    #[test]
    fn test_monotonic_in_both_axes() {
        let out = grid(&us_large_cap(), &DcfOverrides::new());
        for row in &out.matrix {
            let fvs: Vec<Money> = row.iter().filter_map(SensitivityCell::fair_value).collect();
            assert!(fvs.windows(2).all(|w| w[0] < w[1]), "growth should raise value");
        }
        for j in 0..5 {
            let col: Vec<Money> = out.matrix.iter().filter_map(|r| r[j].fair_value()).collect();
            assert!(col.windows(2).all(|w| w[0] > w[1]), "discount rate should lower value");
        }
    }

    #[test]
    fn test_invalid_cells_marked() {
        let overrides = DcfOverrides::new()
            .with_wacc(dec!(0.04))
            .with_terminal_growth(dec!(0.025));
        let out = grid(&us_large_cap(), &overrides);
        // wacc 0.03 against growth 0.03 is invalid, the grid keeps its shape
        assert_eq!(out.matrix[0][4], SensitivityCell::Invalid);
        assert!(out.invalid_cells > 0);
        assert_eq!(out.valid_cells + out.invalid_cells, 25);
    }

    #[test]
    fn test_grid_bounds() {
        let out = grid(&us_large_cap(), &DcfOverrides::new().with_base_fcf(dec!(500_000_000_000)));
        for fv in out.matrix.iter().flatten().filter_map(SensitivityCell::fair_value) {
            assert!(fv >= dec!(200) && fv <= dec!(5000));
        }
    }

    #[test]
    fn test_outlook_classification() {
        assert_eq!(classify_outlook(&[dec!(0.1), dec!(0.2)]), SensitivityOutlook::RobustUpside);
        assert_eq!(
            classify_outlook(&[dec!(-0.1), dec!(0.1), dec!(0.2)]),
            SensitivityOutlook::BaseCaseUpside
        );
        assert_eq!(
            classify_outlook(&[dec!(-0.3), dec!(-0.1), dec!(0.2)]),
            SensitivityOutlook::OptimisticOnly
        );
        assert_eq!(classify_outlook(&[dec!(-0.3), dec!(-0.1)]), SensitivityOutlook::Downside);
        assert_eq!(classify_outlook(&[]), SensitivityOutlook::Downside);
    }

    #[test]
    fn test_zero_steps_rejected() {
        let config = SensitivityConfig {
            steps: 0,
            ..Default::default()
        };
        assert!(dcf_sensitivity(&us_large_cap(), &AssumptionSet::builtin(), &DcfOverrides::new(), &config).is_err());
    }
}
