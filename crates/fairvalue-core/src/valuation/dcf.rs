use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::assumptions::{AssumptionSet, SectorCategory};
use crate::stock::StockRecord;
use crate::types::{clamp, relative_change, safe_div, with_metadata, ComputationOutput, Confidence, Money, Rate};
use crate::valuation::capital_cost::{estimate_capital_cost, CapitalCost};
use crate::valuation::cash_flow::{estimate_fcff, CashFlowMethod, FcffEstimate};
use crate::valuation::config::{DcfConfig, DcfOverrides, GrowthBasis};
use crate::valuation::net_debt::{estimate_net_debt, NetDebtEstimate, NetDebtMethod};
use crate::FairValueResult;

/// Spread forced between WACC and terminal growth when the inputs invert them.
const WACC_REPAIR_SPREAD: Rate = dec!(0.03);
/// EV above this multiple of market cap is treated as a model blow-up...
const EV_CAP_TRIGGER: Decimal = dec!(5);
/// ...and replaced by this multiple.
const EV_CAP_VALUE: Decimal = dec!(3);

pub(crate) const BASE_FAIR_VALUE_BOUNDS: (Decimal, Decimal) = (dec!(0.5), dec!(2.5));

const TV_FAIL_SHARE: Rate = dec!(0.85);
const TV_WARNING_SHARE: Rate = dec!(0.75);
const TV_NOTE_SHARE: Rate = dec!(0.40);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One explicit forecast year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectedYear {
    pub year: u32,
    pub growth_rate: Rate,
    pub fcff: Money,
    pub discount_factor: Decimal,
    pub present_value: Money,
}

/// Terminal value share of enterprise value, graded against the usual
/// 40% / 75% / 85% thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalValueCheck {
    Pass,
    /// Below 40%: the explicit period carries most of the value
    Note,
    /// Above 75%
    Warning,
    /// Above 85%
    Fail,
    /// Enterprise value not positive, so no share can be computed
    Undefined,
}

impl TerminalValueCheck {
    pub fn from_share(share: Option<Rate>) -> Self {
        match share {
            None => Self::Undefined,
            Some(s) if s > TV_FAIL_SHARE => Self::Fail,
            Some(s) if s > TV_WARNING_SHARE => Self::Warning,
            Some(s) if s < TV_NOTE_SHARE => Self::Note,
            Some(_) => Self::Pass,
        }
    }
}

/// Output of a single-company DCF valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfOutput {
    pub ticker: String,
    pub sector: SectorCategory,
    pub current_price: Money,
    pub market_cap: Money,
    /// Per-share fair value after clamping to [0.5x, 2.5x] price
    pub fair_value: Money,
    /// Fair value / price - 1
    pub upside: Rate,
    pub fair_value_clamped: bool,

    /// Discount rate actually applied
    pub wacc: Rate,
    /// True when WACC had to be lifted above terminal growth
    pub wacc_adjusted: bool,
    pub capital_cost: CapitalCost,

    pub initial_growth: Rate,
    pub growth_basis: GrowthBasis,
    pub terminal_growth: Rate,
    pub forecast_years: u32,
    pub base_fcf: Money,
    pub cash_flow: FcffEstimate,
    pub projections: Vec<ProjectedYear>,

    pub pv_forecast: Money,
    pub terminal_value: Money,
    pub pv_terminal_value: Money,
    pub uncapped_enterprise_value: Money,
    pub enterprise_value: Money,
    pub ev_capped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_value_share: Option<Rate>,
    pub terminal_value_check: TerminalValueCheck,

    pub net_debt: NetDebtEstimate,
    pub equity_value: Money,

    pub confidence: Confidence,
    /// 0-100 data-quality score behind `confidence`
    pub confidence_score: u32,
}

/// Enterprise value built from a growth schedule.
#[derive(Debug, Clone)]
pub(crate) struct EnterpriseValue {
    pub projections: Vec<ProjectedYear>,
    pub pv_forecast: Money,
    pub terminal_value: Money,
    pub pv_terminal_value: Money,
    pub uncapped: Money,
    pub value: Money,
    pub capped: bool,
}

impl EnterpriseValue {
    pub fn terminal_value_share(&self) -> Option<Rate> {
        if self.uncapped <= Decimal::ZERO {
            return None;
        }
        safe_div(self.pv_terminal_value, self.uncapped)
    }
}

/// Equity bridge and per-share value.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PerShareValue {
    pub equity_value: Money,
    pub fair_value: Money,
    pub clamped: bool,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Value one company by discounting projected FCFF at its WACC.
///
/// Returns `Ok(None)` when market cap or price is missing or not positive.
/// An unknown region or invalid overrides are errors.
pub fn value_dcf(
    record: &StockRecord,
    assumptions: &AssumptionSet,
    overrides: &DcfOverrides,
) -> FairValueResult<Option<ComputationOutput<DcfOutput>>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let Some((output, config)) = compute_dcf(record, assumptions, overrides, &mut warnings)? else {
        return Ok(None);
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(Some(with_metadata(
        "DCF (FCFF, linear growth decay, Gordon growth terminal value)",
        &config,
        warnings,
        elapsed,
        output,
    )))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// DCF without the output envelope; shared with the Monte Carlo engine.
pub(crate) fn compute_dcf(
    record: &StockRecord,
    assumptions: &AssumptionSet,
    overrides: &DcfOverrides,
    warnings: &mut Vec<String>,
) -> FairValueResult<Option<(DcfOutput, DcfConfig)>> {
    let region = assumptions.region(&record.region)?;
    record.validate()?;

    let (Some(market_cap), Some(price)) = (record.valid_market_cap(), record.valid_price()) else {
        debug!(ticker = %record.ticker, "no positive market cap and price, declining DCF");
        return Ok(None);
    };

    let sector = assumptions.sector(record.category());
    let config = overrides.resolve(&record.region, region, record, warnings)?;
    let capital_cost = estimate_capital_cost(record, region, sector, &config);

    let cash_flow = match config.base_fcf {
        Some(fcff) => FcffEstimate {
            fcff,
            method: CashFlowMethod::Override,
            confidence: Confidence::Medium,
            fcf_yield: safe_div(fcff, market_cap).unwrap_or_default(),
            rejected: Vec::new(),
            build_up: None,
        },
        None => match estimate_fcff(record, sector, config.tax_rate) {
            Some(estimate) => estimate,
            None => return Ok(None),
        },
    };

    let mut wacc = capital_cost.wacc;
    let mut wacc_adjusted = false;
    if wacc <= config.terminal_growth {
        let repaired = config.terminal_growth + WACC_REPAIR_SPREAD;
        warn!(ticker = %record.ticker, %wacc, terminal_growth = %config.terminal_growth, "WACC not above terminal growth, lifting");
        warnings.push(format!(
            "WACC {wacc} did not exceed terminal growth {}; raised to {repaired}",
            config.terminal_growth
        ));
        wacc = repaired;
        wacc_adjusted = true;
    }

    let schedule = config.growth_schedule();
    let Some(ev) = project_enterprise_value(
        cash_flow.fcff,
        &schedule,
        wacc,
        config.terminal_growth,
        market_cap,
    ) else {
        debug!(ticker = %record.ticker, "enterprise value not representable, declining DCF");
        return Ok(None);
    };
    if ev.capped {
        warn!(ticker = %record.ticker, uncapped = %ev.uncapped, "enterprise value capped");
        warnings.push(format!(
            "Enterprise value {} exceeded {EV_CAP_TRIGGER}x market cap; capped at {EV_CAP_VALUE}x",
            ev.uncapped.round_dp(0)
        ));
    }

    let tv_share = ev.terminal_value_share();
    let tv_check = TerminalValueCheck::from_share(tv_share);

    let net_debt = estimate_net_debt(record, sector, market_cap);
    let Some(per_share) = per_share_value(
        ev.value,
        net_debt.net_debt,
        price,
        market_cap,
        BASE_FAIR_VALUE_BOUNDS,
    ) else {
        return Ok(None);
    };
    if per_share.clamped {
        warnings.push(format!(
            "Fair value clamped to {}-{}x of current price",
            BASE_FAIR_VALUE_BOUNDS.0, BASE_FAIR_VALUE_BOUNDS.1
        ));
    }
    let upside = relative_change(per_share.fair_value, price).unwrap_or_default();

    let confidence_score = score_confidence(record, &cash_flow, &net_debt, tv_share, warnings.len());
    let confidence = confidence_label(confidence_score);

    let output = DcfOutput {
        ticker: record.ticker.clone(),
        sector: record.category(),
        current_price: price,
        market_cap,
        fair_value: per_share.fair_value,
        upside,
        fair_value_clamped: per_share.clamped,
        wacc,
        wacc_adjusted,
        capital_cost,
        initial_growth: config.initial_growth,
        growth_basis: config.growth_basis,
        terminal_growth: config.terminal_growth,
        forecast_years: config.forecast_years,
        base_fcf: cash_flow.fcff,
        cash_flow,
        projections: ev.projections,
        pv_forecast: ev.pv_forecast,
        terminal_value: ev.terminal_value,
        pv_terminal_value: ev.pv_terminal_value,
        uncapped_enterprise_value: ev.uncapped,
        enterprise_value: ev.value,
        ev_capped: ev.capped,
        terminal_value_share: tv_share,
        terminal_value_check: tv_check,
        net_debt,
        equity_value: per_share.equity_value,
        confidence,
        confidence_score,
    };
    Ok(Some((output, config)))
}

/// Compound `base_fcf` through `growth_rates`, discount at `wacc` with
/// end-of-year timing and add a Gordon growth terminal value.
///
/// `None` when `wacc <= terminal_growth` or the arithmetic is undefined
/// (a zero divisor or a value outside the Decimal range).
pub(crate) fn project_enterprise_value(
    base_fcf: Money,
    growth_rates: &[Rate],
    wacc: Rate,
    terminal_growth: Rate,
    market_cap: Money,
) -> Option<EnterpriseValue> {
    if wacc <= terminal_growth {
        return None;
    }
    let one_plus_wacc = Decimal::ONE + wacc;
    if one_plus_wacc <= Decimal::ZERO {
        return None;
    }

    let mut fcff = base_fcf;
    let mut discount_factor = Decimal::ONE;
    let mut pv_forecast = Decimal::ZERO;
    let mut projections = Vec::with_capacity(growth_rates.len());

    for (idx, growth_rate) in growth_rates.iter().enumerate() {
        let year = idx as u32 + 1;
        fcff = fcff.checked_mul(Decimal::ONE + growth_rate)?;
        discount_factor = safe_div(Decimal::ONE, one_plus_wacc.checked_powi(year as i64)?)?;
        let present_value = fcff.checked_mul(discount_factor)?;
        pv_forecast = pv_forecast.checked_add(present_value)?;
        projections.push(ProjectedYear {
            year,
            growth_rate: *growth_rate,
            fcff,
            discount_factor,
            present_value,
        });
    }

    let terminal_value = safe_div(fcff.checked_mul(Decimal::ONE + terminal_growth)?, wacc - terminal_growth)?;
    let pv_terminal_value = terminal_value.checked_mul(discount_factor)?;
    let uncapped = pv_forecast.checked_add(pv_terminal_value)?;

    let (value, capped) = if uncapped > market_cap.checked_mul(EV_CAP_TRIGGER)? {
        (market_cap.checked_mul(EV_CAP_VALUE)?, true)
    } else {
        (uncapped, false)
    };

    Some(EnterpriseValue {
        projections,
        pv_forecast,
        terminal_value,
        pv_terminal_value,
        uncapped,
        value,
        capped,
    })
}

/// Equity = EV - net debt (floored at zero), scaled to a per-share figure
/// through the price / market cap ratio and clamped to `bounds` x price.
pub(crate) fn per_share_value(
    enterprise_value: Money,
    net_debt: Money,
    price: Money,
    market_cap: Money,
    bounds: (Decimal, Decimal),
) -> Option<PerShareValue> {
    let equity_value = (enterprise_value - net_debt).max(Decimal::ZERO);
    let raw = price.checked_mul(safe_div(equity_value, market_cap)?)?;
    let fair_value = clamp(raw, price * bounds.0, price * bounds.1);
    Some(PerShareValue {
        equity_value,
        fair_value,
        clamped: fair_value != raw,
    })
}

fn score_confidence(
    record: &StockRecord,
    cash_flow: &FcffEstimate,
    net_debt: &NetDebtEstimate,
    tv_share: Option<Rate>,
    warning_count: usize,
) -> u32 {
    let mut score: i32 = 50;

    if cash_flow.method == CashFlowMethod::DirectFcf {
        score += 10;
    }
    if record.beta.is_some() {
        score += 5;
    }
    if record.ebitda_margin.is_some() {
        score += 5;
    }
    if record.interest_coverage.is_some() {
        score += 5;
    }
    if net_debt.method == NetDebtMethod::BalanceSheet {
        score += 10;
    }

    match tv_share {
        Some(s) if s > TV_FAIL_SHARE => score -= 15,
        Some(s) if s > TV_WARNING_SHARE => score -= 5,
        _ => {}
    }
    score -= (5 * warning_count as i32).min(15);
    score -= match cash_flow.confidence {
        Confidence::Low => 15,
        Confidence::MediumLow => 5,
        _ => 0,
    };

    score.clamp(0, 100) as u32
}

fn confidence_label(score: u32) -> Confidence {
    match score {
        70.. => Confidence::High,
        55..=69 => Confidence::Medium,
        40..=54 => Confidence::MediumLow,
        _ => Confidence::Low,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
