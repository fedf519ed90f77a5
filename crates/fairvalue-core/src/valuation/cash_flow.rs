//! Free-cash-flow-to-firm estimation.
//!
//! Five strategies are tried in a fixed order. Each one either produces an
//! estimate that passes its own plausibility gate or declines, handing over
//! to the next. The sector-yield fallback never declines while market cap
//! is positive.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assumptions::SectorProfile;
use crate::stock::StockRecord;
use crate::types::{clamp, pct_to_rate, safe_div, Confidence, Money, Rate};

const MIN_DIRECT_FCF_YIELD: Rate = dec!(0.005);
const MAX_FCF_TO_NET_INCOME: Decimal = dec!(100);
const MIN_NET_INCOME_YIELD: Rate = dec!(0.003);
const MIN_REVENUE_YIELD: Decimal = dec!(0.01);
const MAX_REVENUE_YIELD: Decimal = dec!(20);
const MIN_REPORTED_PS: Decimal = dec!(0.05);
const MAX_REPORTED_PS: Decimal = dec!(100);
const MIN_BUILD_UP_YIELD: Rate = dec!(0.005);
const MAX_BUILD_UP_YIELD: Rate = dec!(0.25);
const MAX_ROE: Rate = dec!(0.50);
const MAX_REINVESTMENT: Rate = dec!(0.9);
const MIN_ROE_YIELD: Rate = dec!(0.003);
const GROWTH_FLOOR_PCT: Decimal = dec!(-20);
const GROWTH_CAP_PCT: Decimal = dec!(40);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashFlowMethod {
    #[serde(rename = "Direct FCF")]
    DirectFcf,
    #[serde(rename = "Net Income Conversion")]
    NetIncomeConversion,
    #[serde(rename = "EBITDA Build-up")]
    EbitdaBuildUp,
    #[serde(rename = "ROE Reinvestment")]
    RoeReinvestment,
    #[serde(rename = "Sector FCF Yield")]
    SectorYield,
    /// Base FCF supplied by the caller
    Override,
}

impl std::fmt::Display for CashFlowMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DirectFcf => "Direct FCF",
            Self::NetIncomeConversion => "Net Income Conversion",
            Self::EbitdaBuildUp => "EBITDA Build-up",
            Self::RoeReinvestment => "ROE Reinvestment",
            Self::SectorYield => "Sector FCF Yield",
            Self::Override => "Override",
        };
        write!(f, "{s}")
    }
}

/// How revenue was obtained for the EBITDA build-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevenueSource {
    Reported,
    ReportedPriceToSales,
    SectorPriceToSales,
}

/// Operating bridge behind an EBITDA build-up estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildUpComponents {
    pub revenue: Money,
    pub revenue_source: RevenueSource,
    pub ebitda: Money,
    pub depreciation: Money,
    pub ebit: Money,
    pub nopat: Money,
    pub capex: Money,
    pub change_in_nwc: Money,
}

/// One FCFF estimate with the strategy that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcffEstimate {
    pub fcff: Money,
    pub method: CashFlowMethod,
    pub confidence: Confidence,
    /// FCFF / market cap
    pub fcf_yield: Rate,
    /// Strategies tried before this one and rejected
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<CashFlowMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_up: Option<BuildUpComponents>,
}

/// Everything a strategy may look at.
pub struct CashFlowContext<'a> {
    pub record: &'a StockRecord,
    pub sector: &'a SectorProfile,
    pub market_cap: Money,
    pub tax_rate: Rate,
}

impl CashFlowContext<'_> {
    fn yield_of(&self, amount: Money) -> Option<Rate> {
        safe_div(amount, self.market_cap)
    }

    fn estimate(&self, fcff: Money, method: CashFlowMethod, confidence: Confidence) -> Option<FcffEstimate> {
        Some(FcffEstimate {
            fcff,
            method,
            confidence,
            fcf_yield: self.yield_of(fcff)?,
            rejected: Vec::new(),
            build_up: None,
        })
    }
}

/// A single FCFF estimation strategy. Returns `None` when its inputs are
/// missing or its result fails the plausibility gate.
pub trait FcffStrategy: Sync {
    fn method(&self) -> CashFlowMethod;
    fn attempt(&self, ctx: &CashFlowContext<'_>) -> Option<FcffEstimate>;
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Reported free cash flow, taken as-is.
pub struct DirectFcf;

impl FcffStrategy for DirectFcf {
    fn method(&self) -> CashFlowMethod {
        CashFlowMethod::DirectFcf
    }

    fn attempt(&self, ctx: &CashFlowContext<'_>) -> Option<FcffEstimate> {
        let fcf = ctx.record.fcf?;
        if ctx.yield_of(fcf)? < MIN_DIRECT_FCF_YIELD {
            return None;
        }
        if let Some(ni) = ctx.record.net_income.filter(|n| *n > Decimal::ZERO) {
            if safe_div(fcf, ni)? >= MAX_FCF_TO_NET_INCOME {
                return None;
            }
        }
        ctx.estimate(fcf, self.method(), Confidence::High)
    }
}

/// Net income scaled by the sector's cash conversion rate.
pub struct NetIncomeConversion;

impl FcffStrategy for NetIncomeConversion {
    fn method(&self) -> CashFlowMethod {
        CashFlowMethod::NetIncomeConversion
    }

    fn attempt(&self, ctx: &CashFlowContext<'_>) -> Option<FcffEstimate> {
        let ni = ctx.record.net_income?;
        if ctx.yield_of(ni)? < MIN_NET_INCOME_YIELD {
            return None;
        }
        let fcff = ni * ctx.sector.fcf_conversion;
        ctx.estimate(fcff, self.method(), Confidence::Medium)
    }
}

/// Revenue → EBITDA → NOPAT + D&A − CapEx − ΔNWC.
pub struct EbitdaBuildUp;

impl EbitdaBuildUp {
    fn revenue(ctx: &CashFlowContext<'_>) -> Option<(Money, RevenueSource)> {
        let reported = ctx.record.revenue.filter(|r| {
            ctx.yield_of(*r)
                .is_some_and(|y| y >= MIN_REVENUE_YIELD && y <= MAX_REVENUE_YIELD)
        });
        if let Some(r) = reported {
            return Some((r, RevenueSource::Reported));
        }
        if let Some(ps) = ctx
            .record
            .ps
            .filter(|ps| *ps > MIN_REPORTED_PS && *ps <= MAX_REPORTED_PS)
        {
            return Some((safe_div(ctx.market_cap, ps)?, RevenueSource::ReportedPriceToSales));
        }
        Some((
            safe_div(ctx.market_cap, ctx.sector.typical_price_to_sales)?,
            RevenueSource::SectorPriceToSales,
        ))
    }

    fn margin(ctx: &CashFlowContext<'_>) -> Option<Rate> {
        if let Some(m) = ctx.record.ebitda_margin {
            return Some(pct_to_rate(m));
        }
        // Fall back to reported EBITDA over reported revenue.
        safe_div(ctx.record.ebitda?, ctx.record.revenue?)
    }
}

impl FcffStrategy for EbitdaBuildUp {
    fn method(&self) -> CashFlowMethod {
        CashFlowMethod::EbitdaBuildUp
    }

    fn attempt(&self, ctx: &CashFlowContext<'_>) -> Option<FcffEstimate> {
        let margin = Self::margin(ctx)?;
        let (revenue, revenue_source) = Self::revenue(ctx)?;

        let ebitda = revenue * margin;
        let depreciation = ebitda * ctx.sector.da_to_ebitda;
        let ebit = ebitda - depreciation;
        let nopat = ebit * (Decimal::ONE - ctx.tax_rate);
        let capex = depreciation * ctx.sector.capex_to_da;
        let growth = ctx
            .record
            .revenue_growth
            .map(|g| pct_to_rate(clamp(g, GROWTH_FLOOR_PCT, GROWTH_CAP_PCT)))
            .unwrap_or(Decimal::ZERO);
        let change_in_nwc = revenue * growth * ctx.sector.nwc_to_revenue_growth;
        let fcff = nopat + depreciation - capex - change_in_nwc;

        let fcf_yield = ctx.yield_of(fcff)?;
        if fcf_yield < MIN_BUILD_UP_YIELD || fcf_yield > MAX_BUILD_UP_YIELD {
            return None;
        }
        let confidence = match revenue_source {
            RevenueSource::Reported => Confidence::Medium,
            _ => Confidence::MediumLow,
        };
        let mut estimate = ctx.estimate(fcff, self.method(), confidence)?;
        estimate.build_up = Some(BuildUpComponents {
            revenue,
            revenue_source,
            ebitda,
            depreciation,
            ebit,
            nopat,
            capex,
            change_in_nwc,
        });
        Some(estimate)
    }
}

/// Book equity × ROE, less the reinvestment needed to fund growth.
pub struct RoeReinvestment;

impl FcffStrategy for RoeReinvestment {
    fn method(&self) -> CashFlowMethod {
        CashFlowMethod::RoeReinvestment
    }

    fn attempt(&self, ctx: &CashFlowContext<'_>) -> Option<FcffEstimate> {
        let roe = ctx.record.roe.filter(|r| *r > Decimal::ZERO)?;
        let pb = ctx.record.pb.filter(|p| *p > Decimal::ZERO)?;
        let book_equity = safe_div(ctx.market_cap, pb)?;
        let roe = pct_to_rate(roe).min(MAX_ROE);
        let net_income = book_equity * roe;

        let growth = ctx
            .record
            .revenue_growth
            .or_else(|| ctx.record.earnings_growth())
            .map(|g| pct_to_rate(clamp(g, GROWTH_FLOOR_PCT, GROWTH_CAP_PCT)))
            .unwrap_or(Decimal::ZERO);
        let reinvestment = clamp(
            safe_div(growth.max(Decimal::ZERO), roe)?,
            Decimal::ZERO,
            MAX_REINVESTMENT,
        );
        let fcff = net_income * (Decimal::ONE - reinvestment);

        if ctx.yield_of(fcff)? < MIN_ROE_YIELD {
            return None;
        }
        ctx.estimate(fcff, self.method(), Confidence::MediumLow)
    }
}

/// Market cap times the sector's typical FCF yield.
pub struct SectorYield;

impl FcffStrategy for SectorYield {
    fn method(&self) -> CashFlowMethod {
        CashFlowMethod::SectorYield
    }

    fn attempt(&self, ctx: &CashFlowContext<'_>) -> Option<FcffEstimate> {
        let fcff = ctx.market_cap * ctx.sector.typical_fcf_yield;
        ctx.estimate(fcff, self.method(), Confidence::Low)
    }
}

/// Strategies in priority order.
pub static CASCADE: [&dyn FcffStrategy; 5] = [
    &DirectFcf,
    &NetIncomeConversion,
    &EbitdaBuildUp,
    &RoeReinvestment,
    &SectorYield,
];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run `strategies` in order and return the first estimate that passes.
pub fn run_cascade(
    strategies: &[&dyn FcffStrategy],
    ctx: &CashFlowContext<'_>,
) -> Option<FcffEstimate> {
    let mut rejected = Vec::new();
    for strategy in strategies {
        match strategy.attempt(ctx) {
            Some(mut estimate) => {
                debug!(
                    ticker = %ctx.record.ticker,
                    method = %estimate.method,
                    fcff = %estimate.fcff,
                    "cash flow strategy accepted"
                );
                estimate.rejected = rejected;
                return Some(estimate);
            }
            None => {
                debug!(ticker = %ctx.record.ticker, method = %strategy.method(), "cash flow strategy declined");
                rejected.push(strategy.method());
            }
        }
    }
    None
}

/// Estimate base-year FCFF for `record`. Absent only when market cap is not positive.
pub fn estimate_fcff(
    record: &StockRecord,
    sector: &SectorProfile,
    tax_rate: Rate,
) -> Option<FcffEstimate> {
    let ctx = CashFlowContext {
        record,
        sector,
        market_cap: record.valid_market_cap()?,
        tax_rate,
    };
    run_cascade(&CASCADE, &ctx)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::SectorCategory;

    const TAX: Rate = dec!(0.21);

    fn base_record() -> StockRecord {
        StockRecord {
            market_cap: Some(dec!(1_000_000)),
            price: Some(dec!(10)),
            ..StockRecord::new("CF", "US")
        }
    }

    fn fallback() -> SectorProfile {
        SectorProfile::fallback()
    }

    #[test]
    fn test_direct_fcf_wins_over_net_income() {
        let rec = StockRecord {
            fcf: Some(dec!(60_000)),
            net_income: Some(dec!(80_000)),
            ..base_record()
        };
        let est = estimate_fcff(&rec, &fallback(), TAX).unwrap();
        assert_eq!(est.method, CashFlowMethod::DirectFcf);
        assert_eq!(est.confidence, Confidence::High);
        assert_eq!(est.fcff, dec!(60_000));
        assert_eq!(est.fcf_yield, dec!(0.06));
        assert!(est.rejected.is_empty());
    }

    #[test]
    fn test_low_fcf_yield_falls_through_to_net_income() {
        let rec = StockRecord {
            fcf: Some(dec!(1_000)),
            net_income: Some(dec!(80_000)),
            ..base_record()
        };
        let sector = SectorProfile::for_category(SectorCategory::Technology);
        let est = estimate_fcff(&rec, &sector, TAX).unwrap();
        assert_eq!(est.method, CashFlowMethod::NetIncomeConversion);
        assert_eq!(est.fcff, dec!(64_000));
        assert_eq!(est.rejected, vec![CashFlowMethod::DirectFcf]);
    }

    #[test]
    fn test_implausible_fcf_to_net_income_rejected() {
        let rec = StockRecord {
            fcf: Some(dec!(200_000)),
            net_income: Some(dec!(1_000)),
            ..base_record()
        };
        let est = estimate_fcff(&rec, &fallback(), TAX).unwrap();
        assert_ne!(est.method, CashFlowMethod::DirectFcf);
    }

    #[test]
    fn test_ebitda_build_up_with_sector_ps() {
        let rec = StockRecord {
            ebitda_margin: Some(dec!(20)),
            revenue_growth: Some(dec!(8)),
            ..base_record()
        };
        let est = estimate_fcff(&rec, &fallback(), TAX).unwrap();
        assert_eq!(est.method, CashFlowMethod::EbitdaBuildUp);
        assert_eq!(est.confidence, Confidence::MediumLow);
        let parts = est.build_up.unwrap();
        assert_eq!(parts.revenue_source, RevenueSource::SectorPriceToSales);
        assert_eq!(parts.revenue, dec!(500_000));
        assert_eq!(parts.ebitda, dec!(100_000));
        assert_eq!(parts.depreciation, dec!(25_000));
        assert_eq!(parts.capex, dec!(30_000));
        assert_eq!(parts.change_in_nwc, dec!(4_000));
        // 75_000 * 0.79 + 25_000 - 30_000 - 4_000
        assert_eq!(est.fcff, dec!(50_250));
    }

    #[test]
    fn test_ebitda_build_up_prefers_reported_revenue() {
        let rec = StockRecord {
            ebitda_margin: Some(dec!(25)),
            revenue: Some(dec!(400_000)),
            ..base_record()
        };
        let est = estimate_fcff(&rec, &fallback(), TAX).unwrap();
        assert_eq!(est.confidence, Confidence::Medium);
        assert_eq!(est.build_up.unwrap().revenue_source, RevenueSource::Reported);
    }

    #[test]
    fn test_negative_margin_falls_through() {
        let rec = StockRecord {
            ebitda_margin: Some(dec!(-10)),
            ..base_record()
        };
        let est = estimate_fcff(&rec, &fallback(), TAX).unwrap();
        assert_eq!(est.method, CashFlowMethod::SectorYield);
        assert_eq!(
            est.rejected,
            vec![
                CashFlowMethod::DirectFcf,
                CashFlowMethod::NetIncomeConversion,
                CashFlowMethod::EbitdaBuildUp,
                CashFlowMethod::RoeReinvestment,
            ]
        );
    }

    #[test]
    fn test_roe_reinvestment() {
        let rec = StockRecord {
            roe: Some(dec!(20)),
            pb: Some(dec!(2)),
            revenue_growth: Some(dec!(5)),
            ..base_record()
        };
        let est = estimate_fcff(&rec, &fallback(), TAX).unwrap();
        assert_eq!(est.method, CashFlowMethod::RoeReinvestment);
        // book 500_000, NI 100_000, reinvestment 0.05 / 0.20 = 0.25
        assert_eq!(est.fcff, dec!(75_000));
    }

    #[test]
    fn test_sector_yield_fallback_always_succeeds() {
        let sector = SectorProfile::for_category(SectorCategory::Technology);
        let est = estimate_fcff(&base_record(), &sector, TAX).unwrap();
        assert_eq!(est.method, CashFlowMethod::SectorYield);
        assert_eq!(est.confidence, Confidence::Low);
        assert_eq!(est.fcff, dec!(35_000));
    }

    #[test]
    fn test_no_market_cap_yields_none() {
        let rec = StockRecord {
            market_cap: Some(Decimal::ZERO),
            fcf: Some(dec!(100)),
            ..base_record()
        };
        assert!(estimate_fcff(&rec, &fallback(), TAX).is_none());
    }

    #[test]
    fn test_custom_cascade_order() {
        let rec = StockRecord {
            fcf: Some(dec!(60_000)),
            net_income: Some(dec!(80_000)),
            ..base_record()
        };
        let ctx = CashFlowContext {
            record: &rec,
            sector: &fallback(),
            market_cap: dec!(1_000_000),
            tax_rate: TAX,
        };
        let est = run_cascade(&[&NetIncomeConversion, &DirectFcf], &ctx).unwrap();
        assert_eq!(est.method, CashFlowMethod::NetIncomeConversion);
    }
}
