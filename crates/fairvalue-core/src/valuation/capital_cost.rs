use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::assumptions::{CreditRating, RegionAssumptions, SectorProfile};
use crate::stock::StockRecord;
use crate::types::{clamp, Rate};
use crate::valuation::config::DcfConfig;

/// Blume weights: adjusted = 0.67 * raw + 0.33 * 1.0
const BLUME_RAW_WEIGHT: Decimal = dec!(0.67);
const BLUME_MARKET_WEIGHT: Decimal = dec!(0.33);
const MIN_BETA: Decimal = dec!(0.4);
const MAX_BETA: Decimal = dec!(2.5);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which table produced the synthetic rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatingMethod {
    InterestCoverage,
    DebtToEquity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticRating {
    pub rating: CreditRating,
    pub spread: Rate,
    pub method: RatingMethod,
}

/// Cost of capital breakdown for one company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalCost {
    /// Beta as reported, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_beta: Option<Decimal>,
    /// Beta used in CAPM (mean-reverted and clamped, or the override)
    pub beta: Decimal,
    pub risk_free_rate: Rate,
    pub equity_risk_premium: Rate,
    pub country_risk_premium: Rate,
    pub sector_risk_premium: Rate,
    pub cost_of_equity: Rate,
    /// Normalised debt-to-equity ratio
    pub debt_to_equity: Decimal,
    pub equity_weight: Rate,
    pub debt_weight: Rate,
    /// Absent when the pre-tax cost of debt was overridden
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthetic_rating: Option<SyntheticRating>,
    pub pre_tax_cost_of_debt: Rate,
    pub after_tax_cost_of_debt: Rate,
    pub tax_rate: Rate,
    pub wacc: Rate,
    /// True when the WACC itself was supplied by the caller
    pub wacc_overridden: bool,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Pull a raw beta toward 1.0 and clamp it to [0.4, 2.5].
pub fn adjust_beta(raw: Decimal) -> Decimal {
    clamp(
        BLUME_RAW_WEIGHT * raw + BLUME_MARKET_WEIGHT,
        MIN_BETA,
        MAX_BETA,
    )
}

/// Synthetic credit rating from interest coverage when reported, else from
/// the debt-to-equity buckets.
pub fn synthetic_rating(
    record: &StockRecord,
    region: &RegionAssumptions,
    debt_to_equity: Decimal,
) -> Option<SyntheticRating> {
    if let Some(coverage) = record.interest_coverage {
        if let Some(tier) = region.rating_for_coverage(coverage) {
            return Some(SyntheticRating {
                rating: tier.rating,
                spread: tier.spread,
                method: RatingMethod::InterestCoverage,
            });
        }
    }
    region
        .rating_for_debt_to_equity(debt_to_equity)
        .map(|bucket| SyntheticRating {
            rating: bucket.rating,
            spread: bucket.spread,
            method: RatingMethod::DebtToEquity,
        })
}

/// CAPM cost of equity, synthetic-rating cost of debt and the WACC that
/// weights them by the normalised debt-to-equity ratio.
pub fn estimate_capital_cost(
    record: &StockRecord,
    region: &RegionAssumptions,
    sector: &SectorProfile,
    config: &DcfConfig,
) -> CapitalCost {
    let raw_beta = record.beta;
    let beta = config
        .beta
        .unwrap_or_else(|| adjust_beta(raw_beta.unwrap_or(Decimal::ONE)));

    let cost_of_equity = config.risk_free_rate
        + beta * config.equity_risk_premium
        + config.country_risk_premium
        + sector.risk_premium;

    let debt_to_equity = config
        .de_ratio
        .or_else(|| record.normalized_de())
        .unwrap_or(sector.typical_debt_to_equity);
    let debt_weight = debt_to_equity / (Decimal::ONE + debt_to_equity);
    let equity_weight = Decimal::ONE - debt_weight;

    let (rating, pre_tax_cost_of_debt) = match config.cost_of_debt {
        Some(kd) => (None, kd),
        None => {
            let rating = synthetic_rating(record, region, debt_to_equity);
            let spread = rating.as_ref().map(|r| r.spread).unwrap_or_default();
            (rating, config.risk_free_rate + spread)
        }
    };
    let after_tax_cost_of_debt = pre_tax_cost_of_debt * (Decimal::ONE - config.tax_rate);

    let computed_wacc = equity_weight * cost_of_equity + debt_weight * after_tax_cost_of_debt;

    CapitalCost {
        raw_beta,
        beta,
        risk_free_rate: config.risk_free_rate,
        equity_risk_premium: config.equity_risk_premium,
        country_risk_premium: config.country_risk_premium,
        sector_risk_premium: sector.risk_premium,
        cost_of_equity,
        debt_to_equity,
        equity_weight,
        debt_weight,
        synthetic_rating: rating,
        pre_tax_cost_of_debt,
        after_tax_cost_of_debt,
        tax_rate: config.tax_rate,
        wacc: config.wacc.unwrap_or(computed_wacc),
        wacc_overridden: config.wacc.is_some(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::SectorCategory;
    use crate::valuation::config::DcfOverrides;

    fn us_config(record: &StockRecord, overrides: &DcfOverrides) -> DcfConfig {
        overrides
            .resolve("US", &RegionAssumptions::united_states(), record, &mut Vec::new())
            .unwrap()
    }

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

    #[test]
    fn test_beta_mean_reversion() {
        assert_eq!(adjust_beta(dec!(1.0)), dec!(1.00));
        assert_eq!(adjust_beta(dec!(1.5)), dec!(1.335));
        assert_eq!(adjust_beta(dec!(0.0)), dec!(0.4));
        assert_eq!(adjust_beta(dec!(5.0)), dec!(2.5));
    }

    #[test]
    fn test_us_large_cap_wacc() {
        let rec = us_large_cap();
        let sector = SectorProfile::for_category(SectorCategory::Unclassified);
        let cc = estimate_capital_cost(
            &rec,
            &RegionAssumptions::united_states(),
            &sector,
            &us_config(&rec, &DcfOverrides::new()),
        );
        assert_eq!(cc.debt_to_equity, dec!(0.5));
        // 0.0435 + 1.0 * 0.055 + 0 + 0.01
        assert_eq!(cc.cost_of_equity, dec!(0.1085));
        let rating = cc.synthetic_rating.as_ref().unwrap();
        assert_eq!(rating.method, RatingMethod::DebtToEquity);
        assert_eq!(rating.rating, CreditRating::BBB);
        assert!(cc.wacc > dec!(0.085) && cc.wacc < dec!(0.10), "wacc {}", cc.wacc);
        assert!(!cc.wacc_overridden);
    }

    #[test]
    fn test_coverage_preferred_over_ratio() {
        let mut rec = us_large_cap();
        rec.interest_coverage = Some(dec!(13));
        let sector = SectorProfile::fallback();
        let cc = estimate_capital_cost(
            &rec,
            &RegionAssumptions::united_states(),
            &sector,
            &us_config(&rec, &DcfOverrides::new()),
        );
        let rating = cc.synthetic_rating.unwrap();
        assert_eq!(rating.method, RatingMethod::InterestCoverage);
        assert_eq!(rating.rating, CreditRating::AAA);
        assert_eq!(cc.pre_tax_cost_of_debt, dec!(0.0435) + dec!(0.0063));
    }

    #[test]
    fn test_missing_de_uses_sector_typical() {
        let mut rec = us_large_cap();
        rec.de = None;
        let sector = SectorProfile::for_category(SectorCategory::Utilities);
        let cc = estimate_capital_cost(
            &rec,
            &RegionAssumptions::united_states(),
            &sector,
            &us_config(&rec, &DcfOverrides::new()),
        );
        assert_eq!(cc.debt_to_equity, dec!(1.2));
    }

    #[test]
    fn test_overrides_substitute_components() {
        let rec = us_large_cap();
        let overrides = DcfOverrides {
            beta: Some(dec!(1.2)),
            cost_of_debt: Some(dec!(0.07)),
            de_ratio: Some(Decimal::ZERO),
            ..Default::default()
        };
        let cc = estimate_capital_cost(
            &rec,
            &RegionAssumptions::united_states(),
            &SectorProfile::fallback(),
            &us_config(&rec, &overrides),
        );
        assert_eq!(cc.beta, dec!(1.2));
        assert!(cc.synthetic_rating.is_none());
        assert_eq!(cc.debt_weight, Decimal::ZERO);
        assert_eq!(cc.wacc, cc.cost_of_equity);
    }

    #[test]
    fn test_wacc_override() {
        let rec = us_large_cap();
        let cc = estimate_capital_cost(
            &rec,
            &RegionAssumptions::united_states(),
            &SectorProfile::fallback(),
            &us_config(&rec, &DcfOverrides::new().with_wacc(dec!(0.12))),
        );
        assert_eq!(cc.wacc, dec!(0.12));
        assert!(cc.wacc_overridden);
    }
}
