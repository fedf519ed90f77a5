use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::FairValueError;
use crate::types::Rate;
use crate::FairValueResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Agency-style label for a synthetic credit rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreditRating {
    AAA,
    AA,
    #[serde(rename = "A+")]
    Ap,
    A,
    #[serde(rename = "A-")]
    Am,
    BBB,
    #[serde(rename = "BB+")]
    BBp,
    BB,
    #[serde(rename = "B+")]
    Bp,
    B,
    #[serde(rename = "B-")]
    Bm,
    CCC,
    CC,
    C,
    D,
}

impl std::fmt::Display for CreditRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AAA => "AAA",
            Self::AA => "AA",
            Self::Ap => "A+",
            Self::A => "A",
            Self::Am => "A-",
            Self::BBB => "BBB",
            Self::BBp => "BB+",
            Self::BB => "BB",
            Self::Bp => "B+",
            Self::B => "B",
            Self::Bm => "B-",
            Self::CCC => "CCC",
            Self::CC => "CC",
            Self::C => "C",
            Self::D => "D",
        };
        write!(f, "{s}")
    }
}

/// One rung of the interest-coverage ladder: coverage at or above
/// `min_coverage` maps to `rating` and `spread`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageTier {
    pub min_coverage: Decimal,
    pub rating: CreditRating,
    pub spread: Rate,
}

/// Coarser fallback keyed by debt-to-equity. `max_debt_to_equity = None`
/// marks the open-ended last bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtRatioBucket {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_debt_to_equity: Option<Decimal>,
    pub rating: CreditRating,
    pub spread: Rate,
}

/// Capital-market assumptions for one listing region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionAssumptions {
    /// Local-currency long government bond yield
    pub risk_free_rate: Rate,
    /// Mature-market equity risk premium
    pub equity_risk_premium: Rate,
    /// Additional premium for country risk (zero for developed markets)
    pub country_risk_premium: Rate,
    /// Long-run nominal growth used for the terminal value
    pub terminal_growth: Rate,
    /// Flat corporate tax rate
    pub tax_rate: Rate,
    /// Ordered from the highest coverage threshold down
    pub coverage_ladder: Vec<CoverageTier>,
    /// Ordered from the lowest leverage up; last bucket is open-ended
    pub debt_ratio_buckets: Vec<DebtRatioBucket>,
}

impl RegionAssumptions {
    /// Indonesia: 10Y SUN yield, Damodaran mature ERP plus a BBB sovereign CRP.
    pub fn indonesia() -> Self {
        RegionAssumptions {
            risk_free_rate: dec!(0.0665),
            equity_risk_premium: dec!(0.060),
            country_risk_premium: dec!(0.025),
            terminal_growth: dec!(0.040),
            tax_rate: dec!(0.22),
            coverage_ladder: standard_coverage_ladder(),
            debt_ratio_buckets: standard_debt_ratio_buckets(),
        }
    }

    /// United States: 10Y UST yield and implied ERP.
    pub fn united_states() -> Self {
        RegionAssumptions {
            risk_free_rate: dec!(0.0435),
            equity_risk_premium: dec!(0.055),
            country_risk_premium: Decimal::ZERO,
            terminal_growth: dec!(0.025),
            tax_rate: dec!(0.21),
            coverage_ladder: standard_coverage_ladder(),
            debt_ratio_buckets: standard_debt_ratio_buckets(),
        }
    }

    /// Walk the coverage ladder from the top; the last rung catches everything below it.
    pub fn rating_for_coverage(&self, coverage: Decimal) -> Option<&CoverageTier> {
        self.coverage_ladder
            .iter()
            .find(|tier| coverage >= tier.min_coverage)
            .or_else(|| self.coverage_ladder.last())
    }

    pub fn rating_for_debt_to_equity(&self, debt_to_equity: Decimal) -> Option<&DebtRatioBucket> {
        self.debt_ratio_buckets
            .iter()
            .find(|b| match b.max_debt_to_equity {
                Some(max) => debt_to_equity <= max,
                None => true,
            })
            .or_else(|| self.debt_ratio_buckets.last())
    }

    pub(crate) fn validate(&self, name: &str) -> FairValueResult<()> {
        if self.tax_rate < Decimal::ZERO || self.tax_rate >= Decimal::ONE {
            return Err(FairValueError::InvalidConfiguration(format!(
                "{name}: tax rate must be in [0, 1), got {}",
                self.tax_rate
            )));
        }
        if self.risk_free_rate < Decimal::ZERO || self.equity_risk_premium < Decimal::ZERO {
            return Err(FairValueError::InvalidConfiguration(format!(
                "{name}: risk-free rate and equity risk premium cannot be negative"
            )));
        }
        if self.terminal_growth >= dec!(0.20) {
            return Err(FairValueError::InvalidConfiguration(format!(
                "{name}: terminal growth {} is not a long-run rate",
                self.terminal_growth
            )));
        }
        if self.coverage_ladder.is_empty() || self.debt_ratio_buckets.is_empty() {
            return Err(FairValueError::InvalidConfiguration(format!(
                "{name}: credit spread tables cannot be empty"
            )));
        }
        let descending = self
            .coverage_ladder
            .windows(2)
            .all(|w| w[0].min_coverage > w[1].min_coverage);
        if !descending {
            return Err(FairValueError::InvalidConfiguration(format!(
                "{name}: coverage ladder must be ordered by strictly decreasing threshold"
            )));
        }
        let bounded: Vec<Decimal> = self
            .debt_ratio_buckets
            .iter()
            .filter_map(|b| b.max_debt_to_equity)
            .collect();
        if !bounded.windows(2).all(|w| w[0] < w[1]) {
            return Err(FairValueError::InvalidConfiguration(format!(
                "{name}: debt ratio buckets must be ordered by increasing D/E"
            )));
        }
        let negative_spread = self.coverage_ladder.iter().any(|t| t.spread < Decimal::ZERO)
            || self.debt_ratio_buckets.iter().any(|b| b.spread < Decimal::ZERO);
        if negative_spread {
            return Err(FairValueError::InvalidConfiguration(format!(
                "{name}: credit spreads cannot be negative"
            )));
        }
        Ok(())
    }
}

/// Damodaran synthetic-rating table (smaller / riskier firms).
pub fn standard_coverage_ladder() -> Vec<CoverageTier> {
    [
        (dec!(12.5), CreditRating::AAA, dec!(0.0063)),
        (dec!(9.5), CreditRating::AA, dec!(0.0078)),
        (dec!(7.5), CreditRating::Ap, dec!(0.0098)),
        (dec!(6.0), CreditRating::A, dec!(0.0108)),
        (dec!(4.5), CreditRating::Am, dec!(0.0122)),
        (dec!(4.0), CreditRating::BBB, dec!(0.0156)),
        (dec!(3.5), CreditRating::BBp, dec!(0.0200)),
        (dec!(3.0), CreditRating::BB, dec!(0.0240)),
        (dec!(2.5), CreditRating::Bp, dec!(0.0351)),
        (dec!(2.0), CreditRating::B, dec!(0.0421)),
        (dec!(1.5), CreditRating::Bm, dec!(0.0515)),
        (dec!(1.25), CreditRating::CCC, dec!(0.0820)),
        (dec!(0.8), CreditRating::CC, dec!(0.0864)),
        (dec!(0.5), CreditRating::C, dec!(0.1134)),
        (Decimal::MIN, CreditRating::D, dec!(0.1512)),
    ]
    .into_iter()
    .map(|(min_coverage, rating, spread)| CoverageTier {
        min_coverage,
        rating,
        spread,
    })
    .collect()
}

pub fn standard_debt_ratio_buckets() -> Vec<DebtRatioBucket> {
    [
        (Some(dec!(0.10)), CreditRating::AA, dec!(0.0078)),
        (Some(dec!(0.25)), CreditRating::A, dec!(0.0108)),
        (Some(dec!(0.50)), CreditRating::BBB, dec!(0.0156)),
        (Some(dec!(1.00)), CreditRating::BB, dec!(0.0240)),
        (Some(dec!(2.00)), CreditRating::B, dec!(0.0421)),
        (None, CreditRating::CCC, dec!(0.0820)),
    ]
    .into_iter()
    .map(|(max_debt_to_equity, rating, spread)| DebtRatioBucket {
        max_debt_to_equity,
        rating,
        spread,
    })
    .collect()
}
