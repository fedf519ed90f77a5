use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::FairValueError;
use crate::types::{Multiple, Rate};
use crate::FairValueResult;

/// Closed set of sector categories. Labels from the data feed are resolved
/// into one of these once, when a record is ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum SectorCategory {
    Financial,
    Technology,
    Communications,
    #[serde(rename = "Consumer, Cyclical")]
    ConsumerCyclical,
    #[serde(rename = "Consumer, Non-cyclical")]
    ConsumerNonCyclical,
    Healthcare,
    Industrial,
    #[serde(rename = "Basic Materials")]
    BasicMaterials,
    Energy,
    Utilities,
    #[default]
    Unclassified,
}

impl SectorCategory {
    pub fn all() -> &'static [Self] {
        &[
            Self::Financial,
            Self::Technology,
            Self::Communications,
            Self::ConsumerCyclical,
            Self::ConsumerNonCyclical,
            Self::Healthcare,
            Self::Industrial,
            Self::BasicMaterials,
            Self::Energy,
            Self::Utilities,
            Self::Unclassified,
        ]
    }

    /// Resolve a free-text sector label (feed or GICS naming) to a category.
    pub fn from_label(label: &str) -> Self {
        let l = label.trim().to_ascii_lowercase();
        if l.is_empty() {
            return Self::Unclassified;
        }
        // Real estate is grouped with financials for comps purposes.
        if ["financ", "bank", "insur", "real estate", "reit", "capital markets"]
            .iter()
            .any(|k| l.contains(k))
        {
            Self::Financial
        } else if ["health", "pharma", "biotech", "life sciences"].iter().any(|k| l.contains(k)) {
            Self::Healthcare
        } else if l.contains("utilit") {
            Self::Utilities
        } else if ["technology", "software", "semiconductor", "it services"]
            .iter()
            .any(|k| l.contains(k))
        {
            Self::Technology
        } else if ["communication", "telecom", "media"].iter().any(|k| l.contains(k)) {
            Self::Communications
        } else if ["non-cyclical", "staples", "defensive"].iter().any(|k| l.contains(k)) {
            Self::ConsumerNonCyclical
        } else if ["cyclical", "discretionary"].iter().any(|k| l.contains(k)) {
            Self::ConsumerCyclical
        } else if l.contains("industrial") {
            Self::Industrial
        } else if l.contains("material") || l.contains("mining") || l.contains("chemical") {
            Self::BasicMaterials
        } else if ["energy", "oil", "gas", "coal"].iter().any(|k| l.contains(k)) {
            Self::Energy
        } else {
            Self::Unclassified
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Financial => "Financial",
            Self::Technology => "Technology",
            Self::Communications => "Communications",
            Self::ConsumerCyclical => "Consumer, Cyclical",
            Self::ConsumerNonCyclical => "Consumer, Non-cyclical",
            Self::Healthcare => "Healthcare",
            Self::Industrial => "Industrial",
            Self::BasicMaterials => "Basic Materials",
            Self::Energy => "Energy",
            Self::Utilities => "Utilities",
            Self::Unclassified => "Unclassified",
        }
    }

    /// Deposit-funded or balance-sheet businesses where debt is raw material,
    /// not financing. EV-based multiples are never computed for these.
    pub fn is_financial(&self) -> bool {
        matches!(self, Self::Financial)
    }
}

impl std::fmt::Display for SectorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Operating and market parameters typical for a sector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorProfile {
    /// Depreciation & amortisation as a share of EBITDA
    pub da_to_ebitda: Rate,
    /// Capital expenditure relative to D&A (maintenance = 1.0)
    pub capex_to_da: Multiple,
    /// Change in NWC per unit of revenue growth, as a share of revenue
    pub nwc_to_revenue_growth: Rate,
    /// Free-cash-flow conversion of net income
    pub fcf_conversion: Rate,
    /// FCF yield used when nothing better is available
    pub typical_fcf_yield: Rate,
    pub typical_price_to_sales: Multiple,
    pub typical_price_to_book: Multiple,
    pub typical_debt_to_equity: Multiple,
    /// Cash holdings as a share of market cap
    pub cash_to_market_cap: Rate,
    /// Added to the CAPM cost of equity
    pub risk_premium: Rate,
}

impl SectorProfile {
    /// Parameters for companies whose sector could not be resolved.
    pub fn fallback() -> Self {
        SectorProfile {
            da_to_ebitda: dec!(0.25),
            capex_to_da: dec!(1.2),
            nwc_to_revenue_growth: dec!(0.10),
            fcf_conversion: dec!(0.65),
            typical_fcf_yield: dec!(0.05),
            typical_price_to_sales: dec!(2.0),
            typical_price_to_book: dec!(2.5),
            typical_debt_to_equity: dec!(0.5),
            cash_to_market_cap: dec!(0.08),
            risk_premium: dec!(0.01),
        }
    }

    /// Built-in profile for a category.
    pub fn for_category(category: SectorCategory) -> Self {
        #[rustfmt::skip]
        let (da, capex, nwc, conv, fcf_yield, ps, pb, de, cash, premium) = match category {
            SectorCategory::Financial =>           (dec!(0.10), dec!(1.0), dec!(0.00), dec!(0.85), dec!(0.060), dec!(3.0), dec!(1.5), dec!(1.0), dec!(0.10), dec!(0.005)),
            SectorCategory::Technology =>          (dec!(0.15), dec!(1.1), dec!(0.05), dec!(0.80), dec!(0.035), dec!(5.0), dec!(6.0), dec!(0.3), dec!(0.10), dec!(0.010)),
            SectorCategory::Communications =>      (dec!(0.35), dec!(1.2), dec!(0.05), dec!(0.65), dec!(0.050), dec!(2.5), dec!(3.0), dec!(0.8), dec!(0.05), dec!(0.005)),
            SectorCategory::ConsumerCyclical =>    (dec!(0.25), dec!(1.2), dec!(0.12), dec!(0.65), dec!(0.045), dec!(1.2), dec!(3.0), dec!(0.6), dec!(0.07), dec!(0.005)),
            SectorCategory::ConsumerNonCyclical => (dec!(0.20), dec!(1.1), dec!(0.08), dec!(0.65), dec!(0.050), dec!(1.5), dec!(4.0), dec!(0.5), dec!(0.06), dec!(0.000)),
            SectorCategory::Healthcare =>          (dec!(0.18), dec!(1.1), dec!(0.10), dec!(0.65), dec!(0.040), dec!(4.0), dec!(4.0), dec!(0.4), dec!(0.08), dec!(0.005)),
            SectorCategory::Industrial =>          (dec!(0.25), dec!(1.2), dec!(0.12), dec!(0.65), dec!(0.050), dec!(1.5), dec!(3.0), dec!(0.6), dec!(0.06), dec!(0.005)),
            SectorCategory::BasicMaterials =>      (dec!(0.30), dec!(1.3), dec!(0.10), dec!(0.50), dec!(0.060), dec!(1.2), dec!(1.8), dec!(0.5), dec!(0.06), dec!(0.010)),
            SectorCategory::Energy =>              (dec!(0.35), dec!(1.3), dec!(0.05), dec!(0.50), dec!(0.060), dec!(1.0), dec!(1.5), dec!(0.5), dec!(0.06), dec!(0.010)),
            SectorCategory::Utilities =>           (dec!(0.35), dec!(1.5), dec!(0.03), dec!(0.50), dec!(0.055), dec!(2.0), dec!(1.6), dec!(1.2), dec!(0.03), dec!(0.000)),
            SectorCategory::Unclassified => return Self::fallback(),
        };
        SectorProfile {
            da_to_ebitda: da,
            capex_to_da: capex,
            nwc_to_revenue_growth: nwc,
            fcf_conversion: conv,
            typical_fcf_yield: fcf_yield,
            typical_price_to_sales: ps,
            typical_price_to_book: pb,
            typical_debt_to_equity: de,
            cash_to_market_cap: cash,
            risk_premium: premium,
        }
    }

    pub(crate) fn validate(&self, name: &str) -> FairValueResult<()> {
        let positive = [
            ("typical_price_to_sales", self.typical_price_to_sales),
            ("typical_price_to_book", self.typical_price_to_book),
            ("typical_fcf_yield", self.typical_fcf_yield),
        ];
        for (field, value) in positive {
            if value <= Decimal::ZERO {
                return Err(FairValueError::InvalidConfiguration(format!(
                    "{name}: {field} must be positive"
                )));
            }
        }
        let non_negative = [
            ("da_to_ebitda", self.da_to_ebitda),
            ("capex_to_da", self.capex_to_da),
            ("nwc_to_revenue_growth", self.nwc_to_revenue_growth),
            ("fcf_conversion", self.fcf_conversion),
            ("typical_debt_to_equity", self.typical_debt_to_equity),
            ("cash_to_market_cap", self.cash_to_market_cap),
            ("risk_premium", self.risk_premium),
        ];
        for (field, value) in non_negative {
            if value < Decimal::ZERO {
                return Err(FairValueError::InvalidConfiguration(format!(
                    "{name}: {field} cannot be negative"
                )));
            }
        }
        if self.da_to_ebitda >= Decimal::ONE {
            return Err(FairValueError::InvalidConfiguration(format!(
                "{name}: D&A cannot exceed EBITDA"
            )));
        }
        Ok(())
    }
}
