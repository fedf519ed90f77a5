use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::assumptions::SectorCategory;
use crate::error::FairValueError;
use crate::types::{safe_div, Money, Multiple};
use crate::FairValueResult;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Levels of the GICS-style hierarchy, least specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClassificationLevel {
    Sector,
    IndustryGroup,
    Industry,
    SubIndustry,
}

impl std::fmt::Display for ClassificationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassificationLevel::Sector => write!(f, "Sector"),
            ClassificationLevel::IndustryGroup => write!(f, "Industry Group"),
            ClassificationLevel::Industry => write!(f, "Industry"),
            ClassificationLevel::SubIndustry => write!(f, "Sub-Industry"),
        }
    }
}

/// Sector hierarchy of a company plus its resolved [`SectorCategory`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawClassification")]
pub struct Classification {
    #[serde(rename = "GICS Sector", skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(rename = "GICS Industry Group", skip_serializing_if = "Option::is_none")]
    pub industry_group: Option<String>,
    #[serde(rename = "GICS Industry", skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(rename = "GICS Sub-Industry", skip_serializing_if = "Option::is_none")]
    pub sub_industry: Option<String>,
    #[serde(rename = "Sector Category")]
    pub category: SectorCategory,
}

/// Wire shape of the classification fields. Accepts both GICS names and the
/// feed's legacy `Industry Sector` / `Industry Group` columns.
#[derive(Deserialize)]
struct RawClassification {
    #[serde(rename = "GICS Sector", default)]
    gics_sector: Option<String>,
    #[serde(rename = "Industry Sector", default)]
    feed_sector: Option<String>,
    #[serde(rename = "GICS Industry Group", default)]
    gics_industry_group: Option<String>,
    #[serde(rename = "Industry Group", default)]
    feed_industry_group: Option<String>,
    #[serde(rename = "GICS Industry", default)]
    industry: Option<String>,
    #[serde(rename = "GICS Sub-Industry", default)]
    sub_industry: Option<String>,
}

impl From<RawClassification> for Classification {
    fn from(raw: RawClassification) -> Self {
        let sector = non_blank(raw.gics_sector).or_else(|| non_blank(raw.feed_sector));
        let group = non_blank(raw.gics_industry_group).or_else(|| non_blank(raw.feed_industry_group));
        Classification::new(
            sector.as_deref(),
            group.as_deref(),
            non_blank(raw.industry).as_deref(),
            non_blank(raw.sub_industry).as_deref(),
        )
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Classification {
    /// Build a classification and resolve its sector category. When the sector
    /// label is missing or unrecognised, the finer levels are tried in turn.
    pub fn new(
        sector: Option<&str>,
        industry_group: Option<&str>,
        industry: Option<&str>,
        sub_industry: Option<&str>,
    ) -> Self {
        let clean = |s: Option<&str>| {
            s.map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let sector = clean(sector);
        let industry_group = clean(industry_group);
        let industry = clean(industry);
        let sub_industry = clean(sub_industry);

        let category = [&sector, &industry_group, &industry, &sub_industry]
            .into_iter()
            .flatten()
            .map(|label| SectorCategory::from_label(label))
            .find(|c| *c != SectorCategory::Unclassified)
            .unwrap_or_default();

        Classification {
            sector,
            industry_group,
            industry,
            sub_industry,
            category,
        }
    }

    pub fn label_at(&self, level: ClassificationLevel) -> Option<&str> {
        match level {
            ClassificationLevel::Sector => self.sector.as_deref(),
            ClassificationLevel::IndustryGroup => self.industry_group.as_deref(),
            ClassificationLevel::Industry => self.industry.as_deref(),
            ClassificationLevel::SubIndustry => self.sub_industry.as_deref(),
        }
    }

    /// Deepest level that carries a label.
    pub fn most_specific_level(&self) -> Option<ClassificationLevel> {
        [
            ClassificationLevel::SubIndustry,
            ClassificationLevel::Industry,
            ClassificationLevel::IndustryGroup,
            ClassificationLevel::Sector,
        ]
        .into_iter()
        .find(|l| self.label_at(*l).is_some())
    }

    /// Whether both classifications carry the same label at `level`.
    pub fn matches_at(&self, other: &Classification, level: ClassificationLevel) -> bool {
        match (self.label_at(level), other.label_at(level)) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }

    /// Deepest level at which the two classifications agree.
    pub fn deepest_shared_level(&self, other: &Classification) -> Option<ClassificationLevel> {
        [
            ClassificationLevel::SubIndustry,
            ClassificationLevel::Industry,
            ClassificationLevel::IndustryGroup,
            ClassificationLevel::Sector,
        ]
        .into_iter()
        .find(|l| self.matches_at(other, *l))
    }
}

// ---------------------------------------------------------------------------
// StockRecord
// ---------------------------------------------------------------------------

/// One company's market and financial metrics as delivered by the data feed.
///
/// Every metric is optional. Ratios such as ROE, margins and growth are
/// percentages (15 = 15%); `DE` may be a ratio or a percentage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockRecord {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "Region", default)]
    pub region: String,
    #[serde(flatten)]
    pub classification: Classification,

    #[serde(rename = "Price", default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    #[serde(rename = "Market Cap", default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<Money>,
    #[serde(rename = "Beta", default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<Decimal>,

    #[serde(rename = "PE", default, skip_serializing_if = "Option::is_none")]
    pub pe: Option<Multiple>,
    #[serde(rename = "PB", default, skip_serializing_if = "Option::is_none")]
    pub pb: Option<Multiple>,
    #[serde(rename = "PS", default, skip_serializing_if = "Option::is_none")]
    pub ps: Option<Multiple>,
    #[serde(rename = "EV/EBITDA", default, skip_serializing_if = "Option::is_none")]
    pub ev_to_ebitda: Option<Multiple>,
    #[serde(rename = "P/TBV", default, skip_serializing_if = "Option::is_none")]
    pub price_to_tangible_book: Option<Multiple>,

    #[serde(rename = "ROE", default, skip_serializing_if = "Option::is_none")]
    pub roe: Option<Decimal>,
    #[serde(rename = "EBITDA Margin", default, skip_serializing_if = "Option::is_none")]
    pub ebitda_margin: Option<Decimal>,
    #[serde(rename = "Gross Margin", default, skip_serializing_if = "Option::is_none")]
    pub gross_margin: Option<Decimal>,

    #[serde(rename = "Revenue Growth", default, skip_serializing_if = "Option::is_none")]
    pub revenue_growth: Option<Decimal>,
    #[serde(rename = "Net Income Growth", default, skip_serializing_if = "Option::is_none")]
    pub net_income_growth: Option<Decimal>,
    #[serde(rename = "EPS Growth", default, skip_serializing_if = "Option::is_none")]
    pub eps_growth: Option<Decimal>,

    #[serde(rename = "DE", default, skip_serializing_if = "Option::is_none")]
    pub de: Option<Decimal>,
    #[serde(rename = "InterestCoverage", default, skip_serializing_if = "Option::is_none")]
    pub interest_coverage: Option<Decimal>,

    #[serde(rename = "FCF", default, skip_serializing_if = "Option::is_none")]
    pub fcf: Option<Money>,
    #[serde(rename = "Net Income", default, skip_serializing_if = "Option::is_none")]
    pub net_income: Option<Money>,
    #[serde(rename = "Revenue", default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<Money>,
    #[serde(rename = "EBITDA", default, skip_serializing_if = "Option::is_none")]
    pub ebitda: Option<Money>,

    #[serde(rename = "TotalDebt", alias = "Total Debt", default, skip_serializing_if = "Option::is_none")]
    pub total_debt: Option<Money>,
    #[serde(rename = "Cash", default, skip_serializing_if = "Option::is_none")]
    pub cash: Option<Money>,
    #[serde(rename = "PreferredStock", alias = "Preferred Stock", default, skip_serializing_if = "Option::is_none")]
    pub preferred_stock: Option<Money>,
    #[serde(rename = "MinorityInterest", alias = "Minority Interest", default, skip_serializing_if = "Option::is_none")]
    pub minority_interest: Option<Money>,
}

impl StockRecord {
    pub fn new(ticker: &str, region: &str) -> Self {
        StockRecord {
            ticker: ticker.to_string(),
            region: region.to_string(),
            ..Default::default()
        }
    }

    /// Contract check applied to the record being valued.
    pub fn validate(&self) -> FairValueResult<()> {
        if self.ticker.trim().is_empty() {
            return Err(FairValueError::InvalidInput {
                field: "Ticker".into(),
                reason: "A stock record must carry a ticker".into(),
            });
        }
        Ok(())
    }

    pub fn category(&self) -> SectorCategory {
        self.classification.category
    }

    pub fn is_financial(&self) -> bool {
        self.category().is_financial()
    }

    /// Market cap when present and strictly positive.
    pub fn valid_market_cap(&self) -> Option<Money> {
        self.market_cap.filter(|m| *m > Decimal::ZERO)
    }

    /// Price when present and strictly positive.
    pub fn valid_price(&self) -> Option<Money> {
        self.price.filter(|p| *p > Decimal::ZERO)
    }

    /// Implied share count (market cap / price).
    pub fn shares_outstanding(&self) -> Option<Decimal> {
        safe_div(self.valid_market_cap()?, self.valid_price()?)
    }

    /// Debt-to-equity as a ratio. Figures above 5 are read as percentages.
    pub fn normalized_de(&self) -> Option<Decimal> {
        self.de.map(normalize_de)
    }

    /// Earnings growth in percent, preferring net income over EPS growth.
    pub fn earnings_growth(&self) -> Option<Decimal> {
        self.net_income_growth.or(self.eps_growth)
    }
}

/// Normalise a reported D/E figure to a ratio.
pub fn normalize_de(de: Decimal) -> Decimal {
    if de < Decimal::ZERO {
        Decimal::ZERO
    } else if de > dec!(5) {
        de / dec!(100)
    } else {
        de
    }
}
