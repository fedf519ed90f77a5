use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::assumptions::RegionAssumptions;
use crate::error::FairValueError;
use crate::stock::StockRecord;
use crate::types::{clamp, pct_to_rate, Money, Rate};
use crate::FairValueResult;

/// Per-input growth cap, in percent, applied before blending.
const INPUT_GROWTH_FLOOR_PCT: Decimal = dec!(-20);
const INPUT_GROWTH_CAP_PCT: Decimal = dec!(40);
/// Cap on the blended growth figure, in percent.
const BLENDED_GROWTH_FLOOR_PCT: Decimal = dec!(-15);
const BLENDED_GROWTH_CAP_PCT: Decimal = dec!(35);
const DEFAULT_GROWTH_PCT: Decimal = dec!(8);
const REVENUE_GROWTH_WEIGHT: Decimal = dec!(0.7);
const EARNINGS_GROWTH_WEIGHT: Decimal = dec!(0.3);

const HIGH_GROWTH_THRESHOLD: Rate = dec!(0.15);
const SHORT_HORIZON_YEARS: u32 = 5;
const LONG_HORIZON_YEARS: u32 = 10;
const MIN_FORECAST_YEARS: u32 = 1;
const MAX_FORECAST_YEARS: u32 = 30;

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Caller-supplied substitutes for computed DCF defaults. Every field is
/// optional; rates are fractions (0.05 = 5%).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcfOverrides {
    #[serde(alias = "initialGrowth", skip_serializing_if = "Option::is_none")]
    pub initial_growth: Option<Rate>,
    #[serde(alias = "terminalGrowth", skip_serializing_if = "Option::is_none")]
    pub terminal_growth: Option<Rate>,
    #[serde(alias = "forecastYears", skip_serializing_if = "Option::is_none")]
    pub forecast_years: Option<u32>,
    /// Replaces the mean-reverted beta
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beta: Option<Decimal>,
    #[serde(alias = "riskFreeRate", skip_serializing_if = "Option::is_none")]
    pub risk_free_rate: Option<Rate>,
    #[serde(alias = "equityRiskPremium", skip_serializing_if = "Option::is_none")]
    pub equity_risk_premium: Option<Rate>,
    #[serde(alias = "countryRiskPremium", skip_serializing_if = "Option::is_none")]
    pub country_risk_premium: Option<Rate>,
    #[serde(alias = "taxRate", skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wacc: Option<Rate>,
    #[serde(alias = "baseFCF", alias = "baseFcf", skip_serializing_if = "Option::is_none")]
    pub base_fcf: Option<Money>,
    /// Debt-to-equity as a ratio (0.5), not a percentage
    #[serde(alias = "deRatio", skip_serializing_if = "Option::is_none")]
    pub de_ratio: Option<Decimal>,
    /// Pre-tax cost of debt
    #[serde(alias = "costOfDebt", skip_serializing_if = "Option::is_none")]
    pub cost_of_debt: Option<Rate>,
}

impl DcfOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_growth(mut self, g: Rate) -> Self {
        self.initial_growth = Some(g);
        self
    }

    pub fn with_terminal_growth(mut self, g: Rate) -> Self {
        self.terminal_growth = Some(g);
        self
    }

    pub fn with_forecast_years(mut self, years: u32) -> Self {
        self.forecast_years = Some(years);
        self
    }

    pub fn with_beta(mut self, beta: Decimal) -> Self {
        self.beta = Some(beta);
        self
    }

    pub fn with_equity_risk_premium(mut self, erp: Rate) -> Self {
        self.equity_risk_premium = Some(erp);
        self
    }

    pub fn with_wacc(mut self, wacc: Rate) -> Self {
        self.wacc = Some(wacc);
        self
    }

    pub fn with_base_fcf(mut self, fcf: Money) -> Self {
        self.base_fcf = Some(fcf);
        self
    }

    /// Fields set on `other` win over fields set on `self`.
    pub fn merged_with(&self, other: &DcfOverrides) -> DcfOverrides {
        DcfOverrides {
            initial_growth: other.initial_growth.or(self.initial_growth),
            terminal_growth: other.terminal_growth.or(self.terminal_growth),
            forecast_years: other.forecast_years.or(self.forecast_years),
            beta: other.beta.or(self.beta),
            risk_free_rate: other.risk_free_rate.or(self.risk_free_rate),
            equity_risk_premium: other.equity_risk_premium.or(self.equity_risk_premium),
            country_risk_premium: other.country_risk_premium.or(self.country_risk_premium),
            tax_rate: other.tax_rate.or(self.tax_rate),
            wacc: other.wacc.or(self.wacc),
            base_fcf: other.base_fcf.or(self.base_fcf),
            de_ratio: other.de_ratio.or(self.de_ratio),
            cost_of_debt: other.cost_of_debt.or(self.cost_of_debt),
        }
    }

    /// Merge the overrides over region and record defaults, producing the
    /// configuration the DCF runs on.
    pub fn resolve(
        &self,
        region_name: &str,
        region: &RegionAssumptions,
        record: &StockRecord,
        warnings: &mut Vec<String>,
    ) -> FairValueResult<DcfConfig> {
        self.validate()?;

        let (initial_growth, growth_basis) = match self.initial_growth {
            Some(g) => (g, GrowthBasis::Override),
            None => blended_growth(record),
        };

        let forecast_years = match self.forecast_years {
            Some(years) => {
                let clamped = years.clamp(MIN_FORECAST_YEARS, MAX_FORECAST_YEARS);
                if clamped != years {
                    warnings.push(format!(
                        "Forecast horizon of {years} years clamped to {clamped}"
                    ));
                }
                clamped
            }
            None => default_horizon(initial_growth),
        };

        Ok(DcfConfig {
            region: region_name.to_string(),
            risk_free_rate: self.risk_free_rate.unwrap_or(region.risk_free_rate),
            equity_risk_premium: self.equity_risk_premium.unwrap_or(region.equity_risk_premium),
            country_risk_premium: self
                .country_risk_premium
                .unwrap_or(region.country_risk_premium),
            tax_rate: self.tax_rate.unwrap_or(region.tax_rate),
            terminal_growth: self.terminal_growth.unwrap_or(region.terminal_growth),
            initial_growth,
            growth_basis,
            forecast_years,
            beta: self.beta,
            de_ratio: self.de_ratio,
            cost_of_debt: self.cost_of_debt,
            wacc: self.wacc,
            base_fcf: self.base_fcf,
        })
    }

    fn validate(&self) -> FairValueResult<()> {
        if let Some(t) = self.tax_rate {
            if t < Decimal::ZERO || t >= Decimal::ONE {
                return Err(FairValueError::InvalidInput {
                    field: "tax_rate".into(),
                    reason: format!("Tax rate must be in [0, 1), got {t}"),
                });
            }
        }
        if let Some(b) = self.beta {
            if b < Decimal::ZERO {
                return Err(FairValueError::InvalidInput {
                    field: "beta".into(),
                    reason: "Beta cannot be negative".into(),
                });
            }
        }
        if let Some(de) = self.de_ratio {
            if de < Decimal::ZERO {
                return Err(FairValueError::InvalidInput {
                    field: "de_ratio".into(),
                    reason: "Debt-to-equity cannot be negative".into(),
                });
            }
        }
        let rate_floor = dec!(-0.99);
        let rates = [
            ("initial_growth", self.initial_growth),
            ("terminal_growth", self.terminal_growth),
            ("wacc", self.wacc),
        ];
        for (field, value) in rates {
            if let Some(v) = value {
                if v <= rate_floor {
                    return Err(FairValueError::InvalidInput {
                        field: field.into(),
                        reason: format!("Rate {v} is below -99%"),
                    });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Where the initial growth figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrowthBasis {
    /// 70% revenue growth, 30% earnings growth
    Blended,
    RevenueOnly,
    EarningsOnly,
    Default,
    Override,
}

/// Fully resolved DCF configuration. Built once per valuation from the
/// region, the record and any overrides; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfConfig {
    pub region: String,
    pub risk_free_rate: Rate,
    pub equity_risk_premium: Rate,
    pub country_risk_premium: Rate,
    pub tax_rate: Rate,
    pub terminal_growth: Rate,
    pub initial_growth: Rate,
    pub growth_basis: GrowthBasis,
    pub forecast_years: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beta: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub de_ratio: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_of_debt: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wacc: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_fcf: Option<Money>,
}

impl DcfConfig {
    /// Growth for year `t` (1-based), decaying linearly from the initial
    /// rate to terminal growth at the end of the horizon.
    pub fn growth_for_year(&self, t: u32) -> Rate {
        let n = Decimal::from(self.forecast_years.max(1));
        let step = Decimal::from(t.min(self.forecast_years));
        self.initial_growth + (self.terminal_growth - self.initial_growth) * step / n
    }

    pub fn growth_schedule(&self) -> Vec<Rate> {
        (1..=self.forecast_years)
            .map(|t| self.growth_for_year(t))
            .collect()
    }
}

/// Blend revenue and earnings growth into one initial growth rate.
pub fn blended_growth(record: &StockRecord) -> (Rate, GrowthBasis) {
    let cap = |pct: Decimal| clamp(pct, INPUT_GROWTH_FLOOR_PCT, INPUT_GROWTH_CAP_PCT);
    let revenue = record.revenue_growth.map(cap);
    let earnings = record.earnings_growth().map(cap);

    let (pct, basis) = match (revenue, earnings) {
        (Some(r), Some(e)) => (
            REVENUE_GROWTH_WEIGHT * r + EARNINGS_GROWTH_WEIGHT * e,
            GrowthBasis::Blended,
        ),
        (Some(r), None) => (r, GrowthBasis::RevenueOnly),
        (None, Some(e)) => (e, GrowthBasis::EarningsOnly),
        (None, None) => (DEFAULT_GROWTH_PCT, GrowthBasis::Default),
    };
    let pct = clamp(pct, BLENDED_GROWTH_FLOOR_PCT, BLENDED_GROWTH_CAP_PCT);
    (pct_to_rate(pct), basis)
}

/// Ten-year horizon for high-growth names, five otherwise.
pub fn default_horizon(initial_growth: Rate) -> u32 {
    if initial_growth > HIGH_GROWTH_THRESHOLD {
        LONG_HORIZON_YEARS
    } else {
        SHORT_HORIZON_YEARS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_growth(rev: Option<Decimal>, ni: Option<Decimal>) -> StockRecord {
        StockRecord {
            revenue_growth: rev,
            net_income_growth: ni,
            ..StockRecord::new("TEST", "US")
        }
    }

    #[test]
    fn test_blended_growth_weights() {
        let (g, basis) = blended_growth(&record_with_growth(Some(dec!(10)), Some(dec!(20))));
        assert_eq!(basis, GrowthBasis::Blended);
        assert_eq!(g, dec!(0.13));
    }

    #[test]
    fn test_input_caps_applied_before_blend() {
        // 40 * 0.7 + (-20) * 0.3 = 22
        let (g, _) = blended_growth(&record_with_growth(Some(dec!(90)), Some(dec!(-60))));
        assert_eq!(g, dec!(0.22));
    }

    #[test]
    fn test_blended_cap() {
        let (g, basis) = blended_growth(&record_with_growth(Some(dec!(40)), None));
        assert_eq!(basis, GrowthBasis::RevenueOnly);
        assert_eq!(g, dec!(0.35));
        let (g, _) = blended_growth(&record_with_growth(None, Some(dec!(-19))));
        assert_eq!(g, dec!(-0.15));
    }

    #[test]
    fn test_eps_growth_used_when_net_income_growth_missing() {
        let rec = StockRecord {
            eps_growth: Some(dec!(12)),
            ..StockRecord::new("TEST", "US")
        };
        assert_eq!(blended_growth(&rec), (dec!(0.12), GrowthBasis::EarningsOnly));
    }

    #[test]
    fn test_default_growth() {
        let (g, basis) = blended_growth(&StockRecord::new("TEST", "US"));
        assert_eq!(g, dec!(0.08));
        assert_eq!(basis, GrowthBasis::Default);
    }

    #[test]
    fn test_horizon() {
        assert_eq!(default_horizon(dec!(0.15)), 5);
        assert_eq!(default_horizon(dec!(0.16)), 10);
    }

    #[test]
    fn test_resolve_applies_overrides() {
        let region = RegionAssumptions::united_states();
        let rec = record_with_growth(Some(dec!(8)), None);
        let mut warnings = Vec::new();
        let cfg = DcfOverrides::new()
            .with_terminal_growth(dec!(0.03))
            .with_forecast_years(50)
            .resolve("US", &region, &rec, &mut warnings)
            .unwrap();
        assert_eq!(cfg.terminal_growth, dec!(0.03));
        assert_eq!(cfg.risk_free_rate, dec!(0.0435));
        assert_eq!(cfg.forecast_years, 30);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_growth_schedule_decays_to_terminal() {
        let region = RegionAssumptions::united_states();
        let rec = record_with_growth(Some(dec!(8)), None);
        let cfg = DcfOverrides::new()
            .resolve("US", &region, &rec, &mut Vec::new())
            .unwrap();
        let schedule = cfg.growth_schedule();
        assert_eq!(schedule.len(), 5);
        assert_eq!(schedule[0], dec!(0.069));
        assert_eq!(schedule[4], dec!(0.025));
    }

    #[test]
    fn test_invalid_tax_override_rejected() {
        let region = RegionAssumptions::united_states();
        let overrides = DcfOverrides {
            tax_rate: Some(dec!(1.2)),
            ..Default::default()
        };
        let result = overrides.resolve("US", &region, &StockRecord::new("T", "US"), &mut Vec::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_camel_case_aliases() {
        let json = r#"{"initialGrowth": 0.1, "baseFCF": 5000, "forecastYears": 7}"#;
        let o: DcfOverrides = serde_json::from_str(json).unwrap();
        assert_eq!(o.initial_growth, Some(dec!(0.1)));
        assert_eq!(o.base_fcf, Some(dec!(5000)));
        assert_eq!(o.forecast_years, Some(7));
    }

    #[test]
    fn test_merge_prefers_other() {
        let base = DcfOverrides::new().with_beta(dec!(1.1)).with_wacc(dec!(0.09));
        let merged = base.merged_with(&DcfOverrides::new().with_beta(dec!(0.8)));
        assert_eq!(merged.beta, Some(dec!(0.8)));
        assert_eq!(merged.wacc, Some(dec!(0.09)));
    }
}
