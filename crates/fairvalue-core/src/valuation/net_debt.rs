use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::assumptions::SectorProfile;
use crate::stock::StockRecord;
use crate::types::{safe_div, Confidence, Money};

/// Net debt proxy for deposit-funded businesses, as a share of market cap.
const FINANCIAL_NET_DEBT_RATIO: Decimal = dec!(0.05);
const HIGH_PB_THRESHOLD: Decimal = dec!(3);
const HIGH_PB_CASH_BOOST: Decimal = dec!(1.5);
/// Estimated net cash is never allowed beyond half of market cap.
const NET_DEBT_FLOOR_RATIO: Decimal = dec!(-0.5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetDebtMethod {
    BalanceSheet,
    FinancialProxy,
    SectorEstimate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetDebtEstimate {
    pub net_debt: Money,
    pub method: NetDebtMethod,
    pub confidence: Confidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_debt: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash: Option<Money>,
    /// Set when the estimate hit the net-cash floor
    pub floored: bool,
}

/// Net debt from the balance sheet when reported, a flat proxy for
/// financials, otherwise an estimate from book equity and sector ratios.
pub fn estimate_net_debt(
    record: &StockRecord,
    sector: &SectorProfile,
    market_cap: Money,
) -> NetDebtEstimate {
    if let (Some(debt), Some(cash)) = (record.total_debt, record.cash) {
        let net_debt = debt - cash
            + record.preferred_stock.unwrap_or_default()
            + record.minority_interest.unwrap_or_default();
        return NetDebtEstimate {
            net_debt,
            method: NetDebtMethod::BalanceSheet,
            confidence: Confidence::High,
            total_debt: Some(debt),
            cash: Some(cash),
            floored: false,
        };
    }

    if record.is_financial() {
        return NetDebtEstimate {
            net_debt: market_cap * FINANCIAL_NET_DEBT_RATIO,
            method: NetDebtMethod::FinancialProxy,
            confidence: Confidence::Medium,
            total_debt: None,
            cash: None,
            floored: false,
        };
    }

    let reported_pb = record.pb.filter(|pb| *pb > Decimal::ZERO);
    let pb = reported_pb.unwrap_or(sector.typical_price_to_book);
    let book_equity = safe_div(market_cap, pb).unwrap_or_default();

    let (de, confidence) = match record.normalized_de() {
        Some(de) => (de, Confidence::MediumLow),
        None => (sector.typical_debt_to_equity, Confidence::Low),
    };
    let total_debt = book_equity * de;

    let mut cash = market_cap * sector.cash_to_market_cap;
    if pb > HIGH_PB_THRESHOLD {
        cash *= HIGH_PB_CASH_BOOST;
    }

    let floor = market_cap * NET_DEBT_FLOOR_RATIO;
    let raw = total_debt - cash;
    let floored = raw < floor;

    NetDebtEstimate {
        net_debt: raw.max(floor),
        method: NetDebtMethod::SectorEstimate,
        confidence,
        total_debt: Some(total_debt),
        cash: Some(cash),
        floored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::SectorCategory;
    use crate::stock::Classification;

    const MCAP: Money = dec!(1_000_000_000_000);

    fn record() -> StockRecord {
        StockRecord {
            market_cap: Some(MCAP),
            ..StockRecord::new("ND", "US")
        }
    }

    #[test]
    fn test_balance_sheet_path() {
        let rec = StockRecord {
            total_debt: Some(dec!(300)),
            cash: Some(dec!(120)),
            preferred_stock: Some(dec!(10)),
            minority_interest: Some(dec!(5)),
            ..record()
        };
        let nd = estimate_net_debt(&rec, &SectorProfile::fallback(), MCAP);
        assert_eq!(nd.method, NetDebtMethod::BalanceSheet);
        assert_eq!(nd.confidence, Confidence::High);
        assert_eq!(nd.net_debt, dec!(195));
    }

    #[test]
    fn test_debt_without_cash_is_estimated() {
        let rec = StockRecord {
            total_debt: Some(dec!(300)),
            de: Some(dec!(50)),
            ..record()
        };
        let nd = estimate_net_debt(&rec, &SectorProfile::fallback(), MCAP);
        assert_eq!(nd.method, NetDebtMethod::SectorEstimate);
    }

    #[test]
    fn test_financial_proxy() {
        let rec = StockRecord {
            classification: Classification::new(Some("Financial"), Some("Banks"), None, None),
            ..record()
        };
        let sector = SectorProfile::for_category(SectorCategory::Financial);
        let nd = estimate_net_debt(&rec, &sector, MCAP);
        assert_eq!(nd.method, NetDebtMethod::FinancialProxy);
        assert_eq!(nd.net_debt, dec!(50_000_000_000));
    }

    #[test]
    fn test_sector_estimate() {
        let rec = StockRecord {
            de: Some(dec!(50)),
            ..record()
        };
        let nd = estimate_net_debt(&rec, &SectorProfile::fallback(), MCAP);
        // book 4e11 * 0.5 - 8e10 cash
        assert_eq!(nd.net_debt, dec!(120_000_000_000));
        assert_eq!(nd.confidence, Confidence::MediumLow);
        assert!(!nd.floored);
    }

    #[test]
    fn test_high_pb_boosts_cash() {
        let rec = StockRecord {
            de: Some(dec!(0)),
            pb: Some(dec!(4)),
            ..record()
        };
        let nd = estimate_net_debt(&rec, &SectorProfile::fallback(), MCAP);
        assert_eq!(nd.cash, Some(dec!(120_000_000_000)));
        assert_eq!(nd.net_debt, dec!(-120_000_000_000));
    }

    #[test]
    fn test_missing_de_lowers_confidence() {
        let nd = estimate_net_debt(&record(), &SectorProfile::fallback(), MCAP);
        assert_eq!(nd.confidence, Confidence::Low);
    }

    #[test]
    fn test_net_cash_floor() {
        let mut sector = SectorProfile::fallback();
        sector.cash_to_market_cap = dec!(0.9);
        let rec = StockRecord {
            de: Some(dec!(0)),
            ..record()
        };
        let nd = estimate_net_debt(&rec, &sector, MCAP);
        assert!(nd.floored);
        assert_eq!(nd.net_debt, dec!(-500_000_000_000));
    }
}
