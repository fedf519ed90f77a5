use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::assumptions::{AssumptionSet, SectorCategory};
use crate::comps::peers::{select_peers, MatchLevel, PeerCandidate, MIN_PEERS};
use crate::stock::StockRecord;
use crate::types::{pct_to_rate, relative_change, safe_div, with_metadata, ComputationOutput, Money, Multiple, Rate};
use crate::valuation::net_debt::estimate_net_debt;
use crate::FairValueResult;

const MAX_PRICE_TO_BOOK: Multiple = dec!(50);
const MAX_EV_TO_EBITDA: Multiple = dec!(50);
const MAX_PRICE_TO_TANGIBLE_BOOK: Multiple = dec!(50);
/// P/TBV estimated from P/B when not reported
const TANGIBLE_BOOK_UPLIFT: Decimal = dec!(1.10);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Trading multiples used for relative valuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultipleType {
    PriceEarnings,
    PriceBook,
    EvEbitda,
    PriceTangibleBook,
}

impl MultipleType {
    pub const ALL: [MultipleType; 4] = [
        MultipleType::PriceEarnings,
        MultipleType::PriceBook,
        MultipleType::EvEbitda,
        MultipleType::PriceTangibleBook,
    ];
}

impl std::fmt::Display for MultipleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MultipleType::PriceEarnings => write!(f, "P/E"),
            MultipleType::PriceBook => write!(f, "P/B"),
            MultipleType::EvEbitda => write!(f, "EV/EBITDA"),
            MultipleType::PriceTangibleBook => write!(f, "P/TBV"),
        }
    }
}

/// Multiples for one company. Absent entries were missing or out of bounds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultipleSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pe: Option<Multiple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pb: Option<Multiple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ev_ebitda: Option<Multiple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_tbv: Option<Multiple>,
}

impl MultipleSet {
    pub fn get(&self, multiple: MultipleType) -> Option<Multiple> {
        match multiple {
            MultipleType::PriceEarnings => self.pe,
            MultipleType::PriceBook => self.pb,
            MultipleType::EvEbitda => self.ev_ebitda,
            MultipleType::PriceTangibleBook => self.p_tbv,
        }
    }
}

/// A selected peer with its multiples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerComparable {
    pub ticker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub region: String,
    pub market_cap: Money,
    pub similarity_score: Decimal,
    pub shared_level: MatchLevel,
    pub multiples: MultipleSet,
}

/// Distribution of one multiple across the peer set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipleStatistics {
    pub multiple_type: MultipleType,
    pub mean: Multiple,
    pub median: Multiple,
    pub p25: Multiple,
    pub p75: Multiple,
    pub min: Multiple,
    pub max: Multiple,
    pub count: usize,
}

/// Per-share value implied by one peer multiple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpliedValue {
    pub multiple_type: MultipleType,
    pub peer_median: Multiple,
    /// Target metric the multiple is applied to (EPS, BVPS, EBITDA or TBVPS)
    pub target_metric: Money,
    pub implied_value: Money,
    /// Sector weight after renormalising over available methods
    pub weight: Decimal,
}

/// Target's own multiple against the peer median.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelativeMultiple {
    pub multiple_type: MultipleType,
    pub target: Multiple,
    pub peer_median: Multiple,
    /// target / median - 1; positive means the target trades at a premium
    pub premium: Rate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradingRange {
    /// Blend evaluated at the peers' 25th-percentile multiples
    pub low: Money,
    /// Blend evaluated at the peers' 75th-percentile multiples
    pub high: Money,
}

/// Output of a trading comparables valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompsOutput {
    pub ticker: String,
    pub sector: SectorCategory,
    pub current_price: Money,
    /// Absent when the target has none of the metrics the weights call for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fair_value: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upside: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trading_range: Option<TradingRange>,
    pub peer_count: usize,
    pub selection_method: String,
    pub match_level: MatchLevel,
    pub relaxation_step: usize,
    pub peers: Vec<PeerComparable>,
    pub statistics: Vec<MultipleStatistics>,
    pub implied_values: Vec<ImpliedValue>,
    pub target_multiples: MultipleSet,
    pub relative_multiples: Vec<RelativeMultiple>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Value `target` against comparable companies drawn from `universe`.
///
/// Returns `Ok(None)` when the target lacks a positive price or market cap,
/// or when no peer qualifies at any relaxation level.
pub fn value_comps(
    target: &StockRecord,
    universe: &[StockRecord],
    assumptions: &AssumptionSet,
) -> FairValueResult<Option<ComputationOutput<CompsOutput>>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    assumptions.region(&target.region)?;
    target.validate()?;

    let (Some(price), Some(market_cap)) = (target.valid_price(), target.valid_market_cap()) else {
        return Ok(None);
    };
    let Some(selection) = select_peers(target, universe) else {
        return Ok(None);
    };

    let financial = target.is_financial();
    if selection.below_minimum {
        warnings.push(format!(
            "Only {} peer(s) found; fewer than {MIN_PEERS} at every relaxation level",
            selection.peers.len()
        ));
    }

    let peers: Vec<PeerComparable> = selection
        .peers
        .iter()
        .map(|c| peer_comparable(c, financial, assumptions))
        .collect();

    let statistics: Vec<MultipleStatistics> = MultipleType::ALL
        .iter()
        .filter_map(|m| {
            let values: Vec<Multiple> = peers.iter().filter_map(|p| p.multiples.get(*m)).collect();
            compute_statistics(*m, values)
        })
        .collect();

    let target_multiples = company_multiples(target, financial, assumptions);
    let metrics = TargetMetrics::from_record(target, price, market_cap, financial, assumptions);
    let weights = sector_weights(target.category());

    let implied_values = blend_inputs(&statistics, &weights, &metrics, |s| s.median);
    let fair_value = weighted_value(&implied_values);
    if fair_value.is_none() {
        warnings.push("No peer multiple could be applied to the target's metrics".into());
    }
    let trading_range = match (
        weighted_value(&blend_inputs(&statistics, &weights, &metrics, |s| s.p25)),
        weighted_value(&blend_inputs(&statistics, &weights, &metrics, |s| s.p75)),
    ) {
        (Some(low), Some(high)) => Some(TradingRange {
            low: low.min(high),
            high: low.max(high),
        }),
        _ => None,
    };

    let relative_multiples = statistics
        .iter()
        .filter_map(|s| {
            let own = target_multiples.get(s.multiple_type)?;
            Some(RelativeMultiple {
                multiple_type: s.multiple_type,
                target: own,
                peer_median: s.median,
                premium: relative_change(own, s.median)?,
            })
        })
        .collect();

    let output = CompsOutput {
        ticker: target.ticker.clone(),
        sector: target.category(),
        current_price: price,
        upside: fair_value.and_then(|fv| relative_change(fv, price)),
        fair_value,
        trading_range,
        peer_count: peers.len(),
        selection_method: selection.method.clone(),
        match_level: selection.match_level,
        relaxation_step: selection.relaxation_step,
        peers,
        statistics,
        implied_values,
        target_multiples,
        relative_multiples,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(Some(with_metadata(
        "Trading comparables (sector-weighted peer median multiples)",
        &serde_json::json!({
            "universe_size": universe.len(),
            "weights": weights
                .iter()
                .map(|(m, w)| (m.to_string(), *w))
                .collect::<Vec<_>>(),
        }),
        warnings,
        elapsed,
        output,
    )))
}

/// Sector weights for (P/E, P/B, EV/EBITDA, P/TBV).
pub fn sector_weights(category: SectorCategory) -> [(MultipleType, Decimal); 4] {
    #[rustfmt::skip]
    let (pe, pb, ev, tbv) = match category {
        SectorCategory::Financial => (dec!(0.5), dec!(0.0), dec!(0.0), dec!(0.5)),
        SectorCategory::Technology => (dec!(0.3), dec!(0.1), dec!(0.6), dec!(0.0)),
        SectorCategory::ConsumerCyclical
        | SectorCategory::Industrial
        | SectorCategory::BasicMaterials
        | SectorCategory::Energy => (dec!(0.4), dec!(0.2), dec!(0.4), dec!(0.0)),
        SectorCategory::ConsumerNonCyclical => (dec!(0.6), dec!(0.1), dec!(0.3), dec!(0.0)),
        SectorCategory::Utilities => (dec!(0.5), dec!(0.5), dec!(0.0), dec!(0.0)),
        _ => (dec!(0.4), dec!(0.3), dec!(0.3), dec!(0.0)),
    };
    [
        (MultipleType::PriceEarnings, pe),
        (MultipleType::PriceBook, pb),
        (MultipleType::EvEbitda, ev),
        (MultipleType::PriceTangibleBook, tbv),
    ]
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Target per-share (or, for EV/EBITDA, absolute) metrics the multiples apply to.
struct TargetMetrics {
    eps: Option<Money>,
    bvps: Option<Money>,
    tbvps: Option<Money>,
    ebitda: Option<Money>,
    net_debt: Money,
    shares: Option<Decimal>,
}

impl TargetMetrics {
    fn from_record(
        record: &StockRecord,
        price: Money,
        market_cap: Money,
        financial: bool,
        assumptions: &AssumptionSet,
    ) -> Self {
        let shares = record.shares_outstanding();
        let eps = match record.pe.filter(|pe| *pe > Decimal::ZERO) {
            Some(pe) => safe_div(price, pe),
            None => record
                .net_income
                .filter(|ni| *ni > Decimal::ZERO)
                .and_then(|ni| safe_div(ni, shares?)),
        };
        let bvps = record
            .pb
            .filter(|pb| *pb > Decimal::ZERO)
            .and_then(|pb| safe_div(price, pb));
        let tbvps = if financial {
            tangible_book_multiple(record).and_then(|ptbv| safe_div(price, ptbv))
        } else {
            None
        };
        let ebitda = if financial {
            None
        } else {
            estimate_ebitda(record, market_cap)
        };
        let sector = assumptions.sector(record.category());
        TargetMetrics {
            eps,
            bvps,
            tbvps,
            ebitda,
            net_debt: estimate_net_debt(record, sector, market_cap).net_debt,
            shares,
        }
    }

    /// Per-share value implied by `multiple` and the metric it applies to.
    fn implied(&self, multiple_type: MultipleType, multiple: Multiple) -> Option<(Money, Money)> {
        let (metric, value) = match multiple_type {
            MultipleType::PriceEarnings => {
                let eps = self.eps?;
                (eps, eps * multiple)
            }
            MultipleType::PriceBook => {
                let bvps = self.bvps?;
                (bvps, bvps * multiple)
            }
            MultipleType::PriceTangibleBook => {
                let tbvps = self.tbvps?;
                (tbvps, tbvps * multiple)
            }
            MultipleType::EvEbitda => {
                let ebitda = self.ebitda?;
                let equity = ebitda * multiple - self.net_debt;
                (ebitda, safe_div(equity, self.shares?)?)
            }
        };
        (value > Decimal::ZERO).then_some((metric, value))
    }
}

fn blend_inputs(
    statistics: &[MultipleStatistics],
    weights: &[(MultipleType, Decimal); 4],
    metrics: &TargetMetrics,
    pick: impl Fn(&MultipleStatistics) -> Multiple,
) -> Vec<ImpliedValue> {
    let mut implied: Vec<ImpliedValue> = weights
        .iter()
        .filter(|(_, w)| *w > Decimal::ZERO)
        .filter_map(|(m, w)| {
            let stats = statistics.iter().find(|s| s.multiple_type == *m)?;
            let multiple = pick(stats);
            let (target_metric, implied_value) = metrics.implied(*m, multiple)?;
            Some(ImpliedValue {
                multiple_type: *m,
                peer_median: stats.median,
                target_metric,
                implied_value,
                weight: *w,
            })
        })
        .collect();

    let total: Decimal = implied.iter().map(|i| i.weight).sum();
    for i in &mut implied {
        i.weight = safe_div(i.weight, total).unwrap_or_default();
    }
    implied
}

fn weighted_value(implied: &[ImpliedValue]) -> Option<Money> {
    if implied.is_empty() {
        return None;
    }
    Some(implied.iter().map(|i| i.implied_value * i.weight).sum())
}

fn peer_comparable(candidate: &PeerCandidate<'_>, financial_target: bool, assumptions: &AssumptionSet) -> PeerComparable {
    let record = candidate.record;
    PeerComparable {
        ticker: record.ticker.clone(),
        name: record.name.clone(),
        region: record.region.clone(),
        market_cap: record.valid_market_cap().unwrap_or_default(),
        similarity_score: candidate.similarity_score.round_dp(2),
        shared_level: candidate.shared_level,
        multiples: company_multiples(record, financial_target, assumptions),
    }
}

/// Multiples for one company. EV/EBITDA is only computed when neither side
/// is a financial; P/TBV only when the target is.
fn company_multiples(record: &StockRecord, financial_target: bool, assumptions: &AssumptionSet) -> MultipleSet {
    let in_bounds = |v: Decimal, max: Decimal| v > Decimal::ZERO && v <= max;

    let ev_ebitda = if financial_target || record.is_financial() {
        None
    } else {
        ev_to_ebitda(record, assumptions).filter(|m| in_bounds(*m, MAX_EV_TO_EBITDA))
    };
    let p_tbv = if financial_target {
        tangible_book_multiple(record).filter(|m| in_bounds(*m, MAX_PRICE_TO_TANGIBLE_BOOK))
    } else {
        None
    };

    MultipleSet {
        pe: record.pe.filter(|m| *m > Decimal::ZERO),
        pb: record.pb.filter(|m| in_bounds(*m, MAX_PRICE_TO_BOOK)),
        ev_ebitda,
        p_tbv,
    }
}

fn ev_to_ebitda(record: &StockRecord, assumptions: &AssumptionSet) -> Option<Multiple> {
    if let Some(reported) = record.ev_to_ebitda {
        return Some(reported);
    }
    let market_cap = record.valid_market_cap()?;
    let ebitda = estimate_ebitda(record, market_cap)?;
    let sector = assumptions.sector(record.category());
    let ev = market_cap + estimate_net_debt(record, sector, market_cap).net_debt;
    safe_div(ev, ebitda)
}

/// Reported EBITDA, else revenue (reported or implied by P/S) times margin.
fn estimate_ebitda(record: &StockRecord, market_cap: Money) -> Option<Money> {
    if let Some(ebitda) = record.ebitda.filter(|e| *e > Decimal::ZERO) {
        return Some(ebitda);
    }
    let margin = pct_to_rate(record.ebitda_margin?);
    let revenue = match record.revenue.filter(|r| *r > Decimal::ZERO) {
        Some(r) => r,
        None => safe_div(market_cap, record.ps.filter(|ps| *ps > Decimal::ZERO)?)?,
    };
    Some(revenue * margin).filter(|e| *e > Decimal::ZERO)
}

fn tangible_book_multiple(record: &StockRecord) -> Option<Multiple> {
    record
        .price_to_tangible_book
        .filter(|m| *m > Decimal::ZERO)
        .or_else(|| {
            record
                .pb
                .filter(|pb| *pb > Decimal::ZERO)
                .map(|pb| pb * TANGIBLE_BOOK_UPLIFT)
        })
}

fn compute_statistics(multiple_type: MultipleType, mut values: Vec<Multiple>) -> Option<MultipleStatistics> {
    if values.is_empty() {
        return None;
    }
    values.sort();
    let count = values.len();
    let sum: Decimal = values.iter().copied().sum();

    Some(MultipleStatistics {
        multiple_type,
        mean: sum / Decimal::from(count as u64),
        median: percentile_sorted(&values, dec!(0.5)),
        p25: percentile_sorted(&values, dec!(0.25)),
        p75: percentile_sorted(&values, dec!(0.75)),
        min: values[0],
        max: values[count - 1],
        count,
    })
}

/// Linear-interpolation percentile over a sorted, non-empty slice; `p` in [0, 1].
fn percentile_sorted(sorted: &[Decimal], p: Decimal) -> Decimal {
    let rank = p * Decimal::from(sorted.len() as u64 - 1);
    let lower = rank.floor();
    let frac = rank - lower;
    let idx = lower.to_usize().unwrap_or(0);
    match sorted.get(idx + 1) {
        Some(upper) if !frac.is_zero() => sorted[idx] + (*upper - sorted[idx]) * frac,
        _ => sorted[idx.min(sorted.len() - 1)],
    }
}
