use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::comps::multiples::CompsOutput;
use crate::comps::peers::MIN_PEERS;
use crate::types::*;
use crate::valuation::dcf::DcfOutput;

const DEFAULT_DCF_WEIGHT: Rate = dec!(0.60);
const HIGH_CONFIDENCE_BONUS: Rate = dec!(0.05);
const LOW_CONFIDENCE_PENALTY: Rate = dec!(0.15);
/// Terminal value share above which the DCF is trusted less...
const TV_SHARE_LIMIT: Rate = dec!(0.80);
/// ...and capped at this weight.
const TV_DCF_WEIGHT_CAP: Rate = dec!(0.50);
const THIN_PEER_COMPS_WEIGHT_CAP: Rate = dec!(0.30);

const HIGH_CONVERGENCE_GAP: Rate = dec!(0.10);
const MEDIUM_CONVERGENCE_GAP: Rate = dec!(0.25);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValuationMethod {
    #[serde(rename = "DCF")]
    Dcf,
    Comps,
}

impl std::fmt::Display for ValuationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValuationMethod::Dcf => write!(f, "DCF"),
            ValuationMethod::Comps => write!(f, "Comps"),
        }
    }
}

/// How closely the two methods agree, from the gap between their upsides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Convergence {
    /// Upsides within 10pp
    High,
    /// Within 25pp
    Medium,
    Low,
}

impl Convergence {
    pub fn from_gap(gap: Rate) -> Self {
        let gap = gap.abs();
        if gap < HIGH_CONVERGENCE_GAP {
            Convergence::High
        } else if gap < MEDIUM_CONVERGENCE_GAP {
            Convergence::Medium
        } else {
            Convergence::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodContribution {
    pub method: ValuationMethod,
    pub fair_value: Money,
    pub upside: Rate,
    pub weight: Rate,
    /// weight x fair value
    pub contribution: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendOutput {
    pub ticker: String,
    pub current_price: Money,
    pub fair_value: Money,
    pub upside: Rate,
    pub dcf_weight: Rate,
    pub comps_weight: Rate,
    pub contributions: Vec<MethodContribution>,
    /// Absent unless both methods produced a value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convergence: Option<Convergence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upside_gap: Option<Rate>,
    /// Weight adjustments applied, in order
    pub adjustments: Vec<String>,
}

/// DCF weight after the confidence, terminal-value and thin-peer rules.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendWeights {
    pub dcf: Rate,
    pub comps: Rate,
    pub adjustments: Vec<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Combine DCF and Comps fair values into one target.
///
/// A method without a fair value drops out and the other takes 100%.
/// `None` when neither produced a value.
pub fn blend_valuations(
    dcf: Option<&DcfOutput>,
    comps: Option<&CompsOutput>,
) -> Option<ComputationOutput<BlendOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let comps_value = comps.and_then(|c| Some((c, c.fair_value?, c.upside?)));

    let (ticker, price, weights) = match (dcf, comps_value) {
        (Some(d), Some((c, _, _))) => (d.ticker.clone(), d.current_price, blend_weights(d, c)),
        (Some(d), None) => {
            warnings.push("Comps unavailable; blend uses DCF only".into());
            (d.ticker.clone(), d.current_price, single_method(ValuationMethod::Dcf))
        }
        (None, Some((c, _, _))) => {
            warnings.push("DCF unavailable; blend uses Comps only".into());
            (c.ticker.clone(), c.current_price, single_method(ValuationMethod::Comps))
        }
        (None, None) => return None,
    };

    let mut contributions = Vec::with_capacity(2);
    if let Some(d) = dcf {
        contributions.push(MethodContribution {
            method: ValuationMethod::Dcf,
            fair_value: d.fair_value,
            upside: d.upside,
            weight: weights.dcf,
            contribution: d.fair_value * weights.dcf,
        });
    }
    if let Some((_, fair_value, upside)) = comps_value {
        contributions.push(MethodContribution {
            method: ValuationMethod::Comps,
            fair_value,
            upside,
            weight: weights.comps,
            contribution: fair_value * weights.comps,
        });
    }

    let fair_value: Money = contributions.iter().map(|c| c.contribution).sum();
    let upside_gap = match (dcf, comps_value) {
        (Some(d), Some((_, _, comps_upside))) => Some((d.upside - comps_upside).abs()),
        _ => None,
    };
    let convergence = upside_gap.map(Convergence::from_gap);
    if convergence == Some(Convergence::Low) {
        warnings.push("DCF and Comps disagree by 25pp or more of upside".into());
    }

    let output = BlendOutput {
        ticker,
        current_price: price,
        fair_value,
        upside: relative_change(fair_value, price).unwrap_or_default(),
        dcf_weight: weights.dcf,
        comps_weight: weights.comps,
        contributions,
        convergence,
        upside_gap,
        adjustments: weights.adjustments,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Some(with_metadata(
        "Confidence-weighted blend of DCF and trading comps",
        &serde_json::json!({
            "default_dcf_weight": DEFAULT_DCF_WEIGHT,
            "tv_share_limit": TV_SHARE_LIMIT,
            "thin_peer_comps_cap": THIN_PEER_COMPS_WEIGHT_CAP,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Weights for a DCF/Comps pair, starting from 60/40.
pub fn blend_weights(dcf: &DcfOutput, comps: &CompsOutput) -> BlendWeights {
    let mut dcf_weight = DEFAULT_DCF_WEIGHT;
    let mut adjustments = Vec::new();

    match dcf.confidence {
        Confidence::High => {
            dcf_weight += HIGH_CONFIDENCE_BONUS;
            adjustments.push(format!("DCF confidence High: +{HIGH_CONFIDENCE_BONUS} to DCF"));
        }
        Confidence::Low => {
            dcf_weight -= LOW_CONFIDENCE_PENALTY;
            adjustments.push(format!("DCF confidence Low: -{LOW_CONFIDENCE_PENALTY} to DCF"));
        }
        _ => {}
    }

    if let Some(share) = dcf.terminal_value_share {
        if share > TV_SHARE_LIMIT && dcf_weight > TV_DCF_WEIGHT_CAP {
            dcf_weight = TV_DCF_WEIGHT_CAP;
            adjustments.push(format!(
                "Terminal value {}% of EV: DCF capped at {TV_DCF_WEIGHT_CAP}",
                (share * dec!(100)).round_dp(1)
            ));
        }
    }

    if comps.peer_count < MIN_PEERS && Decimal::ONE - dcf_weight > THIN_PEER_COMPS_WEIGHT_CAP {
        dcf_weight = Decimal::ONE - THIN_PEER_COMPS_WEIGHT_CAP;
        adjustments.push(format!(
            "Only {} peer(s): Comps capped at {THIN_PEER_COMPS_WEIGHT_CAP}",
            comps.peer_count
        ));
    }

    BlendWeights {
        dcf: dcf_weight,
        comps: Decimal::ONE - dcf_weight,
        adjustments,
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn single_method(method: ValuationMethod) -> BlendWeights {
    let dcf = match method {
        ValuationMethod::Dcf => Decimal::ONE,
        ValuationMethod::Comps => Decimal::ZERO,
    };
    BlendWeights {
        dcf,
        comps: Decimal::ONE - dcf,
        adjustments: vec![format!("{method} is the only available method")],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
