//! Comparable-company selection.
//!
//! The universe is filtered through a fixed list of relaxation levels, from
//! "same sub-industry, same region, similar size" out to "same sector
//! category, wide size band". The first level that yields at least
//! [`MIN_PEERS`] candidates wins; survivors are ranked by a similarity score
//! and the best [`MAX_PEERS`] are kept.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assumptions::SectorCategory;
use crate::stock::{ClassificationLevel, StockRecord};
use crate::types::{safe_div, Money};

pub const MIN_PEERS: usize = 3;
pub const MAX_PEERS: usize = 8;

const MAX_PEER_PE: Decimal = dec!(100);

const SAME_REGION_BONUS: Decimal = dec!(15);
const SIZE_PROXIMITY_WEIGHT: Decimal = dec!(25);
const PROFILE_PROXIMITY_MAX: Decimal = dec!(10);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How closely a peer had to match the target's classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MatchLevel {
    SectorCategory,
    Sector,
    IndustryGroup,
    Industry,
    SubIndustry,
}

impl From<ClassificationLevel> for MatchLevel {
    fn from(level: ClassificationLevel) -> Self {
        match level {
            ClassificationLevel::Sector => MatchLevel::Sector,
            ClassificationLevel::IndustryGroup => MatchLevel::IndustryGroup,
            ClassificationLevel::Industry => MatchLevel::Industry,
            ClassificationLevel::SubIndustry => MatchLevel::SubIndustry,
        }
    }
}

impl MatchLevel {
    /// Similarity points for sharing this level with the target.
    fn specificity_bonus(&self) -> Decimal {
        match self {
            MatchLevel::SubIndustry => dec!(40),
            MatchLevel::Industry => dec!(30),
            MatchLevel::IndustryGroup => dec!(20),
            MatchLevel::Sector => dec!(10),
            MatchLevel::SectorCategory => Decimal::ZERO,
        }
    }
}

impl std::fmt::Display for MatchLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchLevel::SectorCategory => write!(f, "Sector category"),
            MatchLevel::Sector => write!(f, "Sector"),
            MatchLevel::IndustryGroup => write!(f, "Industry group"),
            MatchLevel::Industry => write!(f, "Industry"),
            MatchLevel::SubIndustry => write!(f, "Sub-industry"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LevelScope {
    /// The deepest level the target carries
    MostSpecific,
    Fixed(ClassificationLevel),
    Category,
}

/// One step of the relaxation search.
#[derive(Debug, Clone, Copy)]
pub struct RelaxationLevel {
    scope: LevelScope,
    same_region: bool,
    min_cap_ratio: Decimal,
    max_cap_ratio: Decimal,
}

/// Relaxation levels, narrowest first.
pub const RELAXATION_LEVELS: [RelaxationLevel; 5] = [
    RelaxationLevel {
        scope: LevelScope::MostSpecific,
        same_region: true,
        min_cap_ratio: dec!(0.5),
        max_cap_ratio: dec!(2.0),
    },
    RelaxationLevel {
        scope: LevelScope::MostSpecific,
        same_region: false,
        min_cap_ratio: dec!(0.33),
        max_cap_ratio: dec!(3.0),
    },
    RelaxationLevel {
        scope: LevelScope::Fixed(ClassificationLevel::Industry),
        same_region: false,
        min_cap_ratio: dec!(0.33),
        max_cap_ratio: dec!(3.0),
    },
    RelaxationLevel {
        scope: LevelScope::Fixed(ClassificationLevel::IndustryGroup),
        same_region: false,
        min_cap_ratio: dec!(0.33),
        max_cap_ratio: dec!(3.0),
    },
    RelaxationLevel {
        scope: LevelScope::Category,
        same_region: false,
        min_cap_ratio: dec!(0.2),
        max_cap_ratio: dec!(5.0),
    },
];

impl RelaxationLevel {
    /// The concrete level this step matches on for `target`, or `None` when
    /// the target lacks the classification and the step must be skipped.
    fn match_level(&self, target: &StockRecord) -> Option<MatchLevel> {
        match self.scope {
            LevelScope::MostSpecific => target
                .classification
                .most_specific_level()
                .map(MatchLevel::from),
            LevelScope::Fixed(level) => target
                .classification
                .label_at(level)
                .map(|_| MatchLevel::from(level)),
            LevelScope::Category => {
                if target.category() == SectorCategory::Unclassified {
                    None
                } else {
                    Some(MatchLevel::SectorCategory)
                }
            }
        }
    }

    fn describe(&self, level: MatchLevel) -> String {
        let region = if self.same_region { "same region" } else { "any region" };
        format!(
            "{level} match, {region}, {}x-{}x market cap",
            self.min_cap_ratio, self.max_cap_ratio
        )
    }

    fn admits(&self, target: &StockRecord, target_cap: Money, peer: &StockRecord, level: MatchLevel) -> bool {
        let classified = match level {
            MatchLevel::SectorCategory => peer.category() == target.category(),
            MatchLevel::Sector => target.classification.matches_at(&peer.classification, ClassificationLevel::Sector),
            MatchLevel::IndustryGroup => target
                .classification
                .matches_at(&peer.classification, ClassificationLevel::IndustryGroup),
            MatchLevel::Industry => target.classification.matches_at(&peer.classification, ClassificationLevel::Industry),
            MatchLevel::SubIndustry => target
                .classification
                .matches_at(&peer.classification, ClassificationLevel::SubIndustry),
        };
        if !classified {
            return false;
        }
        if self.same_region && !same_region(target, peer) {
            return false;
        }
        let Some(ratio) = peer.valid_market_cap().and_then(|cap| safe_div(cap, target_cap)) else {
            return false;
        };
        ratio >= self.min_cap_ratio && ratio <= self.max_cap_ratio
    }
}

/// A universe member retained for one selection call.
#[derive(Debug, Clone)]
pub struct PeerCandidate<'a> {
    pub record: &'a StockRecord,
    pub similarity_score: Decimal,
    /// |peer market cap - target market cap|
    pub market_cap_distance: Money,
    /// Deepest classification level shared with the target
    pub shared_level: MatchLevel,
}

#[derive(Debug, Clone)]
pub struct PeerSelection<'a> {
    /// Ranked by similarity, at most [`MAX_PEERS`]
    pub peers: Vec<PeerCandidate<'a>>,
    /// Human-readable description of the accepted relaxation level
    pub method: String,
    /// 1-based index into [`RELAXATION_LEVELS`]
    pub relaxation_step: usize,
    pub match_level: MatchLevel,
    /// No level reached [`MIN_PEERS`]; the level with most candidates was used
    pub below_minimum: bool,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Select and rank comparable companies for `target` from `universe`.
///
/// `None` when the target has no positive market cap or no candidate
/// qualifies at any relaxation level.
pub fn select_peers<'a>(target: &StockRecord, universe: &'a [StockRecord]) -> Option<PeerSelection<'a>> {
    let target_cap = target.valid_market_cap()?;
    let eligible: Vec<&StockRecord> = universe.iter().filter(|p| is_eligible(target, p)).collect();

    let mut best: Option<(usize, MatchLevel, Vec<&StockRecord>)> = None;
    let mut accepted = None;

    for (idx, level) in RELAXATION_LEVELS.iter().enumerate() {
        let Some(match_level) = level.match_level(target) else {
            debug!(ticker = %target.ticker, step = idx + 1, "relaxation level skipped, classification missing");
            continue;
        };
        let found: Vec<&StockRecord> = eligible
            .iter()
            .copied()
            .filter(|p| level.admits(target, target_cap, p, match_level))
            .collect();
        debug!(ticker = %target.ticker, step = idx + 1, candidates = found.len(), "relaxation level evaluated");

        if found.len() >= MIN_PEERS {
            accepted = Some((idx, match_level, found));
            break;
        }
        if best.as_ref().map_or(true, |(_, _, b)| found.len() > b.len()) {
            best = Some((idx, match_level, found));
        }
    }

    let below_minimum = accepted.is_none();
    let (idx, match_level, found) = accepted.or(best)?;
    if found.is_empty() {
        debug!(ticker = %target.ticker, "no peers at any relaxation level");
        return None;
    }

    let mut peers: Vec<PeerCandidate<'a>> = found
        .into_iter()
        .map(|p| score_candidate(target, target_cap, p))
        .collect();
    peers.sort_by(|a, b| {
        b.similarity_score
            .cmp(&a.similarity_score)
            .then(a.market_cap_distance.cmp(&b.market_cap_distance))
    });
    peers.truncate(MAX_PEERS);

    Some(PeerSelection {
        peers,
        method: RELAXATION_LEVELS[idx].describe(match_level),
        relaxation_step: idx + 1,
        match_level,
        below_minimum,
    })
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn is_eligible(target: &StockRecord, peer: &StockRecord) -> bool {
    !peer.ticker.trim().eq_ignore_ascii_case(target.ticker.trim())
        && peer.valid_market_cap().is_some()
        && peer
            .pe
            .is_some_and(|pe| pe > Decimal::ZERO && pe <= MAX_PEER_PE)
}

fn same_region(a: &StockRecord, b: &StockRecord) -> bool {
    a.region.trim().eq_ignore_ascii_case(b.region.trim())
}

fn score_candidate<'a>(target: &StockRecord, target_cap: Money, peer: &'a StockRecord) -> PeerCandidate<'a> {
    let peer_cap = peer.valid_market_cap().unwrap_or_default();
    let shared_level = target
        .classification
        .deepest_shared_level(&peer.classification)
        .map(MatchLevel::from)
        .unwrap_or(MatchLevel::SectorCategory);

    let mut score = shared_level.specificity_bonus();
    let (small, large) = if peer_cap < target_cap {
        (peer_cap, target_cap)
    } else {
        (target_cap, peer_cap)
    };
    score += SIZE_PROXIMITY_WEIGHT * safe_div(small, large).unwrap_or_default();
    if same_region(target, peer) {
        score += SAME_REGION_BONUS;
    }
    score += proximity(target.revenue_growth, peer.revenue_growth);
    score += proximity(target.ebitda_margin, peer.ebitda_margin);

    PeerCandidate {
        record: peer,
        similarity_score: score,
        market_cap_distance: (peer_cap - target_cap).abs(),
        shared_level,
    }
}

/// `max(0, 10 - |a - b| / 2)` over percentage-point figures.
fn proximity(a: Option<Decimal>, b: Option<Decimal>) -> Decimal {
    match (a, b) {
        (Some(a), Some(b)) => (PROFILE_PROXIMITY_MAX - (a - b).abs() / dec!(2)).max(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}
