use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use std::time::Instant;
use tracing::{debug, trace};

use crate::assumptions::AssumptionSet;
use crate::error::FairValueError;
use crate::stock::StockRecord;
use crate::types::{ComputationMetadata, ComputationOutput};
use crate::valuation::config::DcfOverrides;
use crate::valuation::dcf::compute_dcf;
use crate::FairValueResult;

const HISTOGRAM_BINS: usize = 25;
const MAX_TRIALS: u32 = 1_000_000;

// ---------------------------------------------------------------------------
// Helper: build ComputationOutput without requiring Decimal
// ---------------------------------------------------------------------------

fn with_metadata_f64<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    /// Number of trials (1 to 1,000,000).
    #[serde(default = "default_trials")]
    pub trials: u32,
    /// Optional seed for reproducibility.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_trials() -> u32 {
    1_000
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        MonteCarloConfig {
            trials: default_trials(),
            seed: None,
        }
    }
}

impl MonteCarloConfig {
    pub fn seeded(trials: u32, seed: u64) -> Self {
        MonteCarloConfig {
            trials,
            seed: Some(seed),
        }
    }
}

/// A clamped normal draw around a base-case assumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawSpec {
    pub name: String,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl DrawSpec {
    fn new(name: &str, mean: f64, std_dev: f64, min: f64, max: f64) -> Self {
        DrawSpec {
            name: name.to_string(),
            mean,
            std_dev,
            min,
            max,
        }
    }

    fn distribution(&self) -> FairValueResult<Normal> {
        Normal::new(self.mean, self.std_dev).map_err(|e| FairValueError::InvalidInput {
            field: self.name.clone(),
            reason: format!("Invalid Normal parameters: {e}"),
        })
    }
}

/// Percentile summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McPercentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

/// A single histogram bin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
    pub frequency: f64,
}

/// Fair-value distribution across the completed trials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloOutput {
    pub ticker: String,
    pub current_price: f64,
    pub base_fair_value: f64,
    pub trials_requested: u32,
    pub trials_completed: u32,
    pub trials_discarded: u32,
    pub draws: Vec<DrawSpec>,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: McPercentiles,
    pub histogram: Vec<HistogramBin>,
    /// Share of trials with fair value above the current price
    pub probability_above_price: f64,
    /// Median fair value / price - 1
    pub median_upside: f64,
}

/// One set of sampled assumptions.
#[derive(Debug, Clone, Copy)]
struct TrialDraw {
    growth: f64,
    terminal_growth: f64,
    beta: f64,
    equity_risk_premium: f64,
}

impl TrialDraw {
    fn to_overrides(self, base: &DcfOverrides) -> Option<DcfOverrides> {
        let rate = |x: f64| Decimal::from_f64(x).map(|d| d.round_dp(6));
        let draw = DcfOverrides {
            initial_growth: Some(rate(self.growth)?),
            terminal_growth: Some(rate(self.terminal_growth)?),
            beta: Some(rate(self.beta)?),
            equity_risk_premium: Some(rate(self.equity_risk_premium)?),
            ..DcfOverrides::default()
        };
        Some(base.merged_with(&draw))
    }
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Compute the percentile value from a **sorted** slice using linear interpolation.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Build a histogram with `num_bins` equal-width bins.
fn build_histogram(sorted: &[f64], num_bins: usize) -> Vec<HistogramBin> {
    let min_val = sorted[0];
    let max_val = sorted[sorted.len() - 1];

    // Degenerate distribution: zero-width bins, every trial in the first
    if (max_val - min_val).abs() < f64::EPSILON {
        return (0..num_bins)
            .map(|i| HistogramBin {
                lower: min_val,
                upper: min_val,
                count: if i == 0 { sorted.len() as u32 } else { 0 },
                frequency: if i == 0 { 1.0 } else { 0.0 },
            })
            .collect();
    }

    let bin_width = (max_val - min_val) / num_bins as f64;
    let n = sorted.len() as f64;

    let mut bins: Vec<HistogramBin> = (0..num_bins)
        .map(|i| HistogramBin {
            lower: min_val + i as f64 * bin_width,
            upper: if i == num_bins - 1 {
                max_val
            } else {
                min_val + (i + 1) as f64 * bin_width
            },
            count: 0,
            frequency: 0.0,
        })
        .collect();

    for &val in sorted {
        let idx = (((val - min_val) / bin_width).floor() as usize).min(num_bins - 1);
        bins[idx].count += 1;
    }
    for bin in &mut bins {
        bin.frequency = bin.count as f64 / n;
    }
    bins
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Re-run the DCF with growth, terminal growth, beta and equity risk premium
/// drawn from clamped normals centred on the base case.
///
/// Forecast horizon and base FCFF are held at the base case so every trial
/// values the same cash-flow stream. Draws are made sequentially from one
/// RNG, so a seed fixes the output regardless of how trials are scheduled.
/// `Ok(None)` when the base-case DCF is absent.
pub fn dcf_monte_carlo(
    record: &StockRecord,
    assumptions: &AssumptionSet,
    overrides: &DcfOverrides,
    config: &MonteCarloConfig,
) -> FairValueResult<Option<ComputationOutput<MonteCarloOutput>>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if config.trials == 0 || config.trials > MAX_TRIALS {
        return Err(FairValueError::InvalidInput {
            field: "trials".into(),
            reason: format!("Must be between 1 and {MAX_TRIALS}, got {}", config.trials),
        });
    }

    let Some((base, base_config)) = compute_dcf(record, assumptions, overrides, &mut warnings)? else {
        return Ok(None);
    };

    let held = overrides.merged_with(&DcfOverrides {
        forecast_years: Some(base_config.forecast_years),
        base_fcf: Some(base.base_fcf),
        ..DcfOverrides::default()
    });

    let g0 = base_config.initial_growth.to_f64().unwrap_or(0.0);
    let draws = vec![
        DrawSpec::new("initial_growth", g0, (0.2 * g0.abs()).max(0.005), -0.15, 0.35),
        DrawSpec::new(
            "terminal_growth",
            base_config.terminal_growth.to_f64().unwrap_or(0.0),
            0.005,
            0.0,
            0.06,
        ),
        DrawSpec::new("beta", base.capital_cost.beta.to_f64().unwrap_or(1.0), 0.15, 0.4, 2.5),
        DrawSpec::new(
            "equity_risk_premium",
            base_config.equity_risk_premium.to_f64().unwrap_or(0.0),
            0.005,
            0.03,
            0.12,
        ),
    ];
    let normals = draws
        .iter()
        .map(DrawSpec::distribution)
        .collect::<FairValueResult<Vec<Normal>>>()?;

    let mut rng = match config.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let mut draw = |i: usize| rng.sample(normals[i]).clamp(draws[i].min, draws[i].max);
    let samples: Vec<TrialDraw> = (0..config.trials)
        .map(|_| TrialDraw {
            growth: draw(0),
            terminal_growth: draw(1),
            beta: draw(2),
            equity_risk_premium: draw(3),
        })
        .collect();

    let outcomes: Vec<Option<f64>> = samples
        .par_iter()
        .enumerate()
        .map(|(trial, sample)| run_trial(trial, *sample, record, assumptions, &held))
        .collect();

    let mut fair_values: Vec<f64> = outcomes.into_iter().flatten().collect();
    let completed = fair_values.len() as u32;
    let discarded = config.trials - completed;
    debug!(ticker = %record.ticker, completed, discarded, "Monte Carlo trials finished");

    if fair_values.is_empty() {
        return Err(FairValueError::InsufficientData(
            "Every Monte Carlo trial was discarded".into(),
        ));
    }
    if discarded > 0 {
        warnings.push(format!(
            "{discarded} of {} trials discarded as numerically invalid",
            config.trials
        ));
    }

    fair_values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = fair_values.len() as f64;
    let mean = fair_values.iter().sum::<f64>() / n;
    let variance = fair_values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let median = median_sorted(&fair_values);

    let price = base.current_price.to_f64().unwrap_or(0.0);
    let above = fair_values.iter().filter(|&&v| v > price).count();
    let median_upside = if price > 0.0 { median / price - 1.0 } else { 0.0 };

    let output = MonteCarloOutput {
        ticker: base.ticker.clone(),
        current_price: price,
        base_fair_value: base.fair_value.to_f64().unwrap_or(0.0),
        trials_requested: config.trials,
        trials_completed: completed,
        trials_discarded: discarded,
        draws,
        mean,
        median,
        std_dev: variance.sqrt(),
        min: fair_values[0],
        max: fair_values[fair_values.len() - 1],
        percentiles: McPercentiles {
            p5: percentile_sorted(&fair_values, 5.0),
            p10: percentile_sorted(&fair_values, 10.0),
            p25: percentile_sorted(&fair_values, 25.0),
            p50: percentile_sorted(&fair_values, 50.0),
            p75: percentile_sorted(&fair_values, 75.0),
            p90: percentile_sorted(&fair_values, 90.0),
            p95: percentile_sorted(&fair_values, 95.0),
        },
        histogram: build_histogram(&fair_values, HISTOGRAM_BINS),
        probability_above_price: above as f64 / n,
        median_upside,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(Some(with_metadata_f64(
        "Monte Carlo DCF (normal draws on growth, terminal growth, beta, ERP)",
        &serde_json::json!({
            "trials": config.trials,
            "seed": config.seed,
            "forecast_years": base_config.forecast_years,
            "base_fcf": base.base_fcf,
            "region": base_config.region,
        }),
        warnings,
        elapsed,
        output,
    )))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn run_trial(
    trial: usize,
    sample: TrialDraw,
    record: &StockRecord,
    assumptions: &AssumptionSet,
    held: &DcfOverrides,
) -> Option<f64> {
    let Some(overrides) = sample.to_overrides(held) else {
        trace!(trial, "draw not representable as decimal, discarding");
        return None;
    };
    let mut trial_warnings = Vec::new();
    match compute_dcf(record, assumptions, &overrides, &mut trial_warnings) {
        Ok(Some((out, _))) => out.fair_value.to_f64().filter(|v| v.is_finite()),
        Ok(None) => {
            trace!(trial, "trial produced no valuation, discarding");
            None
        }
        Err(e) => {
            trace!(trial, error = %e, "trial failed, discarding");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
