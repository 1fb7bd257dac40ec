use thiserror::Error;

/// Errors raised while turning bootstrap replicates into thresholds.
#[derive(Error, Debug, PartialEq)]
pub enum ThresholdError {
    #[error("Cannot estimate a percentile from an empty replicate sequence.")]
    EmptyReplicates,
    #[error("Probability {0} lies outside [0, 1].")]
    ProbabilityOutOfRange(f64),
}

/// The symmetric bracket `(-a, +a)` for one probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdBracket {
    pub lower: f64,
    pub upper: f64,
}

impl ThresholdBracket {
    pub fn symmetric(a: f64) -> Self {
        Self {
            lower: -a,
            upper: a,
        }
    }

    /// The half-width `a`.
    pub fn half_width(&self) -> f64 {
        self.upper
    }

    /// Whether `value` lies inside the closed bracket.
    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Percentile of an ascending slice with linear interpolation between order statistics.
///
/// `q` is in percent. The position `q / 100 * (n - 1)` is split into an order statistic
/// and a fraction; the fraction is applied only when the neighbouring order statistics
/// differ, which keeps infinite replicates from turning into NaN. The sequence must not
/// contain NaN.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> Result<f64, ThresholdError> {
    if sorted.is_empty() {
        return Err(ThresholdError::EmptyReplicates);
    }
    if !(0.0..=100.0).contains(&q) {
        return Err(ThresholdError::ProbabilityOutOfRange(q / 100.0));
    }

    let position = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = position.floor() as usize;
    let hi = position.ceil().min((sorted.len() - 1) as f64) as usize;
    let fraction = position - lo as f64;

    let (a, b) = (sorted[lo], sorted[hi]);
    if fraction == 0.0 || a == b {
        return Ok(a);
    }
    if b.is_infinite() {
        return Ok(b);
    }
    // Rounding must not carry the value past either neighbour.
    Ok((a + (b - a) * fraction).clamp(a, b))
}

/// Brackets `(-a(p), +a(p))` for every probability, with `a(p)` the `100 p`-th
/// percentile of the replicates. A NaN replicate counts as `+∞`.
pub fn estimate_brackets(
    replicates: &[f64],
    probabilities: &[f64],
) -> Result<Vec<ThresholdBracket>, ThresholdError> {
    let mut sorted: Vec<f64> = replicates
        .iter()
        .map(|&v| if v.is_nan() { f64::INFINITY } else { v })
        .collect();
    sorted.sort_by(f64::total_cmp);

    probabilities
        .iter()
        .map(|&p| {
            if !(0.0..=1.0).contains(&p) {
                return Err(ThresholdError::ProbabilityOutOfRange(p));
            }
            percentile_sorted(&sorted, 100.0 * p).map(ThresholdBracket::symmetric)
        })
        .collect()
}
