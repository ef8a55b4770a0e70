use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum WheelError {
    #[error("wheel must have at least one segment")]
    Empty,
    #[error("wheel has too many segments (got={got}, max={max})")]
    TooManySegments { got: usize, max: usize },
    #[error("segment {index} has a non-finite multiplier")]
    NonFiniteMultiplier { index: usize },
    #[error("segment {index} removes more than the whole balance")]
    BeyondTotalLoss { index: usize },
}

/// Maximum number of segments; the computation encodes the segment count as a single byte.
pub const MAX_SEGMENTS: usize = u8::MAX as usize;

/// Signed credit transform attached to a segment.
///
/// `Multiplier(m)` moves the balance by `balance * m`; `Percent(p)` by `balance * p / 100`.
/// Negative values subtract. Either way the resulting balance is clamped at zero.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SegmentEffect {
    Multiplier(f64),
    Percent(i32),
}

impl SegmentEffect {
    /// Balance after applying the effect, rounded half away from zero.
    pub fn apply(&self, balance: u64) -> u64 {
        match *self {
            Self::Percent(percent) => {
                // Exact integer arithmetic so percentages like 30% do not pick up float error.
                let scaled = balance as i128 * (100 + percent as i128);
                if scaled <= 0 {
                    return 0;
                }
                let rounded = (scaled + 50) / 100;
                u64::try_from(rounded).unwrap_or(u64::MAX)
            }
            Self::Multiplier(multiplier) => {
                let next = (balance as f64 * (1.0 + multiplier)).round();
                if next.is_nan() || next <= 0.0 {
                    0
                } else {
                    // Float-to-int casts saturate.
                    next as u64
                }
            }
        }
    }

    /// Signed change produced by applying the effect to `balance`.
    pub fn delta(&self, balance: u64) -> i128 {
        self.apply(balance) as i128 - balance as i128
    }
}

impl fmt::Display for SegmentEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Percent(percent) => write!(f, "{percent:+}%"),
            Self::Multiplier(multiplier) => write!(f, "{:+}%", (multiplier * 100.0).round() as i64),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub label: String,
    pub effect: SegmentEffect,
}

impl Segment {
    pub fn percent(percent: i32) -> Self {
        let effect = SegmentEffect::Percent(percent);
        Self {
            label: effect.to_string(),
            effect,
        }
    }
}

/// Fixed wheel configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Wheel {
    segments: Vec<Segment>,
}

impl Wheel {
    pub fn new(segments: Vec<Segment>) -> Result<Self, WheelError> {
        if segments.is_empty() {
            return Err(WheelError::Empty);
        }
        if segments.len() > MAX_SEGMENTS {
            return Err(WheelError::TooManySegments {
                got: segments.len(),
                max: MAX_SEGMENTS,
            });
        }
        for (index, segment) in segments.iter().enumerate() {
            match segment.effect {
                SegmentEffect::Multiplier(multiplier) if !multiplier.is_finite() => {
                    return Err(WheelError::NonFiniteMultiplier { index });
                }
                SegmentEffect::Multiplier(multiplier) if multiplier < -1.0 => {
                    return Err(WheelError::BeyondTotalLoss { index });
                }
                SegmentEffect::Percent(percent) if percent < -100 => {
                    return Err(WheelError::BeyondTotalLoss { index });
                }
                _ => {}
            }
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_count(&self) -> u8 {
        // Bounded by MAX_SEGMENTS in `new`.
        self.segments.len() as u8
    }

    /// Map a 1-based computation result onto a segment index.
    ///
    /// Out-of-range results (including 0) clamp to the nearest segment instead of wrapping.
    pub fn segment_index(&self, raw_result: u64) -> usize {
        let last = self.segments.len() - 1;
        usize::try_from(raw_result.saturating_sub(1))
            .unwrap_or(usize::MAX)
            .min(last)
    }

    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    /// Resolve a 1-based result to its segment.
    pub fn resolve(&self, raw_result: u64) -> (usize, &Segment) {
        let index = self.segment_index(raw_result);
        (index, &self.segments[index])
    }
}

impl Default for Wheel {
    fn default() -> Self {
        Self {
            segments: [200, -60, 30, -80, 50, -20, 100, -40]
                .into_iter()
                .map(Segment::percent)
                .collect(),
        }
    }
}

/// Whether a spin counts against the daily allowance and is reflected in rankings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinMode {
    Daily,
    Practice,
}

impl SpinMode {
    pub fn affects_ledger(&self) -> bool {
        matches!(self, Self::Daily)
    }
}

/// Transient result of a settled spin, before it is applied to the ledger.
#[derive(Clone, Debug, PartialEq)]
pub struct SpinOutcome {
    pub segment_index: usize,
    pub segment_effect: SegmentEffect,
    pub counts_toward_leaderboard: bool,
    /// Transaction reference of the finalized computation; absent for demo outcomes.
    pub proof_reference: Option<String>,
}
