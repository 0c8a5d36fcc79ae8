use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use num_rational::Rational64;

use crate::foundation::error::{PipelineError, PipelineResult};

/// Quantization step used when turning floating-point scale factors into exact tick ratios.
const SCALE_QUANTUM: i64 = 1_000_000;

/// Largest accepted `num` or `den`; keeps the cross products in rate conversions within `i64`.
pub const MAX_RATE_TERM: u32 = i32::MAX as u32;

/// A rational frame rate `num/den` frames per second.
///
/// Used both for human-facing rates (display rate, output rate) and for the tick resolution of a
/// sequence, which is just a very fine frame rate (e.g. `24000/1`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FrameRate {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl FrameRate {
    /// Create a validated frame rate.
    pub fn new(num: u32, den: u32) -> PipelineResult<Self> {
        let rate = Self { num, den };
        rate.validate()?;
        Ok(rate)
    }

    /// Check that numerator and denominator are non-zero and at most [`MAX_RATE_TERM`].
    pub fn validate(self) -> PipelineResult<()> {
        if self.den == 0 {
            return Err(PipelineError::validation("FrameRate den must be > 0"));
        }
        if self.num == 0 {
            return Err(PipelineError::validation("FrameRate num must be > 0"));
        }
        if self.num > MAX_RATE_TERM || self.den > MAX_RATE_TERM {
            return Err(PipelineError::validation(format!(
                "FrameRate {}/{} has a term above {MAX_RATE_TERM}",
                self.num, self.den
            )));
        }
        Ok(())
    }

    /// Frames per second as a float.
    pub fn as_decimal(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn as_interval(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    /// Convert a time expressed in frames of this rate to seconds.
    pub fn as_seconds(self, time: FrameTime) -> f64 {
        let secs = time.0 * Rational64::new(i64::from(self.den), i64::from(self.num));
        ratio_to_f64(secs)
    }

    /// Re-express `time` (frames of `from`) as frames of `to`. Exact.
    pub fn transform_time(time: FrameTime, from: FrameRate, to: FrameRate) -> FrameTime {
        let scale = Rational64::new(
            i64::from(to.num) * i64::from(from.den),
            i64::from(to.den) * i64::from(from.num),
        );
        FrameTime(time.0 * scale)
    }

    /// Ratio `self / other`, e.g. inner-to-outer tick resolution dilation.
    pub fn ratio_to(self, other: FrameRate) -> Rational64 {
        Rational64::new(
            i64::from(self.num) * i64::from(other.den),
            i64::from(self.den) * i64::from(other.num),
        )
    }
}

/// A whole tick on a sequence timeline.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct FrameNumber(pub i64);

impl Add<i64> for FrameNumber {
    type Output = FrameNumber;
    fn add(self, rhs: i64) -> FrameNumber {
        FrameNumber(self.0 + rhs)
    }
}

impl Sub<i64> for FrameNumber {
    type Output = FrameNumber;
    fn sub(self, rhs: i64) -> FrameNumber {
        FrameNumber(self.0 - rhs)
    }
}

impl Sub for FrameNumber {
    type Output = i64;
    fn sub(self, rhs: FrameNumber) -> i64 {
        self.0 - rhs.0
    }
}

impl AddAssign<i64> for FrameNumber {
    fn add_assign(&mut self, rhs: i64) {
        self.0 += rhs;
    }
}

impl SubAssign<i64> for FrameNumber {
    fn sub_assign(&mut self, rhs: i64) {
        self.0 -= rhs;
    }
}

/// An exact, possibly fractional, position or duration in ticks.
///
/// The whole part is [`FrameTime::frame_number`] (floor) and the remainder is
/// [`FrameTime::sub_frame`], always in `[0, 1)`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct FrameTime(pub Rational64);

impl Default for FrameTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl FrameTime {
    /// Zero ticks.
    pub const ZERO: FrameTime = FrameTime(Rational64::new_raw(0, 1));

    /// One whole tick.
    pub const ONE: FrameTime = FrameTime(Rational64::new_raw(1, 1));

    /// A whole number of ticks.
    pub fn from_frame(frame: FrameNumber) -> Self {
        Self(Rational64::from_integer(frame.0))
    }

    /// `numer / denom` ticks. Panics if `denom == 0`.
    pub fn from_ratio(numer: i64, denom: i64) -> Self {
        Self(Rational64::new(numer, denom))
    }

    /// Whole-tick part (floor).
    pub fn frame_number(self) -> FrameNumber {
        FrameNumber(self.0.floor().to_integer())
    }

    /// Fractional part in `[0, 1)`.
    pub fn sub_frame(self) -> FrameTime {
        FrameTime(self.0 - self.0.floor())
    }

    /// Round down to a whole tick.
    pub fn floor_to_frame(self) -> FrameNumber {
        self.frame_number()
    }

    /// Round up to a whole tick.
    pub fn ceil_to_frame(self) -> FrameNumber {
        FrameNumber(self.0.ceil().to_integer())
    }

    /// Round to the nearest whole tick (halves away from zero).
    pub fn round_to_frame(self) -> FrameNumber {
        FrameNumber(self.0.round().to_integer())
    }

    /// Lossy float view, for logging and wall-clock conversion only.
    pub fn as_f64(self) -> f64 {
        ratio_to_f64(self.0)
    }

    /// Return `true` when there is no fractional part.
    pub fn is_whole(self) -> bool {
        self.0.is_integer()
    }

    /// Multiply by a float factor, quantized to millionths so repeated scaling stays exact.
    pub fn scaled(self, factor: f64) -> Self {
        let numer = (factor * SCALE_QUANTUM as f64).round() as i64;
        Self(self.0 * Rational64::new(numer, SCALE_QUANTUM))
    }
}

impl From<FrameNumber> for FrameTime {
    fn from(frame: FrameNumber) -> Self {
        Self::from_frame(frame)
    }
}

impl Add for FrameTime {
    type Output = FrameTime;
    fn add(self, rhs: FrameTime) -> FrameTime {
        FrameTime(self.0 + rhs.0)
    }
}

impl Sub for FrameTime {
    type Output = FrameTime;
    fn sub(self, rhs: FrameTime) -> FrameTime {
        FrameTime(self.0 - rhs.0)
    }
}

impl Neg for FrameTime {
    type Output = FrameTime;
    fn neg(self) -> FrameTime {
        FrameTime(-self.0)
    }
}

impl AddAssign for FrameTime {
    fn add_assign(&mut self, rhs: FrameTime) {
        self.0 += rhs.0;
    }
}

impl SubAssign for FrameTime {
    fn sub_assign(&mut self, rhs: FrameTime) {
        self.0 -= rhs.0;
    }
}

impl Mul<Rational64> for FrameTime {
    type Output = FrameTime;
    fn mul(self, rhs: Rational64) -> FrameTime {
        FrameTime(self.0 * rhs)
    }
}

impl Mul<i64> for FrameTime {
    type Output = FrameTime;
    fn mul(self, rhs: i64) -> FrameTime {
        FrameTime(self.0 * Rational64::from_integer(rhs))
    }
}

impl Div<i64> for FrameTime {
    type Output = FrameTime;
    fn div(self, rhs: i64) -> FrameTime {
        FrameTime(self.0 / Rational64::from_integer(rhs))
    }
}

/// Half-open tick range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TickRange {
    /// Inclusive range start.
    pub start: FrameNumber,
    /// Exclusive range end.
    pub end: FrameNumber,
}

impl TickRange {
    /// Create a validated range with `start <= end`.
    pub fn new(start: FrameNumber, end: FrameNumber) -> PipelineResult<Self> {
        if start > end {
            return Err(PipelineError::validation("TickRange start must be <= end"));
        }
        Ok(Self { start, end })
    }

    /// Shorthand for tests and fixtures. Panics when `start > end`.
    pub fn ticks(start: i64, end: i64) -> Self {
        assert!(start <= end, "TickRange start must be <= end");
        Self {
            start: FrameNumber(start),
            end: FrameNumber(end),
        }
    }

    /// Number of ticks in the range.
    pub fn len(self) -> i64 {
        (self.end - self.start).max(0)
    }

    /// Return `true` when the range has no ticks.
    pub fn is_empty(self) -> bool {
        self.end <= self.start
    }

    /// Return `true` when `t` is inside `[start, end)`.
    pub fn contains(self, t: FrameNumber) -> bool {
        self.start <= t && t < self.end
    }

    /// Overlap of two ranges, or `None` when they do not overlap.
    pub fn intersect(self, other: TickRange) -> Option<TickRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(TickRange { start, end })
    }

    /// Smallest range covering both inputs.
    pub fn hull(self, other: TickRange) -> TickRange {
        TickRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Move the start earlier by `before` ticks and the end later by `after` ticks.
    pub fn dilated(self, before: i64, after: i64) -> TickRange {
        TickRange {
            start: self.start - before,
            end: (self.end + after).max(self.start - before),
        }
    }

    /// Shift both bounds by `delta` ticks.
    pub fn shift(self, delta: i64) -> TickRange {
        TickRange {
            start: self.start + delta,
            end: self.end + delta,
        }
    }

    /// Parts of `self` not covered by `other`, in ascending order.
    pub fn difference(self, other: TickRange) -> Vec<TickRange> {
        let Some(overlap) = self.intersect(other) else {
            return if self.is_empty() { vec![] } else { vec![self] };
        };
        let mut out = Vec::with_capacity(2);
        if self.start < overlap.start {
            out.push(TickRange {
                start: self.start,
                end: overlap.start,
            });
        }
        if overlap.end < self.end {
            out.push(TickRange {
                start: overlap.end,
                end: self.end,
            });
        }
        out
    }

    /// Re-express the range in another resolution: start rounds down, end rounds up.
    pub fn transform(self, from: FrameRate, to: FrameRate) -> TickRange {
        let start = FrameRate::transform_time(self.start.into(), from, to).floor_to_frame();
        let end = FrameRate::transform_time(self.end.into(), from, to).ceil_to_frame();
        TickRange { start, end }
    }
}

fn ratio_to_f64(r: Rational64) -> f64 {
    *r.numer() as f64 / *r.denom() as f64
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
