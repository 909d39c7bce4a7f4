use std::time::Duration;

use crate::error::{EngineError, Result};

/// FFmpeg-like rational number used as a time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    /// Timeline time base used by the engine: microseconds.
    pub const MICROS: Self = Self {
        num: 1,
        den: 1_000_000,
    };

    /// Creates a validated rational.
    ///
    /// # Example
    /// ```
    /// use trim_engine::Rational;
    ///
    /// let tb = Rational::new(1, 90_000).expect("valid");
    /// assert_eq!(tb.den, 90_000);
    /// ```
    pub fn new(num: i32, den: i32) -> Result<Self> {
        if num <= 0 || den <= 0 {
            return Err(EngineError::InvalidRational { num, den });
        }
        Ok(Self { num, den })
    }
}

/// Timeline base `(1, 1_000_000)`. All selection bounds are in these ticks.
pub const TIMELINE_TIME_BASE: Rational = Rational::MICROS;

/// Rescales `ts` from one time base to another with nearest rounding.
///
/// # Example
/// ```
/// use trim_engine::{Rational, TIMELINE_TIME_BASE, rescale};
///
/// let src = Rational::new(1, 90_000).expect("valid");
/// assert_eq!(rescale(90_000, src, TIMELINE_TIME_BASE), 1_000_000);
/// ```
pub fn rescale(ts: i64, from: Rational, to: Rational) -> i64 {
    let numerator = i128::from(ts) * i128::from(from.num) * i128::from(to.den);
    let denominator = i128::from(from.den) * i128::from(to.num);
    let rounded = div_round_nearest(numerator, denominator);
    rounded.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Duration of one frame in timeline ticks for a `num/den` frames-per-second rate.
pub fn frame_duration_tl(frame_rate: Rational) -> i64 {
    let numerator = i128::from(TIMELINE_TIME_BASE.den) * i128::from(frame_rate.den);
    let denominator = i128::from(frame_rate.num.max(1));
    let rounded = (numerator + denominator / 2) / denominator;
    rounded.max(1).min(i128::from(i64::MAX)) as i64
}

/// Converts wall-clock elapsed time into timeline ticks, saturating.
pub fn duration_to_tl(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX)
}

/// Converts timeline ticks into seconds for display.
pub fn tl_to_seconds(t_tl: i64) -> f64 {
    t_tl as f64 / TIMELINE_TIME_BASE.den as f64
}

/// Formats ticks as `mm:ss.mmm`; minutes keep growing past an hour.
///
/// # Example
/// ```
/// use trim_engine::time::format_timestamp;
///
/// assert_eq!(format_timestamp(83_456_789), "01:23.456");
/// ```
pub fn format_timestamp(t_tl: i64) -> String {
    let millis = t_tl.max(0) / 1_000;
    let (seconds, millis) = (millis / 1_000, millis % 1_000);
    let (minutes, seconds) = (seconds / 60, seconds % 60);
    format!("{minutes:02}:{seconds:02}.{millis:03}")
}

/// Parses `[[hh:]mm:]ss[.fraction]` into ticks.
///
/// The fractional part keeps up to microsecond precision; extra digits are
/// rejected rather than rounded.
///
/// # Example
/// ```
/// use trim_engine::time::parse_timestamp;
///
/// assert_eq!(parse_timestamp("01:23.456").expect("valid"), 83_456_000);
/// assert_eq!(parse_timestamp("2.5").expect("valid"), 2_500_000);
/// ```
pub fn parse_timestamp(input: &str) -> Result<i64> {
    let invalid = || EngineError::InvalidTimestamp {
        value: input.to_string(),
    };
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let mut parts = trimmed.rsplit(':');
    let seconds_part = parts.next().ok_or_else(invalid)?;
    let (whole, fraction) = match seconds_part.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (seconds_part, ""),
    };
    if fraction.len() > 6 || !fraction.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(invalid());
    }
    let whole_seconds = parse_component(whole).ok_or_else(invalid)?;
    let fraction_micros = if fraction.is_empty() {
        0
    } else {
        let digits = fraction.parse::<i64>().map_err(|_| invalid())?;
        digits * 10_i64.pow(6 - fraction.len() as u32)
    };

    let mut total_seconds = whole_seconds;
    for multiplier in [60_i64, 3_600] {
        let Some(part) = parts.next() else {
            break;
        };
        let value = parse_component(part).ok_or_else(invalid)?;
        total_seconds = value
            .checked_mul(multiplier)
            .and_then(|scaled| scaled.checked_add(total_seconds))
            .ok_or_else(invalid)?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }

    total_seconds
        .checked_mul(1_000_000)
        .and_then(|micros| micros.checked_add(fraction_micros))
        .ok_or_else(invalid)
}

fn parse_component(value: &str) -> Option<i64> {
    if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    value.parse::<i64>().ok()
}

fn div_round_nearest(num: i128, den: i128) -> i128 {
    debug_assert!(den > 0);

    let abs_num = num.abs();
    let mut out = abs_num / den;
    let remainder = abs_num % den;
    if remainder.saturating_mul(2) >= den {
        out += 1;
    }

    if num < 0 { -out } else { out }
}

impl From<media_ffmpeg::Rational> for Rational {
    fn from(value: media_ffmpeg::Rational) -> Self {
        Self {
            num: value.num,
            den: value.den,
        }
    }
}

impl From<Rational> for media_ffmpeg::Rational {
    fn from(value: Rational) -> Self {
        Self {
            num: value.num,
            den: value.den,
        }
    }
}
