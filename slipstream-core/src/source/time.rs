//! Rational time representation shared by sources and consumers.
//!
//! Packet timestamps are integer tick counts interpreted against a per-stream
//! [`TimeBase`]. Consumer-facing requests carry a [`MediaTime`], a tick value
//! plus its own timescale, so callers are not required to know any stream's
//! native time base.

use std::cmp::Ordering;
use std::fmt;

/// Rational time base of a stream: `num / den` seconds per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    /// Numerator of the tick duration in seconds.
    pub num: i32,
    /// Denominator of the tick duration in seconds.
    pub den: i32,
}

impl TimeBase {
    /// Creates a time base of `num / den` seconds per tick.
    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Converts a tick count in this time base to seconds.
    pub fn ticks_to_seconds(&self, ticks: i64) -> f64 {
        ticks as f64 * self.num as f64 / self.den as f64
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// A point in media time: `value / timescale` seconds.
///
/// Comparison is by the represented time, not by the raw fields, so
/// `900/900` and `1/1` are equal. A reserved positive-infinity value exists
/// for "seek to the very end" requests.
#[derive(Debug, Clone, Copy)]
pub struct MediaTime {
    /// Tick count.
    pub value: i64,
    /// Ticks per second.
    pub timescale: i32,
}

impl MediaTime {
    /// Time zero.
    pub const ZERO: MediaTime = MediaTime {
        value: 0,
        timescale: 1,
    };

    /// The time past the end of any stream.
    pub const POSITIVE_INFINITY: MediaTime = MediaTime {
        value: i64::MAX,
        timescale: 1,
    };

    /// Creates a time of `value / timescale` seconds.
    pub fn new(value: i64, timescale: i32) -> Self {
        Self { value, timescale }
    }

    /// Whether this is the reserved positive-infinity value.
    pub fn is_positive_infinity(&self) -> bool {
        self.value == i64::MAX
    }

    /// This time in seconds.
    pub fn seconds(&self) -> f64 {
        if self.is_positive_infinity() {
            f64::INFINITY
        } else {
            self.value as f64 / self.timescale as f64
        }
    }
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_positive_infinity(), other.is_positive_infinity()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            // Cross-multiply in i128 so mixed timescales compare exactly
            (false, false) => {
                let lhs = self.value as i128 * other.timescale as i128;
                let rhs = other.value as i128 * self.timescale as i128;
                lhs.cmp(&rhs)
            }
        }
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_positive_infinity() {
            write!(f, "+inf")
        } else {
            write!(f, "{}/{}s", self.value, self.timescale)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_across_timescales() {
        let a = MediaTime::new(900, 900);
        let b = MediaTime::new(1, 1);
        let c = MediaTime::new(48000, 48000);

        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_ne!(MediaTime::new(2, 1), b);
    }

    #[test]
    fn test_ordering_across_timescales() {
        let half = MediaTime::new(1, 2);
        let one = MediaTime::new(90000, 90000);

        assert!(half < one);
        assert!(one > half);
        assert!(MediaTime::ZERO < half);
    }

    #[test]
    fn test_positive_infinity() {
        let inf = MediaTime::POSITIVE_INFINITY;

        assert!(inf.is_positive_infinity());
        assert!(inf > MediaTime::new(i64::MAX - 1, 1));
        assert_eq!(inf, MediaTime::POSITIVE_INFINITY);
        assert!(inf.seconds().is_infinite());
    }

    #[test]
    fn test_seconds_conversion() {
        assert_eq!(MediaTime::new(3, 2).seconds(), 1.5);
        assert_eq!(TimeBase::new(1, 1000).ticks_to_seconds(2500), 2.5);
    }
}
