//! Time formatting helpers.

use std::fmt;

use jiff::{tz::TimeZone, SignedDuration, Timestamp};

/// A timestamp shown as `YYYY-MM-DD HH:MM:SS TZ` in the system timezone.
pub struct LocalDateTime<'a>(pub &'a Timestamp);

impl fmt::Display for LocalDateTime<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.0
                .to_zoned(TimeZone::system())
                .strftime("%Y-%m-%d %H:%M:%S %Z")
        )
    }
}

/// Time between two instants as `1h 05m` or `12m 30s`.
pub struct Elapsed {
    pub from: Timestamp,
    pub to: Timestamp,
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let span: SignedDuration = self.to.duration_since(self.from);
        let total = span.as_secs().max(0);
        let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
        if hours > 0 {
            write!(f, "{hours}h {minutes:02}m")
        } else {
            write!(f, "{minutes}m {seconds:02}s")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_format() {
        let from = Timestamp::from_second(1_700_000_000).unwrap();
        let to = Timestamp::from_second(1_700_000_000 + 750).unwrap();
        assert_eq!(Elapsed { from, to }.to_string(), "12m 30s");

        let to = Timestamp::from_second(1_700_000_000 + 3900).unwrap();
        assert_eq!(Elapsed { from, to }.to_string(), "1h 05m");

        // Clock skew never shows a negative duration.
        assert_eq!(Elapsed { from: to, to: from }.to_string(), "0m 00s");
    }
}
