//! Wall-clock to UTC resolution.
//!
//! RFC 5545 §3.3.5: a local time that falls in a DST gap is interpreted with
//! the offset in effect before the gap; an ambiguous local time (fall-back)
//! takes the first occurrence, i.e. the pre-transition offset.

use std::collections::HashMap;

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// Timezones known while interpreting one calendar object.
#[derive(Debug, Clone)]
pub struct TimeZones {
    default: Tz,
    aliases: HashMap<String, Tz>,
}

impl Default for TimeZones {
    fn default() -> Self {
        TimeZones::new(Tz::UTC)
    }
}

impl TimeZones {
    /// `default` applies to floating times and all-day dates.
    pub fn new(default: Tz) -> Self {
        TimeZones {
            default,
            aliases: HashMap::new(),
        }
    }

    /// Map a non-IANA TZID (e.g. a VTIMEZONE's own identifier) to a zone.
    pub fn add_alias(&mut self, tzid: &str, tz: Tz) {
        self.aliases.insert(tzid.to_string(), tz);
    }

    pub fn default_tz(&self) -> Tz {
        self.default
    }

    pub fn with_default(mut self, default: Tz) -> Self {
        self.default = default;
        self
    }

    pub fn resolve(&self, tzid: &str) -> Option<Tz> {
        tzid.parse::<Tz>()
            .ok()
            .or_else(|| self.aliases.get(tzid).copied())
    }

    /// Resolve a TZID, falling back to the default zone for unknown identifiers.
    pub fn resolve_or_default(&self, tzid: &str) -> Tz {
        match self.resolve(tzid) {
            Some(tz) => tz,
            None => {
                tracing::warn!(tzid, "Unknown TZID, interpreting as floating time");
                self.default
            }
        }
    }
}

/// Resolve a wall-clock time in `tz` to an instant.
pub fn local_to_utc(naive: NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Gaps are at most a few hours wide; three hours earlier is safely
            // before the transition.
            let before = naive - Duration::hours(3);
            let offset = match tz.from_local_datetime(&before) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.offset().fix(),
                LocalResult::None => Utc.fix(),
            };
            (naive - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc()
        }
    }
}
