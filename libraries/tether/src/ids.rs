//! Record id generation: current time in milliseconds rendered as a string,
//! bumped past the last issued value so back-to-back calls stay unique.

use std::cell::Cell;

use chrono::{DateTime, Utc};

thread_local! {
    static LAST_ISSUED: Cell<i64> = const { Cell::new(0) };
}

/// Next id for `now`. Monotonic within a thread even when called twice in the
/// same millisecond.
pub fn next_id(now: DateTime<Utc>) -> String {
    next_stamped(now).0
}

/// Like [`next_id`], but also returns the millisecond the id encodes, for
/// callers that stamp a `created` field from the same instant.
pub fn next_stamped(now: DateTime<Utc>) -> (String, DateTime<Utc>) {
    let millis = now.timestamp_millis();
    let issued = LAST_ISSUED.with(|last| {
        let issued = millis.max(last.get() + 1);
        last.set(issued);
        issued
    });
    let stamp = DateTime::from_timestamp_millis(issued).unwrap_or(now);
    (issued.to_string(), stamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_match_the_millisecond() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let id = next_id(now);
        // Either the exact millisecond or a bump past a previously issued id.
        assert!(id.parse::<i64>().unwrap() >= 1_700_000_000_000);
    }

    #[test]
    fn same_millisecond_calls_stay_unique_and_ordered() {
        let now = Utc::now();
        let a = next_id(now);
        let b = next_id(now);
        let c = next_id(now);
        assert!(a.parse::<i64>().unwrap() < b.parse::<i64>().unwrap());
        assert!(b.parse::<i64>().unwrap() < c.parse::<i64>().unwrap());
    }

    #[test]
    fn stamp_encodes_the_issued_millisecond() {
        let now = Utc::now();
        let (id, stamp) = next_stamped(now);
        assert_eq!(id.parse::<i64>().unwrap(), stamp.timestamp_millis());
    }
}
