use chrono::{Duration, SubsecRound, Utc};

/// Conversion jobs are keyed by a random UUID, assigned once at upload.
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<Utc>;

/// Allocate a fresh job identifier.
pub fn new_job_id() -> JobId {
    uuid::Uuid::new_v4()
}

/// The current time at the precision the job store persists (microseconds).
pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(6)
}

/// Timestamp for the next persisted transition of a record last touched at
/// `previous`.
///
/// Always strictly greater than `previous`, even when the wall clock has not
/// advanced past it at storage precision.
pub fn next_timestamp(previous: Timestamp) -> Timestamp {
    let current = now();
    if current > previous {
        current
    } else {
        previous + Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_timestamp_is_strictly_after_previous() {
        let previous = now();
        assert!(next_timestamp(previous) > previous);
    }

    #[test]
    fn next_timestamp_handles_future_previous() {
        let previous = now() + Duration::seconds(60);
        let next = next_timestamp(previous);
        assert_eq!(next, previous + Duration::microseconds(1));
    }

    #[test]
    fn now_has_microsecond_precision() {
        let ts = now();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000, 0);
    }
}
