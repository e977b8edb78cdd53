//! Shared utility functions used across multiple modules.

/// Current Unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Next edit timestamp for a record last touched at `previous`.
///
/// The wall clock may not have advanced since the last write; edits must
/// still carry a strictly greater `updated_at`.
pub fn next_edit_timestamp(previous: i64) -> i64 {
    now_ms().max(previous + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_positive() {
        assert!(now_ms() > 0);
    }

    #[test]
    fn next_edit_timestamp_is_strictly_greater() {
        let now = now_ms();
        assert!(next_edit_timestamp(now) > now);

        let future = now + 60_000;
        assert_eq!(next_edit_timestamp(future), future + 1);
    }
}
