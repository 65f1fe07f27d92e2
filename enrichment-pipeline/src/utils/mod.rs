pub mod llm_instructions;

use chrono::Utc;

/// Current time as an ISO-8601 string with offset, used for event and DLQ
/// timestamps.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn now_iso_parses_back_as_utc() {
        let stamp = now_iso();
        let parsed = DateTime::parse_from_rfc3339(&stamp).expect("valid rfc3339");
        assert_eq!(parsed.offset().local_minus_utc(), 0);
    }
}
