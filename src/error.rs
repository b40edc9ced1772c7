use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("entrustment level {0} is outside 1..=5")]
    EntrustmentOutOfRange(i32),

    #[error("date range starts on {start} but ends on {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("lookback of {0} months is out of range")]
    InvalidMonths(i64),

    #[error("snapshot holds assessments for {0} trainees; pick one with --trainee")]
    MultipleTrainees(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        assert_eq!(
            ValidationError::EntrustmentOutOfRange(7).to_string(),
            "entrustment level 7 is outside 1..=5"
        );
        assert!(ValidationError::InvalidMonths(0).to_string().contains("of 0 months"));
        assert!(ValidationError::MultipleTrainees(2).to_string().contains("--trainee"));
    }
}
