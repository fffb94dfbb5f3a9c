//! Validation utilities

use chrono::NaiveDate;

use crate::traits::*;
use crate::types::*;

/// Validate that an account ID is valid
pub fn validate_account_id(account_id: &str) -> ReconResult<()> {
    if account_id.trim().is_empty() {
        return Err(ReconciliationError::Validation(
            "Account ID cannot be empty".to_string(),
        ));
    }

    if account_id.len() > 50 {
        return Err(ReconciliationError::Validation(
            "Account ID cannot exceed 50 characters".to_string(),
        ));
    }

    // Check for valid characters (alphanumeric, dashes, underscores)
    if !account_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ReconciliationError::Validation(
            "Account ID can only contain alphanumeric characters, dashes, and underscores"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validate that a reconciliation period is ordered
pub fn validate_period(period_start: NaiveDate, period_end: NaiveDate) -> ReconResult<()> {
    if period_start >= period_end {
        return Err(ReconciliationError::Validation(format!(
            "Period start {period_start} must be before period end {period_end}"
        )));
    }

    Ok(())
}

/// Validate that a match confidence is within bounds
pub fn validate_confidence(confidence: u8) -> ReconResult<()> {
    if confidence > 100 {
        return Err(ReconciliationError::Validation(format!(
            "Confidence {confidence} exceeds 100"
        )));
    }

    Ok(())
}

/// Session validator with stricter rules than the default
///
/// Adds account ID shape checks and rejects periods longer than a year,
/// which almost always indicate a typo in the statement dates.
pub struct StrictSessionValidator;

impl SessionValidator for StrictSessionValidator {
    fn validate_session(&self, session: &ReconciliationSession) -> ReconResult<()> {
        validate_account_id(&session.account_id)?;
        validate_period(session.period_start, session.period_end)?;

        let period_days = (session.period_end - session.period_start).num_days();
        if period_days > 366 {
            return Err(ReconciliationError::Validation(format!(
                "Reconciliation period of {period_days} days exceeds one year"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_ids_are_shape_checked() {
        assert!(validate_account_id("acct-1_checking").is_ok());
        assert!(validate_account_id("").is_err());
        assert!(validate_account_id("has spaces").is_err());
    }

    #[test]
    fn periods_must_be_ordered() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert!(validate_period(start, end).is_ok());
        assert!(validate_period(end, start).is_err());
        assert!(validate_period(start, start).is_err());
    }
}
