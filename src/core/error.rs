use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidInputError {
    #[error("{field} must be >= 0")]
    Negative { field: &'static str },
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("{field} must be > 0")]
    NotPositive { field: &'static str },
    #[error("annualRatePercent must be > -100")]
    RateTooLow,
    #[error("assetAllocations are required")]
    EmptyAllocations,
    #[error("assetAllocations must sum to 100% (got {total})")]
    AllocationTotal { total: f64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteCallError {
    #[error("simulation request timed out after {millis} ms")]
    Timeout { millis: u64 },
    #[error("simulation endpoint unreachable: {0}")]
    Transport(String),
    #[error("simulation endpoint returned HTTP {status}")]
    Status { status: u16 },
    #[error("simulation endpoint rejected the request: {0}")]
    Rejected(String),
    #[error("invalid simulation response: {0}")]
    Decode(String),
    #[error("simulation task failed: {0}")]
    TaskFailed(String),
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),
}

pub(crate) fn non_negative(field: &'static str, value: f64) -> Result<(), InvalidInputError> {
    if !value.is_finite() {
        return Err(InvalidInputError::NotFinite { field });
    }
    if value < 0.0 {
        return Err(InvalidInputError::Negative { field });
    }
    Ok(())
}

pub(crate) fn millis(limit: std::time::Duration) -> u64 {
    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn millis_saturates_instead_of_truncating() {
        assert_eq!(millis(Duration::from_millis(1_500)), 1_500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
