use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_buffer(config)?;
    validate_retention(config)?;
    validate_search(config)?;
    Ok(())
}

fn positive(value: u64, field: &'static str) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::NotPositive { field });
    }
    Ok(())
}

fn validate_buffer(config: &Config) -> Result<(), ValidationError> {
    positive(config.buffer.batch_size as u64, "buffer.batch_size")?;
    positive(config.buffer.debounce_ms, "buffer.debounce_ms")?;
    Ok(())
}

fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    positive(config.retention.max_size.as_u64(), "retention.max_size")?;
    positive(
        config.retention.max_retention_days as u64,
        "retention.max_retention_days",
    )?;
    positive(
        config.retention.check_interval_secs,
        "retention.check_interval_secs",
    )?;
    Ok(())
}

fn validate_search(config: &Config) -> Result<(), ValidationError> {
    positive(
        config.search.preview_session_count as u64,
        "search.preview_session_count",
    )?;
    positive(config.search.target_batch_size, "search.target_batch_size")?;
    positive(config.search.results_limit as u64, "search.results_limit")?;
    positive(config.search.top_messages as u64, "search.top_messages")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::ByteSize;
    use crate::model::Severity;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = Config::default();
        config.buffer.batch_size = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::NotPositive {
                field: "buffer.batch_size"
            })
        ));
    }

    #[test]
    fn test_zero_max_size_rejected() {
        let mut config = Config::default();
        config.retention.max_size = ByteSize(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_any_immediate_severity_accepted() {
        let mut config = Config::default();
        config.buffer.immediate_severities.insert(Severity::Verbose);
        config.buffer.immediate_severities.insert(Severity::Debug);
        assert!(validate(&config).is_ok());

        config.buffer.immediate_severities.clear();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_results_limit_rejected() {
        let mut config = Config::default();
        config.search.results_limit = 0;
        assert!(validate(&config).is_err());
    }
}
