use crate::utils::error::{PulseError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.trim().is_empty() {
        return Err(PulseError::MissingConfigError {
            field: field_name.to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(PulseError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(PulseError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(PulseError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(PulseError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(PulseError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PulseError::MissingConfigError {
            field: field_name.to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(PulseError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

pub fn validate_one_of(field_name: &str, values: &[String], allowed: &[&str]) -> Result<()> {
    for value in values {
        if !allowed.contains(&value.as_str()) {
            return Err(PulseError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: value.clone(),
                reason: format!("Unsupported value. Valid values: {}", allowed.join(", ")),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("posthog.host", "https://us.posthog.com").is_ok());
        assert!(validate_url("assistant.ollama_url", "http://localhost:11434/api/chat").is_ok());
        assert!(validate_url("posthog.host", "").is_err());
        assert!(validate_url("posthog.host", "invalid-url").is_err());
        assert!(validate_url("posthog.host", "ftp://example.com").is_err());
    }

    #[test]
    fn test_blank_required_values_are_reported_missing() {
        let err = validate_non_empty_string("assistant.model", "   ").unwrap_err();
        assert!(matches!(err, PulseError::MissingConfigError { ref field } if field == "assistant.model"));

        let err = validate_url("posthog.host", "").unwrap_err();
        assert!(matches!(err, PulseError::MissingConfigError { ref field } if field == "posthog.host"));
        assert!(err.recovery_suggestion().contains("posthog.host"));
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("reports.period_days", 7, 1).is_ok());
        assert!(validate_positive_number("reports.period_days", 0, 1).is_err());
    }

    #[test]
    fn test_validate_one_of() {
        let formats = vec!["json".to_string(), "csv".to_string()];
        assert!(validate_one_of("reports.output_formats", &formats, &["json", "csv"]).is_ok());

        let invalid = vec!["xml".to_string()];
        assert!(validate_one_of("reports.output_formats", &invalid, &["json", "csv"]).is_err());
    }

    #[test]
    fn test_validate_path_rejects_nul() {
        assert!(validate_path("bootstrap.project_dir", "./site").is_ok());
        assert!(validate_path("bootstrap.project_dir", "a\0b").is_err());
    }
}
