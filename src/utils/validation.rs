use crate::utils::error::{Result, TrandError};
use chrono::NaiveTime;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(TrandError::MissingConfigError {
            field: field_name.to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(TrandError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(TrandError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(TrandError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(TrandError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(TrandError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TrandError::MissingConfigError {
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
        return Err(TrandError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// 解析 `HH:MM` (UTC) 通知時間
pub fn parse_clock_time(field_name: &str, value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| {
        TrandError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Expected HH:MM in UTC: {}", e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("webhook_url", "https://discord.com/api/webhooks/1/abc").is_ok());
        assert!(validate_url("webhook_url", "http://localhost:8080").is_ok());
        assert!(validate_url("webhook_url", "").is_err());
        assert!(validate_url("webhook_url", "invalid-url").is_err());
        assert!(validate_url("webhook_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("retry.attempts", 3, 1).is_ok());
        assert!(validate_positive_number("retry.attempts", 0, 1).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("completion.temperature", 0.5, 0.0, 2.0).is_ok());
        assert!(validate_range("completion.temperature", 2.5, 0.0, 2.0).is_err());
    }

    #[test]
    fn test_parse_clock_time() {
        let t = parse_clock_time("NOTIFICATION_TIMES", "09:00").unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert!(parse_clock_time("NOTIFICATION_TIMES", " 01:30 ").is_ok());
        assert!(parse_clock_time("NOTIFICATION_TIMES", "25:00").is_err());
        assert!(parse_clock_time("NOTIFICATION_TIMES", "9am").is_err());
    }
}
