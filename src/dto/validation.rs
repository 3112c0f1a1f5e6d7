//! Validation helpers for DTOs.

use std::collections::HashSet;

use validator::ValidationError;

fn invalid(code: &'static str, message: impl Into<String>) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into().into());
    err
}

/// Rejects text that is empty once surrounding whitespace is removed.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(invalid("blank", "Value must not be blank"));
    }
    Ok(())
}

/// Validates the option list of a question: at least two options, none blank, no duplicates.
///
/// # Examples
///
/// ```ignore
/// validate_options(&["Touchdown".into(), "Punt".into()]) // Ok
/// validate_options(&["Touchdown".into()])                // Err - single option
/// validate_options(&["Punt".into(), "Punt".into()])      // Err - duplicate
/// ```
pub fn validate_options(options: &[String]) -> Result<(), ValidationError> {
    if options.len() < 2 {
        return Err(invalid(
            "options_count",
            format!("At least two options are required (got {})", options.len()),
        ));
    }

    if options.iter().any(|option| option.trim().is_empty()) {
        return Err(invalid("options_blank", "Options must not be blank"));
    }

    let mut seen = HashSet::new();
    if let Some(duplicate) = options.iter().find(|option| !seen.insert(option.as_str())) {
        return Err(invalid(
            "options_unique",
            format!("Option `{duplicate}` is listed more than once"),
        ));
    }

    Ok(())
}

/// Validates that `correct_option`, when set, is one of `options`.
pub fn validate_correct_option(
    options: &[String],
    correct_option: Option<&str>,
) -> Result<(), ValidationError> {
    match correct_option {
        Some(correct) if !options.iter().any(|option| option == correct) => Err(invalid(
            "correct_option",
            format!("Correct option `{correct}` is not one of the options"),
        )),
        _ => Ok(()),
    }
}

/// Validates an optional RFC 3339 timestamp.
pub fn validate_timestamp(value: &str) -> Result<(), ValidationError> {
    match super::parse_system_time(value) {
        Some(_) => Ok(()),
        None => Err(invalid(
            "timestamp",
            format!("`{value}` is not an RFC 3339 timestamp"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn test_validate_options_valid() {
        assert!(validate_options(&options(&["Touchdown", "Punt"])).is_ok());
        assert!(validate_options(&options(&["A", "B", "C", "D"])).is_ok());
    }

    #[test]
    fn test_validate_options_invalid() {
        assert!(validate_options(&options(&["Touchdown"])).is_err()); // single option
        assert!(validate_options(&options(&["Touchdown", "  "])).is_err()); // blank
        assert!(validate_options(&options(&["Punt", "Punt"])).is_err()); // duplicate
        assert!(validate_options(&[]).is_err());
    }

    #[test]
    fn test_validate_correct_option() {
        let choices = options(&["Touchdown", "Punt"]);
        assert!(validate_correct_option(&choices, None).is_ok());
        assert!(validate_correct_option(&choices, Some("Punt")).is_ok());
        assert!(validate_correct_option(&choices, Some("punt")).is_err());
    }

    #[test]
    fn test_validate_timestamp() {
        assert!(validate_timestamp("2026-02-01T18:30:00Z").is_ok());
        assert!(validate_timestamp("tomorrow").is_err());
    }
}
