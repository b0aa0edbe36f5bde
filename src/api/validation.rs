use super::ApiError;

/// Checks the length of a text field in characters.
pub fn validate_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let len = value.chars().count();
    if !(min..=max).contains(&len) {
        return Err(ApiError::validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

pub fn validate_optional_length(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Result<(), ApiError> {
    match value {
        Some(value) if value.chars().count() > max => Err(ApiError::validation(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    validate_length("email", email, 5, 100)?;

    let invalid = || ApiError::validation("email must be a valid email address");

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    validate_length("password", password, 6, 20)
}

pub fn validate_phone_number(phone: Option<&str>) -> Result<(), ApiError> {
    let Some(phone) = phone else {
        return Ok(());
    };

    validate_length("phone_number", phone, 9, 15)?;
    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-'))
    {
        return Err(ApiError::validation(
            "phone_number may only contain digits, spaces, '+' and '-'",
        ));
    }
    Ok(())
}

/// `#rgb` or `#rrggbb`.
pub fn validate_hex_color(hex: &str) -> Result<(), ApiError> {
    let valid = hex
        .strip_prefix('#')
        .is_some_and(|digits| {
            matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
        });

    if !valid {
        return Err(ApiError::validation(format!(
            "Invalid color hex '{hex}', expected #rgb or #rrggbb"
        )));
    }
    Ok(())
}

pub fn validate_id(resource: &str, id: i32) -> Result<i32, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid {resource} ID: {id}. ID must be a positive integer"
        )));
    }
    Ok(id)
}
