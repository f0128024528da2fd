use crate::utils::error::{EltError, Result};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(EltError::invalid_config(field_name, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(EltError::invalid_config(field_name, "Path contains null bytes"));
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(EltError::invalid_config(
            field_name,
            format!("Value must be at least {}, got {}", min_value, value),
        ));
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EltError::invalid_config(
            field_name,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

/// 密碼必須存在，且 `${VAR}` 已被替換
pub fn validate_credential(field_name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(EltError::invalid_config(field_name, "Missing credential"));
    }
    let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| EltError::ConfigParse {
        message: e.to_string(),
    })?;
    // 只回報變數名稱，不回報值本身
    if let Some(caps) = re.captures(value) {
        return Err(EltError::invalid_config(
            field_name,
            format!(
                "Missing credential: environment variable {} is not set",
                &caps[1]
            ),
        ));
    }
    Ok(())
}

/// 環境變數名稱不可為空，也不可含 `=` 或 NUL
pub fn validate_env_var_name(field_name: &str, value: &str) -> Result<()> {
    validate_non_empty_string(field_name, value)?;
    if value.contains('=') || value.contains('\0') {
        return Err(EltError::invalid_config(
            field_name,
            format!("'{}' is not a valid environment variable name", value),
        ));
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
        return Err(EltError::invalid_config(
            field_name,
            format!("Value {} must be between {} and {}", value, min, max),
        ));
    }
    Ok(())
}
