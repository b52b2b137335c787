use crate::error::RejectReason;
use crate::snapshot::ParamRecord;
use crate::types::ParameterType;

/// Everything that can be rejected without touching the kernel, checked in
/// order: the parameter must be live, writable, and the proposed value must
/// fit its declared type. Returns the normalized text to write.
pub fn validate(record: &ParamRecord, proposed: &str) -> Result<String, RejectReason> {
    let Some(runtime) = &record.runtime else {
        return Err(RejectReason::NotLoaded);
    };
    if !runtime.permission.is_writable() {
        return Err(RejectReason::PermissionDenied);
    }
    if record.array {
        let mut normalized = Vec::new();
        for element in proposed.split(',') {
            normalized.push(normalize_scalar(record.declared_type, element)?);
        }
        return Ok(normalized.join(","));
    }
    normalize_scalar(record.declared_type, proposed)
}

fn normalize_scalar(ty: ParameterType, raw: &str) -> Result<String, RejectReason> {
    match ty {
        ParameterType::Integer => normalize_integer(raw),
        ParameterType::Boolean => normalize_bool(raw),
        ParameterType::Text | ParameterType::Charp | ParameterType::Unknown => {
            if raw.is_empty() {
                Err(RejectReason::InvalidValue("value must not be empty".into()))
            } else {
                Ok(raw.to_string())
            }
        }
    }
}

/// Canonical decimal: no leading zeros, no plus sign. The kernel echoes
/// integers back in this form, so verify-after-write compares cleanly.
fn normalize_integer(raw: &str) -> Result<String, RejectReason> {
    let trimmed = raw.trim();
    match trimmed.parse::<i128>() {
        Ok(value) => Ok(value.to_string()),
        Err(_) => Err(RejectReason::InvalidValue(format!(
            "`{trimmed}` is not a decimal integer"
        ))),
    }
}

/// Accepted literals, case-insensitive: y/n/1/0/true/false. Normalized to
/// the kernel's own echo forms.
fn normalize_bool(raw: &str) -> Result<String, RejectReason> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "y" | "1" | "true" => Ok("Y".to_string()),
        "n" | "0" | "false" => Ok("N".to_string()),
        other => Err(RejectReason::InvalidValue(format!(
            "`{other}` is not a boolean literal (y/n/1/0/true/false)"
        ))),
    }
}
