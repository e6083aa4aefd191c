/// Input validation helpers
///
/// All checks run before any store is touched; a rejected payload mutates
/// nothing.
use crate::error::{ApiError, Result};
use crate::models::DeviceDescriptor;
use validator::ValidationError;

/// OTP codes are exactly six ASCII digits.
pub const OTP_CODE_LENGTH: usize = 6;

/// E.164: leading '+', then 7 to 15 digits.
pub fn is_valid_e164(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix('+') else {
        return false;
    };
    (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

pub fn validate_phone(phone: &str) -> Result<()> {
    if !is_valid_e164(phone) {
        return Err(ApiError::Validation(
            "Phone number must be in E.164 format (e.g., +14155551234)".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_otp_code(code: &str) -> Result<()> {
    if code.len() != OTP_CODE_LENGTH || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::Validation(
            "Invalid verification code format".to_string(),
        ));
    }
    Ok(())
}

/// validator crate compatible custom validator for E.164 phone numbers
pub fn e164_shape_validator(phone: &str) -> std::result::Result<(), ValidationError> {
    if is_valid_e164(phone) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_phone"))
    }
}

/// validator crate compatible custom validator for OTP codes
pub fn otp_shape_validator(code: &str) -> std::result::Result<(), ValidationError> {
    if code.len() == OTP_CODE_LENGTH && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_otp"))
    }
}

pub fn validate_device(device: &DeviceDescriptor) -> Result<()> {
    if device.device_id.is_empty() || device.device_id.len() > 128 {
        return Err(ApiError::Validation(
            "deviceId must be 1-128 characters".to_string(),
        ));
    }
    if device.platform.is_empty() || device.platform.len() > 32 {
        return Err(ApiError::Validation(
            "platform must be 1-32 characters".to_string(),
        ));
    }
    if device.device_name.is_empty() || device.device_name.len() > 128 {
        return Err(ApiError::Validation(
            "deviceName must be 1-128 characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_e164() {
        assert!(is_valid_e164("+15551234567"));
        assert!(is_valid_e164("+442071838750"));
    }

    #[test]
    fn test_invalid_e164() {
        assert!(!is_valid_e164("15551234567")); // missing '+'
        assert!(!is_valid_e164("+1555")); // too short
        assert!(!is_valid_e164("+1555123456789012")); // too long
        assert!(!is_valid_e164("+1555abc4567")); // non-digit
        assert!(!is_valid_e164(""));
    }

    #[test]
    fn test_otp_code_format() {
        assert!(validate_otp_code("123456").is_ok());
        assert!(validate_otp_code("12345").is_err());
        assert!(validate_otp_code("12345a").is_err());
        assert!(validate_otp_code("1234567").is_err());
    }

    #[test]
    fn test_device_descriptor() {
        let good = DeviceDescriptor {
            device_id: "d1".to_string(),
            platform: "ios".to_string(),
            device_name: "iPhone".to_string(),
        };
        assert!(validate_device(&good).is_ok());

        let empty_id = DeviceDescriptor {
            device_id: String::new(),
            ..good.clone()
        };
        assert!(validate_device(&empty_id).is_err());
    }
}
