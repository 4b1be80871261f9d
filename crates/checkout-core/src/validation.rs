//! Sender Validation
//!
//! Input filtering and validation for the payer details collected on the
//! bank-transfer path.

use serde::{Deserialize, Serialize};

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 50;
const PHONE_MIN: usize = 7;
const PHONE_MAX: usize = 20;

/// Field-scoped validation failure
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<ValidationError> for crate::error::CheckoutError {
    fn from(e: ValidationError) -> Self {
        Self::Validation {
            field: e.field,
            message: e.message,
        }
    }
}

/// Payer identity for a bank transfer
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub name: String,
    pub phone: String,
}

impl SenderInfo {
    /// Apply a keystroke to the name field
    pub fn set_name(&mut self, input: &str) {
        self.name = filter_name_input(input);
    }

    /// Apply a keystroke to the phone field
    pub fn set_phone(&mut self, input: &str) {
        self.phone = filter_phone_input(input);
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        validate_sender_info(&self.name, &self.phone)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c.is_whitespace() || c == '\'' || c == '-'
}

fn is_phone_char(c: char) -> bool {
    c.is_ascii_digit() || c.is_whitespace() || matches!(c, '+' | '-' | '(' | ')')
}

/// Drop characters a name can never contain, keeping spacing as typed
pub fn filter_name_input(input: &str) -> String {
    input.chars().filter(|&c| is_name_char(c)).collect()
}

/// Drop characters a phone number can never contain
pub fn filter_phone_input(input: &str) -> String {
    input.chars().filter(|&c| is_phone_char(c)).collect()
}

/// Trim, strip disallowed characters and collapse runs of whitespace
pub fn sanitize_name(name: &str) -> String {
    filter_name_input(name.trim())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trim and strip everything except digits, `+ - ( )` and spaces
pub fn sanitize_phone_number(phone: &str) -> String {
    filter_phone_input(phone.trim()).trim().to_string()
}

fn is_valid_phone(phone: &str) -> bool {
    let body = phone.strip_prefix('+').unwrap_or(phone);
    let len = body.chars().count();
    (PHONE_MIN..=PHONE_MAX).contains(&len)
        && body.chars().all(is_phone_char)
        && !body.contains('+')
}

/// Validate sender details; an empty list means valid
///
/// The phone number is optional but must be well formed when present.
pub fn validate_sender_info(name: &str, phone: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let name = name.trim();
    let name_len = name.chars().count();
    if name.is_empty() {
        errors.push(ValidationError::new("name", "Name is required"));
    } else if name_len < NAME_MIN {
        errors.push(ValidationError::new(
            "name",
            "Name must be at least 2 characters",
        ));
    } else if name_len > NAME_MAX {
        errors.push(ValidationError::new(
            "name",
            "Name must be less than 50 characters",
        ));
    } else if !name.chars().all(is_name_char) {
        errors.push(ValidationError::new(
            "name",
            "Name can only contain letters, spaces, hyphens, and apostrophes",
        ));
    }

    let phone = phone.trim();
    if !phone.is_empty() && !is_valid_phone(phone) {
        errors.push(ValidationError::new(
            "phone",
            "Please enter a valid phone number",
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_valid_sender() {
        assert!(validate_sender_info("Ada O'Neil-Lovelace", "+44 (20) 7946-0958").is_empty());
        assert!(validate_sender_info("Bo", "").is_empty());
    }

    #[test]
    fn test_name_rules() {
        assert_eq!(validate_sender_info("   ", "")[0].message, "Name is required");
        assert_eq!(
            validate_sender_info("A", "")[0].message,
            "Name must be at least 2 characters"
        );
        assert_eq!(
            validate_sender_info(&"a".repeat(51), "")[0].message,
            "Name must be less than 50 characters"
        );
        assert!(validate_sender_info(&"a".repeat(50), "").is_empty());
        assert_eq!(fields(&validate_sender_info("R2D2", "")), vec!["name"]);
    }

    #[test]
    fn test_phone_rules() {
        assert_eq!(fields(&validate_sender_info("Ada", "12345")), vec!["phone"]);
        assert_eq!(fields(&validate_sender_info("Ada", "12+34567")), vec!["phone"]);
        assert_eq!(fields(&validate_sender_info("Ada", "phone: 1234567")), vec!["phone"]);
        assert!(validate_sender_info("Ada", "0803 123 4567").is_empty());
        assert_eq!(
            fields(&validate_sender_info("", "1")),
            vec!["name", "phone"]
        );
    }

    #[test]
    fn test_keystroke_filters_keep_spacing() {
        let mut sender = SenderInfo::default();
        sender.set_name("Ada 1 ");
        assert_eq!(sender.name, "Ada  ");
        sender.set_phone("+234 (0) 80-x1");
        assert_eq!(sender.phone, "+234 (0) 80-1");
    }

    #[test]
    fn test_sanitizers() {
        assert_eq!(sanitize_name("  Ada   <b>Lovelace</b> "), "Ada bLovelaceb");
        assert_eq!(sanitize_phone_number(" +1 (555) 010-9999 ext "), "+1 (555) 010-9999");
    }
}
