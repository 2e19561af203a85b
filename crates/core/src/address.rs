//! Shipping address with per-field validation.
//!
//! Validation collects every failing field instead of stopping at the first
//! one so the checkout form can show all inline errors at once.

use serde::{Deserialize, Serialize};

use crate::types::Email;

/// A ship-to address as entered at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub street1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
    pub phone: String,
    pub email: String,
}

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// All field errors for one address.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("invalid shipping address ({} field errors)", .errors.len())]
pub struct AddressErrors {
    pub errors: Vec<FieldError>,
}

impl AddressErrors {
    /// Whether the given field has an error.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

fn require(errors: &mut Vec<FieldError>, field: &'static str, value: &str, min: usize) {
    let len = value.trim().chars().count();
    if len == 0 {
        errors.push(FieldError {
            field,
            message: format!("{field} is required"),
        });
    } else if len < min {
        errors.push(FieldError {
            field,
            message: format!("{field} must be at least {min} characters"),
        });
    }
}

impl ShippingAddress {
    /// Validate every field.
    ///
    /// # Errors
    ///
    /// Returns [`AddressErrors`] listing each invalid field.
    pub fn validate(&self) -> Result<(), AddressErrors> {
        let mut errors = Vec::new();

        require(&mut errors, "name", &self.name, 2);
        require(&mut errors, "street1", &self.street1, 3);
        require(&mut errors, "city", &self.city, 2);
        require(&mut errors, "state", &self.state, 2);
        require(&mut errors, "postal_code", &self.postal_code, 3);

        let postal = self.postal_code.trim();
        if !postal.is_empty()
            && !postal
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-')
        {
            errors.push(FieldError {
                field: "postal_code",
                message: "postal_code contains invalid characters".to_owned(),
            });
        }

        let country = self.country.trim();
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            errors.push(FieldError {
                field: "country",
                message: "country must be a two-letter code".to_owned(),
            });
        }

        let digits = self.phone.chars().filter(char::is_ascii_digit).count();
        let phone_chars_ok = self
            .phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '+' | '(' | ')' | '.'));
        if digits < 7 || !phone_chars_ok {
            errors.push(FieldError {
                field: "phone",
                message: "phone must contain at least 7 digits".to_owned(),
            });
        }

        if let Err(e) = Email::parse(&self.email) {
            errors.push(FieldError {
                field: "email",
                message: e.to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AddressErrors { errors })
        }
    }

    /// Copy with surrounding whitespace trimmed, country uppercased and
    /// email lowercased.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            name: self.name.trim().to_owned(),
            street1: self.street1.trim().to_owned(),
            street2: self
                .street2
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
            city: self.city.trim().to_owned(),
            state: self.state.trim().to_owned(),
            postal_code: self.postal_code.trim().to_owned(),
            country: self.country.trim().to_ascii_uppercase(),
            phone: self.phone.trim().to_owned(),
            email: self.email.trim().to_lowercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ShippingAddress {
        ShippingAddress {
            name: "Ada Lovelace".to_owned(),
            street1: "12 Analytical Way".to_owned(),
            street2: None,
            city: "Portland".to_owned(),
            state: "OR".to_owned(),
            postal_code: "97201".to_owned(),
            country: "US".to_owned(),
            phone: "+1 (503) 555-0100".to_owned(),
            email: "ada@example.com".to_owned(),
        }
    }

    #[test]
    fn test_valid_address_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_collects_all_field_errors() {
        let address = ShippingAddress {
            name: String::new(),
            country: "USA".to_owned(),
            phone: "12".to_owned(),
            email: "nope".to_owned(),
            ..valid()
        };
        let Err(errors) = address.validate() else {
            panic!("expected validation errors");
        };
        assert!(errors.has("name"));
        assert!(errors.has("country"));
        assert!(errors.has("phone"));
        assert!(errors.has("email"));
        assert!(!errors.has("city"));
        assert_eq!(errors.errors.len(), 4);
    }

    #[test]
    fn test_postal_code_characters() {
        let address = ShippingAddress {
            postal_code: "SW1A 1AA".to_owned(),
            country: "GB".to_owned(),
            ..valid()
        };
        assert!(address.validate().is_ok());

        let address = ShippingAddress {
            postal_code: "972#01".to_owned(),
            ..valid()
        };
        assert!(address.validate().is_err());
    }

    #[test]
    fn test_normalized_drops_blank_street2() {
        let address = ShippingAddress {
            street2: Some("   ".to_owned()),
            country: " us ".to_owned(),
            email: "Ada@Example.com".to_owned(),
            ..valid()
        };
        let normalized = address.normalized();
        assert_eq!(normalized.street2, None);
        assert_eq!(normalized.country, "US");
        assert_eq!(normalized.email, "ada@example.com");
    }
}
