//! # Validation Module
//!
//! Input validation for Emporia. Runs before any state is read, so a
//! failure here never leaves a partial write behind.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (storefront / admin UI)                               │
//! │  └── Deserialization: enums, fixed-point money strings                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Quantities, amounts, codes, free-text limits                      │
//! │  └── Returns ValidationError (ErrorKind::Validation)                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints (quantity >= 0, remaining <= amount)            │
//! │  └── UNIQUE constraints (referral_code, order_id per commission)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use emporia_core::validation::{validate_quantity, validate_referral_code};
//!
//! validate_quantity(250).unwrap();
//! assert_eq!(validate_referral_code(" abc123 ").unwrap(), "ABC123");
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn required_trimmed<'a>(field: &str, value: &'a str, max: usize) -> ValidationResult<&'a str> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(value)
}

/// Validates and normalizes a referral code.
///
/// ## Rules
/// - Must not be empty
/// - At most 32 characters
/// - Letters, digits and hyphens only
///
/// Codes are case-insensitive; the normalized form is uppercase.
pub fn validate_referral_code(code: &str) -> ValidationResult<String> {
    let code = required_trimmed("referral_code", code, 32)?;

    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: "referral_code".to_string(),
            reason: "must contain only letters, numbers, and hyphens".to_string(),
        });
    }

    Ok(code.to_ascii_uppercase())
}

/// Validates a flavor or strength label used as a pricing key.
pub fn validate_variant_label(field: &str, value: &str) -> ValidationResult<()> {
    required_trimmed(field, value, 100).map(|_| ())
}

/// Validates a display name (user or product).
pub fn validate_name(name: &str) -> ValidationResult<()> {
    required_trimmed("name", name, 200).map(|_| ())
}

/// Validates an email address. Only the shape is checked; delivery is
/// the session layer's concern.
///
/// ```rust
/// use emporia_core::validation::validate_email;
///
/// assert!(validate_email("buyer@example.com").is_ok());
/// assert!(validate_email("buyer").is_err());
/// ```
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let email = required_trimmed("email", email, 254)?;

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };

    if !valid || email.contains(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "email".to_string(),
            reason: "must look like name@domain.tld".to_string(),
        });
    }

    Ok(())
}

/// Payout destination free text (bank reference, wallet address).
pub fn validate_payment_details(details: &str) -> ValidationResult<()> {
    if details.chars().count() > 500 {
        return Err(ValidationError::TooLong {
            field: "payment_details".to_string(),
            max: 500,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a stored price (zero allowed for giveaways).
pub fn validate_price(field: &str, price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates an amount that must be strictly positive (loans, repayments,
/// payments).
pub fn validate_positive_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a rate in basis points (0% to 100%).
pub fn validate_bps(field: &str, bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates cart size (number of distinct lines) before adding one more.
pub fn validate_cart_size(current_lines: usize) -> ValidationResult<()> {
    if current_lines >= MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "cart lines".to_string(),
            min: 0,
            max: MAX_CART_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
