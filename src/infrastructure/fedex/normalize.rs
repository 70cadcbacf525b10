//! Input normalisation applied before anything is sent to the carrier.

use crate::domain::shipment::{DimensionUnit, Package, Party, WeightUnit};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::sync::LazyLock;

pub const MAX_ADDRESS_LEN: usize = 35;
pub const MAX_DESCRIPTION_LEN: usize = 50;
pub const DEFAULT_DESCRIPTION: &str = "General Merchandise";

static ZIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("static regex"));
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"));

/// Carrier package maximums, in the package's own units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackageLimits {
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
    pub weight: Decimal,
}

impl PackageLimits {
    pub fn for_units(dimension: DimensionUnit, weight: WeightUnit) -> Self {
        let (length, side) = match dimension {
            DimensionUnit::In => (dec!(108), dec!(70)),
            DimensionUnit::Cm => (dec!(274), dec!(177)),
        };
        let weight = match weight {
            WeightUnit::Lb => dec!(150),
            WeightUnit::Kg => dec!(68),
        };
        Self {
            length,
            width: side,
            height: side,
            weight,
        }
    }
}

/// Package measurements as the carrier wants them: whole numbers within limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampedPackage {
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
    pub weight: Decimal,
}

fn clamp_measure(value: Decimal, max: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .max(Decimal::ONE)
        .min(max)
}

/// Rounds to whole units and clamps to the carrier maximums. Never rejects.
pub fn clamp_package(pkg: &Package) -> ClampedPackage {
    let limits = PackageLimits::for_units(pkg.dimension_unit, pkg.weight_unit);
    ClampedPackage {
        length: clamp_measure(pkg.length, limits.length),
        width: clamp_measure(pkg.width, limits.width),
        height: clamp_measure(pkg.height, limits.height),
        weight: clamp_measure(pkg.weight, limits.weight),
    }
}

/// Normalises a US phone number to exactly ten digits.
pub fn normalize_phone(phone: &str) -> String {
    let mut digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 11 && digits.starts_with('1') {
        digits.remove(0);
    }
    match digits.len() {
        10 => digits,
        n if n < 10 => format!("{digits:0<10}"),
        n => digits[n - 10..].to_string(),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(s: String, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s,
    }
}

pub fn format_address(address: &str) -> String {
    let collapsed = collapse_whitespace(address);
    if collapsed.is_empty() {
        return "N/A".to_string();
    }
    truncate(collapsed, MAX_ADDRESS_LEN)
}

pub fn format_description(description: &str) -> String {
    let collapsed = collapse_whitespace(description);
    if collapsed.is_empty() {
        return DEFAULT_DESCRIPTION.to_string();
    }
    truncate(collapsed, MAX_DESCRIPTION_LEN)
}

pub fn is_valid_zip(zip: &str) -> bool {
    ZIP_RE.is_match(zip.trim())
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// Collects every missing or malformed field needed to create a carrier shipment.
pub fn shipping_field_errors(sender: &Party, recipient: &Party, pkg: &Package) -> Vec<String> {
    let mut errors = Vec::new();
    let mut require = |value: &str, label: &str| {
        if value.trim().is_empty() {
            errors.push(format!("{label} is required"));
        }
    };
    require(&sender.name, "Sender name");
    require(&sender.phone, "Sender phone");
    require(&sender.email, "Sender email");
    require(&sender.address, "Sender address");
    require(&sender.city, "Sender city");
    require(&sender.state, "Sender state");
    require(&sender.zip, "Sender ZIP code");
    require(&recipient.name, "Recipient name");
    require(&recipient.phone, "Recipient phone");
    require(&recipient.address, "Recipient address");
    require(&recipient.city, "Recipient city");
    require(&recipient.state, "Recipient state");
    require(&recipient.zip, "Recipient ZIP code");

    if pkg.length <= Decimal::ZERO || pkg.width <= Decimal::ZERO || pkg.height <= Decimal::ZERO {
        errors.push("Package dimensions must be greater than zero".to_string());
    }
    if pkg.weight <= Decimal::ZERO {
        errors.push("Package weight must be greater than zero".to_string());
    }
    if !sender.zip.trim().is_empty() && !is_valid_zip(&sender.zip) {
        errors.push(format!("Sender ZIP code '{}' is invalid", sender.zip.trim()));
    }
    if !recipient.zip.trim().is_empty() && !is_valid_zip(&recipient.zip) {
        errors.push(format!("Recipient ZIP code '{}' is invalid", recipient.zip.trim()));
    }
    if !sender.email.trim().is_empty() && !is_valid_email(&sender.email) {
        errors.push("Sender email is invalid".to_string());
    }
    errors
}

/// Pickup date for a preferred ship date: past dates roll to the next business day.
pub fn pickup_date(preferred: NaiveDate, today: NaiveDate) -> NaiveDate {
    if preferred >= today {
        return preferred;
    }
    let mut date = today + Days::new(1);
    while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        date = date + Days::new(1);
    }
    date
}
