//! Validated input types.
//!
//! Every value that reaches the store goes through one of these wrappers:
//! a wrapper can only be built through validation, so holding one is proof
//! that the input respects the registry constraints.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

use ammonia::is_html;
use chrono::{NaiveDate, NaiveDateTime};
use derive_more::derive::Display;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Serialize, Serializer};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use validator::ValidateNonControlCharacter;

use crate::utils::validation_constants::{
    DATETIME_LOCAL_FORMAT, DATE_FORMAT, MAX_NATIONAL_ID_LENGTH, MAX_PASSWORD_LENGTH,
    MAX_PRICE_DIGITS, MAX_TEXT_LENGTH,
};

// Regex for username
static USERNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]{2,19}$").expect("Failed to compile username regex")
});

static PRICE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]+)(?:[.,]([0-9]{1,2}))?$").expect("Failed to compile price regex")
});

/// Reason why a single input was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub struct InvalidInput(&'static str);

impl InvalidInput {
    pub fn reason(&self) -> &'static str {
        self.0
    }
}

/// Field-level validation errors, collected for a whole form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Error)]
#[error("Validation failed")]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Records an error for `field`. The first error of a field wins.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    /// Keeps the value on success, records the error under `field` otherwise.
    pub fn check<T>(&mut self, field: &'static str, result: Result<T, InvalidInput>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.add(field, error.reason());
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Wrapper type for a username thas has been validated
#[derive(Debug, Clone, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[serde(transparent)]
pub struct Username(String);

impl TryFrom<String> for Username {
    type Error = InvalidInput;

    fn try_from(username: String) -> Result<Self, Self::Error> {
        username_validation(&username)?;
        Ok(Self(username))
    }
}

impl TryFrom<&str> for Username {
    type Error = InvalidInput;

    fn try_from(username: &str) -> Result<Self, Self::Error> {
        username_validation(username.trim())?;
        Ok(Self(username.trim().to_owned()))
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl ToSql for Username {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for Username {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = String::column_result(value)?;
        Username::try_from(raw).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn username_validation(username: &str) -> Result<(), InvalidInput> {
    if USERNAME_REGEX.is_match(username) {
        Ok(())
    } else {
        Err(InvalidInput(
            "Username must start with a letter and have 3 to 20 letters, digits or underscores",
        ))
    }
}

/// Non-empty, normalized, single-line text without markup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RequiredText(String);

impl RequiredText {
    pub fn new(content: &str) -> Result<Self, InvalidInput> {
        // Checks run on the stored form: compatibility characters such as
        // fullwidth brackets become ASCII here
        let normalized: String = content.trim().nfkc().collect();
        let normalized = normalized.trim();

        if normalized.is_empty() {
            return Err(InvalidInput("This field is required"));
        }

        if normalized.chars().count() > MAX_TEXT_LENGTH {
            return Err(InvalidInput("This field is too long"));
        }

        if !normalized.validate_non_control_character() {
            return Err(InvalidInput("This field contains invalid characters"));
        }

        if is_html(normalized) {
            return Err(InvalidInput("This field cannot contain HTML"));
        }

        Ok(Self(normalized.to_owned()))
    }

    /// Blank input means "not provided".
    pub fn optional(content: &str) -> Result<Option<Self>, InvalidInput> {
        if content.trim().is_empty() {
            Ok(None)
        } else {
            Self::new(content).map(Some)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequiredText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequiredText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Wrapper type for a national identity document number that has been validated.
///
/// Separators are dropped and letters upper-cased, so `12.345.678` and
/// `12345678` are the same document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(transparent)]
pub struct NationalId(String);

impl TryFrom<&str> for NationalId {
    type Error = InvalidInput;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err(InvalidInput("This field is required"));
        }

        // Remove the separators
        let mut clean = String::with_capacity(value.len());
        for c in value.trim().chars() {
            match c {
                '.' | '-' | ' ' => continue,
                c if c.is_ascii_alphanumeric() => clean.push(c.to_ascii_uppercase()),
                _ => return Err(InvalidInput("National ID may only contain letters and digits")),
            }
        }

        if clean.is_empty() || clean.len() > MAX_NATIONAL_ID_LENGTH {
            return Err(InvalidInput("National ID must have 1 to 20 letters or digits"));
        }

        Ok(Self(clean))
    }
}

impl AsRef<str> for NationalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

const INVALID_PRICE: &str = "Price must be a number with at most two decimals";

/// A non-negative amount of money with two decimals, kept in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(i64);

impl Price {
    pub const ZERO: Price = Price(0);

    pub fn from_cents(cents: i64) -> Result<Self, InvalidInput> {
        if cents < 0 {
            Err(InvalidInput("Price cannot be negative"))
        } else {
            Ok(Self(cents))
        }
    }

    pub fn cents(self) -> i64 {
        self.0
    }
}

impl FromStr for Price {
    type Err = InvalidInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(InvalidInput("This field is required"));
        }
        if s.starts_with('-') {
            return Err(InvalidInput("Price cannot be negative"));
        }

        let captures = PRICE_REGEX
            .captures(s)
            .ok_or(InvalidInput(INVALID_PRICE))?;

        let units = &captures[1];
        if units.len() > MAX_PRICE_DIGITS {
            return Err(InvalidInput("Price is too large"));
        }
        let units: i64 = units
            .parse()
            .map_err(|_| InvalidInput("Price is too large"))?;

        let cents = match captures.get(2).map(|m| m.as_str()) {
            None => 0,
            Some(d) => {
                let cents: i64 = d.parse().map_err(|_| InvalidInput(INVALID_PRICE))?;
                if d.len() == 1 {
                    cents * 10
                } else {
                    cents
                }
            }
        };

        Price::from_cents(units * 100 + cents)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Add for Price {
    type Output = Price;

    fn add(self, rhs: Price) -> Price {
        Price(self.0 + rhs.0)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Price>>(iter: I) -> Price {
        iter.fold(Price::ZERO, Add::add)
    }
}

impl ToSql for Price {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for Price {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let cents = i64::column_result(value)?;
        Price::from_cents(cents).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Parses the value of an HTML `datetime-local` field.
pub fn parse_datetime_local(value: &str) -> Result<NaiveDateTime, InvalidInput> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InvalidInput("This field is required"));
    }
    NaiveDateTime::parse_from_str(value, DATETIME_LOCAL_FORMAT)
        .map_err(|_| InvalidInput("Date and time must look like 2024-05-01T09:30"))
}

pub fn parse_date(value: &str) -> Result<NaiveDate, InvalidInput> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| InvalidInput("Date must look like 2024-05-01"))
}

/// A select field: an explicit `none` (or nothing) yields `None`,
/// otherwise the value must be a positive identifier.
pub fn parse_selection(value: &str) -> Result<Option<i64>, InvalidInput> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    match value.parse::<i64>() {
        Ok(id) if id > 0 => Ok(Some(id)),
        _ => Err(InvalidInput("Not a valid choice")),
    }
}

/// A select field that must hold a choice.
pub fn parse_required_selection(value: &str) -> Result<i64, InvalidInput> {
    parse_selection(value)?.ok_or(InvalidInput("This field is required"))
}

/// HTML checkboxes are either absent or carry a value (`on` by default).
pub fn parse_checkbox(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => false,
        Some(v) => !matches!(v.to_ascii_lowercase().as_str(), "false" | "off" | "0" | "no"),
    }
}

pub fn password_validation(password: &str) -> Result<(), InvalidInput> {
    if password.is_empty() {
        return Err(InvalidInput("This field is required"));
    }
    if password.chars().count() > MAX_PASSWORD_LENGTH {
        return Err(InvalidInput("Password is too long"));
    }
    Ok(())
}
