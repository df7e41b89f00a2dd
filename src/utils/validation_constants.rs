//! Constants used throughout the validation system

/// Maximum length for short-form text (names, specialties, addresses)
pub const MAX_TEXT_LENGTH: usize = 250;
/// Maximum length of a normalized national id
pub const MAX_NATIONAL_ID_LENGTH: usize = 20;
/// Maximum length of a submitted password
pub const MAX_PASSWORD_LENGTH: usize = 128;
/// Maximum number of digits before the decimal point of a price
pub const MAX_PRICE_DIGITS: usize = 12;

/// Format of an HTML `datetime-local` input
pub const DATETIME_LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M";
/// Format of an HTML `date` input
pub const DATE_FORMAT: &str = "%Y-%m-%d";
