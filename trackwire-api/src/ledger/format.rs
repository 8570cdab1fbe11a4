//! Code format validation
//!
//! Pure checks for externally supplied code values, independent of
//! ledger-issued ones.

use once_cell::sync::Lazy;
use regex::Regex;
use trackwire_common::CodeKind;

static UPC_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{12}$").expect("valid UPC pattern"));

static ISRC_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2}-[A-Z0-9]{3}-\d{2}-\d{5}$").expect("valid ISRC pattern"));

/// Whether `value` is syntactically valid for `kind`
pub fn validate_format(kind: CodeKind, value: &str) -> bool {
    match kind {
        CodeKind::Upc => UPC_FORMAT.is_match(value),
        CodeKind::Isrc => ISRC_FORMAT.is_match(value),
    }
}
