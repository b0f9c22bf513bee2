//! Normalization of remote menu records.
//!
//! The remote document is loosely typed: any field may be missing, `price`
//! may be a number or a string. Everything is coerced here, once, into a
//! [`NewMenuItem`] so nothing downstream ever sees a partial record.

use crate::error::{SyncError, SyncResult};
use littlelemon_storage::NewMenuItem;
use serde_json::Value;
use tracing::debug;

/// Top-level field that holds the item list.
pub const MENU_FIELD: &str = "menu";

/// Parses a raw response body into normalized items.
pub fn parse_menu_document(body: &[u8]) -> SyncResult<Vec<NewMenuItem>> {
    let doc: Value = serde_json::from_slice(body)?;
    normalize_menu(&doc)
}

/// Extracts and normalizes the `menu` array of an already parsed document.
pub fn normalize_menu(doc: &Value) -> SyncResult<Vec<NewMenuItem>> {
    let records = doc
        .get(MENU_FIELD)
        .ok_or_else(|| SyncError::Format(format!("missing `{MENU_FIELD}` field")))?
        .as_array()
        .ok_or_else(|| SyncError::Format(format!("`{MENU_FIELD}` is not an array")))?;

    Ok(records.iter().map(normalize_item).collect())
}

/// Normalizes a single record. Never fails: anything unusable becomes an
/// empty string or a zero price.
pub fn normalize_item(raw: &Value) -> NewMenuItem {
    NewMenuItem {
        name: text_field(raw, "name"),
        description: text_field(raw, "description"),
        price: parse_price(raw.get("price")),
        image: text_field(raw, "image"),
        category: text_field(raw, "category"),
    }
}

fn text_field(raw: &Value, key: &str) -> String {
    match raw.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Coerces a price to a finite number; anything unparsable is `0.0`.
///
/// Strings are read like a leading-number parse, so `"12.50 USD"` is 12.5
/// and `"abc"` is 0.
pub fn parse_price(raw: Option<&Value>) -> f64 {
    let parsed = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_leading_f64(s),
        _ => None,
    };
    match parsed {
        Some(price) if price.is_finite() => price,
        _ => {
            debug!("unparsable price {raw:?}, using 0");
            0.0
        }
    }
}

fn parse_leading_f64(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let is_digit = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_digit);

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }

    let int_start = end;
    while is_digit(end) {
        end += 1;
    }
    let mut mantissa_digits = end - int_start;

    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while is_digit(frac_end) {
            frac_end += 1;
        }
        mantissa_digits += frac_end - frac_start;
        if mantissa_digits > 0 {
            end = frac_end;
        }
    }

    if mantissa_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while is_digit(exp_end) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s.get(..end)?.parse().ok()
}
