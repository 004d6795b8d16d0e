use data_encoding::{BASE64, HEXLOWER_PERMISSIVE, HEXUPPER};

use crate::error::{Error, Result};

/// Hard cap on decoded binary size.
const MAX_BINARY_BYTES: usize = 10 * 1024 * 1024;

/// Upper-case hexadecimal rendering used for RAW and materialised BLOBs.
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    HEXUPPER.encode(bytes)
}

/// Parses binary input: an optional `0x`/`0X` prefix forces hex; without
/// a prefix, even-length all-hex input decodes as hex and anything else
/// decodes as base-64. Decoded payloads past the blob cap are rejected.
///
/// # Errors
///
/// Returns [`Error::TypeMismatch`] for undecodable or oversized input.
pub fn parse_binary(text: &str) -> Result<Vec<u8>> {
    let t = text.trim();
    if let Some(rest) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        check_size(rest.len() / 2, text)?;
        return HEXLOWER_PERMISSIVE
            .decode(rest.as_bytes())
            .map_err(|_| invalid(text));
    }
    if t.len() % 2 == 0 && !t.is_empty() && t.bytes().all(|b| b.is_ascii_hexdigit()) {
        check_size(t.len() / 2, text)?;
        return HEXLOWER_PERMISSIVE
            .decode(t.as_bytes())
            .map_err(|_| invalid(text));
    }
    check_size(t.len() / 4 * 3, text)?;
    BASE64.decode(t.as_bytes()).map_err(|_| invalid(text))
}

fn check_size(decoded: usize, text: &str) -> Result<()> {
    if decoded > MAX_BINARY_BYTES {
        return Err(Error::type_mismatch(format!(
            "binary value of {decoded} bytes exceeds the {MAX_BINARY_BYTES} byte limit: {}…",
            &text[..32.min(text.len())]
        )));
    }
    Ok(())
}

fn invalid(text: &str) -> Error {
    Error::type_mismatch(format!("Invalid binary value: {text}"))
}
