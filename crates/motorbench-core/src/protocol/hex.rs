//! Hex text helpers for raw command entry and traffic logs

use super::ProtocolError;

/// Render bytes as space separated uppercase hex, e.g. `10 02 21 00 00 33 10 03`
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse hex text into raw bytes
///
/// Tokens are separated by whitespace and may carry a `0x` prefix. A token
/// may hold several bytes (`1002` is two bytes) but must have an even number
/// of digits.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut result = Vec::new();

    for token in text.split_whitespace() {
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);

        if digits.is_empty() || digits.len() % 2 != 0 {
            return Err(ProtocolError::InvalidHex(format!(
                "token '{}' has an odd number of digits",
                token
            )));
        }

        let mut i = 0;
        while i < digits.len() {
            let pair = digits.get(i..i + 2).ok_or_else(|| {
                ProtocolError::InvalidHex(format!("token '{}' is not ASCII hex", token))
            })?;
            let byte = u8::from_str_radix(pair, 16).map_err(|_| {
                ProtocolError::InvalidHex(format!("'{}' in token '{}' is not hex", pair, token))
            })?;
            result.push(byte);
            i += 2;
        }
    }

    Ok(result)
}
