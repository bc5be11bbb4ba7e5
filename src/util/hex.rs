use crate::error::ProbeError;

pub fn encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Decodes a string of hex digit pairs, big-endian within each pair. Accepts
/// an optional leading "0x" and ignores interior whitespace.
pub fn decode(hex: &str) -> Result<Vec<u8>, ProbeError> {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    let cleaned: Vec<char> = hex.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.len() % 2 != 0 {
        return Err(ProbeError::Hex("hex string has an odd length".into()));
    }
    let mut bytes = Vec::with_capacity(cleaned.len() / 2);
    let mut idx = 0;
    while idx < cleaned.len() {
        let pair: String = cleaned[idx..idx + 2].iter().collect();
        let byte = u8::from_str_radix(&pair, 16)
            .map_err(|_| ProbeError::Hex(format!("invalid hex pair: {pair}")))?;
        bytes.push(byte);
        idx += 2;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_hex() {
        assert_eq!(encode(&[0xde, 0xad]), "dead");
    }

    #[test]
    fn parses_hex() {
        assert_eq!(decode("dead").unwrap(), vec![0xde, 0xad]);
    }

    #[test]
    fn strips_leading_0x() {
        assert_eq!(decode("0xffab").unwrap(), vec![0xff, 0xab]);
    }

    #[test]
    fn ignores_whitespace() {
        assert_eq!(decode("16 03 01").unwrap(), vec![0x16, 0x03, 0x01]);
    }

    #[test]
    fn rejects_odd_length() {
        assert!(decode("abc").is_err());
    }
}
