//! Hex text <-> bytes, plus the printable rendering shown next to every value

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid hex `{input}`: {reason}")]
pub struct HexError {
    pub input: String,
    pub reason: String,
}

pub fn encode_hex(bytes: &[u8]) -> String {
    data_encoding::HEXLOWER.encode(bytes)
}

/// Accepts upper and lower case digits
pub fn decode_hex(input: &str) -> Result<Vec<u8>, HexError> {
    data_encoding::HEXLOWER_PERMISSIVE
        .decode(input.as_bytes())
        .map_err(|e| HexError {
            input: input.to_string(),
            reason: e.to_string(),
        })
}

/// Best-effort ASCII: printable bytes as-is, everything else as `.`
pub fn render_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_accepts_mixed_case() {
        assert_eq!(decode_hex("DeadBEEF").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(encode_hex(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
    }

    #[test]
    fn decode_rejects_odd_length_and_garbage() {
        assert!(decode_hex("abc").is_err());
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn ascii_rendering() {
        assert_eq!(render_ascii(b"OK\x00\x7f!"), "OK..!");
        assert_eq!(render_ascii(&[]), "");
    }
}
