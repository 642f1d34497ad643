use crate::error::{ProtocolError, ProtocolResult};

/// The hardened-key bit flag defined by BIP-32 (2^31).
pub const HARDENED: u32 = 0x8000_0000;

/// The applet refuses paths deeper than this.
const MAX_PATH_DEPTH: usize = 10;

/// Parses a BIP44 derivation path string into child indices.
///
/// The path may begin with `m/`. Each component is a decimal integer,
/// optionally followed by `'`, `h` or `H` to mark it hardened.
///
/// | Input                 | Parsed indices                               |
/// |-----------------------|----------------------------------------------|
/// | `"m/44'/60'/0'/0/0"`  | `[0x8000002c, 0x8000003c, 0x80000000, 0, 0]` |
/// | `"44h/60h/1"`         | `[0x8000002c, 0x8000003c, 1]`                |
pub fn parse_path(path: &str) -> ProtocolResult<Vec<u32>> {
    let mut components = path.trim().split('/').peekable();
    components.next_if_eq(&"m");

    let indices = components
        .map(|component| {
            parse_component(component).ok_or_else(|| {
                ProtocolError::InvalidPath(format!("bad component '{component}' in '{path}'"))
            })
        })
        .collect::<ProtocolResult<Vec<u32>>>()?;

    if indices.len() > MAX_PATH_DEPTH {
        return Err(ProtocolError::InvalidPath(format!(
            "'{path}' has {} components, at most {MAX_PATH_DEPTH} allowed",
            indices.len()
        )));
    }
    Ok(indices)
}

/// The bare number must stay below 2^31 whether or not it is hardened.
fn parse_component(component: &str) -> Option<u32> {
    let (digits, hardened) = match component.strip_suffix(['\'', 'h', 'H']) {
        Some(digits) => (digits, true),
        None => (component, false),
    };
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let index = digits.parse::<u32>().ok().filter(|index| *index < HARDENED)?;
    Some(if hardened { index | HARDENED } else { index })
}

/// Encodes a path as `count(1) | index(4, BE)...`, the layout every
/// path-carrying command starts with.
pub fn encode_path(path: &str) -> ProtocolResult<Vec<u8>> {
    let indices = parse_path(path)?;
    let mut out = Vec::with_capacity(1 + indices.len() * 4);
    out.push(indices.len() as u8);
    for index in indices {
        out.extend_from_slice(&index.to_be_bytes());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_default_ethereum_path() {
        let encoded = encode_path("m/44'/60'/0'/0/0").unwrap();
        assert_eq!(
            encoded,
            vec![
                5, 0x80, 0x00, 0x00, 0x2c, 0x80, 0x00, 0x00, 0x3c, 0x80, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            ]
        );
    }

    #[test]
    fn supports_h_suffix_and_path_without_m_prefix() {
        let path = parse_path("44h/1/2H").unwrap();
        assert_eq!(path, vec![44 | HARDENED, 1, 2 | HARDENED]);
    }

    #[test]
    fn rejects_malformed_segments() {
        assert!(parse_path("").is_err());
        assert!(parse_path("m/44'//0").is_err());
        assert!(parse_path("m/44'/x/0").is_err());
        assert!(parse_path("m/2147483648").is_err());
        assert!(parse_path("m/0/1/2/3/4/5/6/7/8/9/10").is_err());
        assert!(parse_path("m/+5").is_err());
        assert!(parse_path("m/'").is_err());
        assert!(parse_path("m/").is_err());
    }

    #[test]
    fn bare_master_is_empty() {
        assert_eq!(parse_path("m").unwrap(), Vec::<u32>::new());
        assert_eq!(parse_path(" m/7 ").unwrap(), vec![7]);
    }
}
