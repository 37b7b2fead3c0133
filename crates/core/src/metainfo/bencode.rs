//! Bencode decoding and canonical encoding.
//!
//! Dictionaries decode into a `BTreeMap`, so re-encoding always emits keys
//! in sorted order regardless of the order they appeared on the wire. That
//! canonical form is what the info-hash digest is computed over.

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors that can occur while decoding bencode data.
#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("Unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    #[error("Invalid token {token:?} at offset {offset}")]
    InvalidToken { token: char, offset: usize },

    #[error("Invalid integer at offset {0}")]
    InvalidInteger(usize),

    #[error("Invalid string length at offset {0}")]
    InvalidLength(usize),

    #[error("Dictionary key is not a byte string at offset {0}")]
    NonStringKey(usize),

    #[error("Trailing data after value ({0} bytes)")]
    TrailingData(usize),
}

/// A decoded bencode value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Byte string as UTF-8, replacing invalid sequences.
    pub fn as_str_lossy(&self) -> Option<String> {
        self.as_bytes().map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Dictionary lookup by key. Returns `None` for non-dicts.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dict().and_then(|d| d.get(key))
    }
}

/// Decode a complete bencode value, rejecting trailing bytes.
pub fn decode(input: &[u8]) -> Result<Value, BencodeError> {
    let mut pos = 0;
    let value = decode_at(input, &mut pos)?;
    if pos != input.len() {
        return Err(BencodeError::TrailingData(input.len() - pos));
    }
    Ok(value)
}

fn decode_at(input: &[u8], pos: &mut usize) -> Result<Value, BencodeError> {
    match input.get(*pos) {
        None => Err(BencodeError::UnexpectedEof(*pos)),
        Some(b'i') => decode_int(input, pos),
        Some(b'l') => {
            *pos += 1;
            let mut items = Vec::new();
            while input.get(*pos) != Some(&b'e') {
                if *pos >= input.len() {
                    return Err(BencodeError::UnexpectedEof(*pos));
                }
                items.push(decode_at(input, pos)?);
            }
            *pos += 1;
            Ok(Value::List(items))
        }
        Some(b'd') => {
            *pos += 1;
            let mut map = BTreeMap::new();
            while input.get(*pos) != Some(&b'e') {
                if *pos >= input.len() {
                    return Err(BencodeError::UnexpectedEof(*pos));
                }
                let key_offset = *pos;
                let key = match decode_at(input, pos)? {
                    Value::Bytes(b) => b,
                    _ => return Err(BencodeError::NonStringKey(key_offset)),
                };
                let value = decode_at(input, pos)?;
                map.insert(key, value);
            }
            *pos += 1;
            Ok(Value::Dict(map))
        }
        Some(b'0'..=b'9') => decode_bytes(input, pos),
        Some(&other) => Err(BencodeError::InvalidToken {
            token: other as char,
            offset: *pos,
        }),
    }
}

fn decode_int(input: &[u8], pos: &mut usize) -> Result<Value, BencodeError> {
    let start = *pos;
    *pos += 1; // skip 'i'
    let end = input[*pos..]
        .iter()
        .position(|&b| b == b'e')
        .map(|i| *pos + i)
        .ok_or(BencodeError::UnexpectedEof(input.len()))?;
    let digits =
        std::str::from_utf8(&input[*pos..end]).map_err(|_| BencodeError::InvalidInteger(start))?;
    let value: i64 = digits.parse().map_err(|_| BencodeError::InvalidInteger(start))?;
    *pos = end + 1;
    Ok(Value::Int(value))
}

fn decode_bytes(input: &[u8], pos: &mut usize) -> Result<Value, BencodeError> {
    let start = *pos;
    let colon = input[*pos..]
        .iter()
        .position(|&b| b == b':')
        .map(|i| *pos + i)
        .ok_or(BencodeError::UnexpectedEof(input.len()))?;
    let len_str =
        std::str::from_utf8(&input[*pos..colon]).map_err(|_| BencodeError::InvalidLength(start))?;
    let len: usize = len_str.parse().map_err(|_| BencodeError::InvalidLength(start))?;
    let data_start = colon + 1;
    let data_end = data_start + len;
    if data_end > input.len() {
        return Err(BencodeError::UnexpectedEof(input.len()));
    }
    *pos = data_end;
    Ok(Value::Bytes(input[data_start..data_end].to_vec()))
}

/// Append the canonical encoding of `value` to `buf`.
pub fn encode(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Int(i) => {
            buf.push(b'i');
            let mut itoa_buf = itoa::Buffer::new();
            buf.extend_from_slice(itoa_buf.format(*i).as_bytes());
            buf.push(b'e');
        }
        Value::Bytes(bytes) => {
            let mut itoa_buf = itoa::Buffer::new();
            buf.extend_from_slice(itoa_buf.format(bytes.len()).as_bytes());
            buf.push(b':');
            buf.extend_from_slice(bytes);
        }
        Value::List(items) => {
            buf.push(b'l');
            for item in items {
                encode(item, buf);
            }
            buf.push(b'e');
        }
        Value::Dict(map) => {
            buf.push(b'd');
            for (key, val) in map {
                encode(&Value::Bytes(key.clone()), buf);
                encode(val, buf);
            }
            buf.push(b'e');
        }
    }
}

/// Encode a value into a fresh buffer.
pub fn to_bytes(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode(value, &mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_integer() {
        assert_eq!(decode(b"i42e").unwrap(), Value::Int(42));
        assert_eq!(decode(b"i-7e").unwrap(), Value::Int(-7));
        assert_eq!(decode(b"i0e").unwrap(), Value::Int(0));
    }

    #[test]
    fn test_decode_string() {
        assert_eq!(decode(b"4:spam").unwrap(), Value::Bytes(b"spam".to_vec()));
        assert_eq!(decode(b"0:").unwrap(), Value::Bytes(Vec::new()));
    }

    #[test]
    fn test_decode_list() {
        let value = decode(b"l4:spami7ee").unwrap();
        assert_eq!(
            value,
            Value::List(vec![Value::Bytes(b"spam".to_vec()), Value::Int(7)])
        );
    }

    #[test]
    fn test_decode_dict() {
        let value = decode(b"d3:bar4:spam3:fooi42ee").unwrap();
        let dict = value.as_dict().unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(value.get(b"foo").unwrap().as_int(), Some(42));
        assert_eq!(value.get(b"bar").unwrap().as_bytes(), Some(b"spam".as_ref()));
    }

    #[test]
    fn test_decode_rejects_trailing_data() {
        let result = decode(b"i42eXX");
        assert!(matches!(result, Err(BencodeError::TrailingData(2))));
    }

    #[test]
    fn test_decode_rejects_truncated_input() {
        assert!(decode(b"i42").is_err());
        assert!(decode(b"5:spam").is_err());
        assert!(decode(b"l4:spam").is_err());
        assert!(decode(b"d3:foo").is_err());
    }

    #[test]
    fn test_decode_rejects_non_string_key() {
        let result = decode(b"di1ei2ee");
        assert!(matches!(result, Err(BencodeError::NonStringKey(_))));
    }

    #[test]
    fn test_encode_is_canonical() {
        // Keys decoded from an unsorted dict come back out sorted.
        let value = decode(b"d3:zzzi1e3:aaai2ee").unwrap();
        assert_eq!(to_bytes(&value), b"d3:aaai2e3:zzzi1ee");
    }

    #[test]
    fn test_roundtrip_nested() {
        let input: &[u8] = b"d4:infod5:filesld6:lengthi100e4:pathl5:a.mkveee4:name4:show12:piece lengthi16384eee";
        let value = decode(input).unwrap();
        assert_eq!(to_bytes(&value), input);
    }

    #[test]
    fn test_encode_binary_bytes() {
        let value = Value::Bytes(vec![0x00, 0xff, 0x10]);
        assert_eq!(to_bytes(&value), b"3:\x00\xff\x10");
    }
}
