use std::collections::BTreeMap;

use bytes::Bytes;

use super::error::BencodeError;
use super::value::Value;

const MAX_DEPTH: usize = 64;

/// Decodes a single bencode value from `data`.
///
/// The input must contain exactly one complete value; trailing bytes are an
/// error. Nesting deeper than 64 levels is rejected to bound recursion.
///
/// # Examples
///
/// ```
/// use remora::bencode::decode;
///
/// assert_eq!(decode(b"i42e").unwrap().as_integer(), Some(42));
/// assert_eq!(decode(b"4:spam").unwrap().as_str(), Some("spam"));
/// assert_eq!(decode(b"li1ei2ee").unwrap().as_list().unwrap().len(), 2);
/// ```
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let mut cursor = Cursor::new(data);
    let value = cursor.value(0)?;
    if !cursor.at_end() {
        return Err(BencodeError::TrailingData);
    }
    Ok(value)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos == self.data.len()
    }

    fn peek(&self) -> Result<u8, BencodeError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(BencodeError::UnexpectedEof)
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    /// Consumes bytes up to (not including) `delim`, returning the span.
    fn take_until(&mut self, delim: u8) -> Result<&'a [u8], BencodeError> {
        let start = self.pos;
        while self.peek()? != delim {
            self.bump();
        }
        Ok(&self.data[start..self.pos])
    }

    fn value(&mut self, depth: usize) -> Result<Value, BencodeError> {
        if depth > MAX_DEPTH {
            return Err(BencodeError::NestingTooDeep);
        }

        match self.peek()? {
            b'i' => self.integer(),
            b'l' => self.list(depth),
            b'd' => self.dict(depth),
            b'0'..=b'9' => self.byte_string(),
            c => Err(BencodeError::UnexpectedChar(c as char)),
        }
    }

    fn integer(&mut self) -> Result<Value, BencodeError> {
        self.bump(); // 'i'
        let digits = self.take_until(b'e')?;
        self.bump(); // 'e'

        let text = std::str::from_utf8(digits)
            .map_err(|_| BencodeError::InvalidInteger("not ascii".into()))?;

        if text.is_empty() || text == "-" {
            return Err(BencodeError::InvalidInteger("empty".into()));
        }
        // i-0e and leading zeros are forbidden by BEP-3.
        let magnitude = text.strip_prefix('-').unwrap_or(text);
        if magnitude.len() > 1 && magnitude.starts_with('0') {
            return Err(BencodeError::InvalidInteger("leading zeros".into()));
        }
        if text == "-0" {
            return Err(BencodeError::InvalidInteger("negative zero".into()));
        }

        let n: i64 = text
            .parse()
            .map_err(|_| BencodeError::InvalidInteger(text.into()))?;
        Ok(Value::Integer(n))
    }

    fn byte_string(&mut self) -> Result<Value, BencodeError> {
        Ok(Value::Bytes(self.raw_byte_string()?))
    }

    fn raw_byte_string(&mut self) -> Result<Bytes, BencodeError> {
        let digits = self.take_until(b':')?;
        self.bump(); // ':'

        let len: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(BencodeError::InvalidStringLength)?;

        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(BencodeError::UnexpectedEof)?;

        let bytes = Bytes::copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(bytes)
    }

    fn list(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.bump(); // 'l'
        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.value(depth + 1)?);
        }
        self.bump(); // 'e'
        Ok(Value::List(items))
    }

    fn dict(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.bump(); // 'd'
        let mut map = BTreeMap::new();
        while self.peek()? != b'e' {
            if !self.peek()?.is_ascii_digit() {
                return Err(BencodeError::UnexpectedChar(self.peek()? as char));
            }
            let key = self.raw_byte_string()?;
            let value = self.value(depth + 1)?;
            map.insert(key, value);
        }
        self.bump(); // 'e'
        Ok(Value::Dict(map))
    }
}
