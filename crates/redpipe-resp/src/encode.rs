//! RESP2 encoding.

use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;

use crate::utils::ARRAY;
use crate::utils::BULK_STRING;
use crate::utils::CRLF;
use crate::utils::ERROR;
use crate::utils::INTEGER;
use crate::utils::SIMPLE_STRING;
use crate::value::Value;

/// Trait for encoding RESP2 values.
///
/// Encoding is a pure mapping with no suspension: every representable
/// value has exactly one wire form, and `parse(encode(v)) == v`.
pub trait Encode {
    fn encode_to(&self, buf: &mut BytesMut);

    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_to(&mut buf);
        buf.freeze()
    }
}

impl Encode for Value {
    fn encode_to(&self, buf: &mut BytesMut) {
        match self {
            Value::SimpleString(s) => encode_line(buf, SIMPLE_STRING, s),
            Value::Error(e) => encode_line(buf, ERROR, e),
            Value::Integer(i) => {
                buf.put_u8(INTEGER);
                buf.put_slice(i.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            Value::BulkString(s) => encode_bulk_string(buf, s),
            Value::Array(arr) => {
                encode_length(buf, ARRAY, arr.len() as i64);
                for value in arr {
                    value.encode_to(buf);
                }
            }
            Value::Nil => encode_length(buf, BULK_STRING, -1),
            Value::NilArray => encode_length(buf, ARRAY, -1),
        }
    }
}

#[inline]
fn encode_line(buf: &mut BytesMut, marker: u8, payload: &Bytes) {
    buf.put_u8(marker);
    buf.put_slice(payload);
    buf.put_slice(CRLF);
}

#[inline]
fn encode_length(buf: &mut BytesMut, marker: u8, length: i64) {
    buf.put_u8(marker);
    buf.put_slice(length.to_string().as_bytes());
    buf.put_slice(CRLF);
}

#[inline]
fn encode_bulk_string(buf: &mut BytesMut, s: &[u8]) {
    encode_length(buf, BULK_STRING, s.len() as i64);
    buf.put_slice(s);
    buf.put_slice(CRLF);
}

/// Encode a request as an array of bulk strings.
///
/// This is the only request shape the protocol accepts, and the only
/// sanctioned way to build one: `*<n>\r\n` followed by `n` bulk strings,
/// each argument binary-safe.
pub fn encode_command<I, A>(args: I) -> Bytes
where
    I: IntoIterator<Item = A>,
    A: AsRef<[u8]>,
{
    let args: Vec<A> = args.into_iter().collect();
    let mut buf = BytesMut::new();
    encode_length(&mut buf, ARRAY, args.len() as i64);
    for arg in &args {
        encode_bulk_string(&mut buf, arg.as_ref());
    }
    buf.freeze()
}
