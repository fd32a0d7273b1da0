//! AMF0 encode/decode, sufficient for the command set RTMP publish/play
//! actually exercises: `connect`, `createStream`, `FCPublish`, `publish`,
//! `play`, `deleteStream` and their `_result`/`_error`/`onStatus` replies.
//! Extended (object/array/typed-object) encoding used by richer command
//! objects than these need is out of scope.

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};

use proto_types::{CoreError, CoreResult};

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const OBJECT_END: [u8; 3] = [0x00, 0x00, 0x09];

#[derive(Debug, Clone, PartialEq)]
pub enum Amf0Value {
    Number(f64),
    Boolean(bool),
    String(String),
    Object(BTreeMap<String, Amf0Value>),
    Null,
    Undefined,
}

impl Amf0Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Amf0Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Amf0Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Amf0Value>> {
        match self {
            Amf0Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Amf0Value::Number(n) => {
                buf.put_u8(MARKER_NUMBER);
                buf.put_f64(*n);
            }
            Amf0Value::Boolean(b) => {
                buf.put_u8(MARKER_BOOLEAN);
                buf.put_u8(if *b { 1 } else { 0 });
            }
            Amf0Value::String(s) => {
                buf.put_u8(MARKER_STRING);
                put_short_string(buf, s);
            }
            Amf0Value::Object(map) => {
                buf.put_u8(MARKER_OBJECT);
                for (k, v) in map {
                    put_short_string(buf, k);
                    v.encode(buf);
                }
                buf.extend_from_slice(&OBJECT_END);
            }
            Amf0Value::Null => buf.put_u8(MARKER_NULL),
            Amf0Value::Undefined => buf.put_u8(MARKER_UNDEFINED),
        }
    }
}

fn put_short_string(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.extend_from_slice(s.as_bytes());
}

/// Decode every value in `data` in sequence (a command message is a flat
/// list of AMF0 values: name, transaction id, command object, ...args).
pub fn decode_all(data: &[u8]) -> CoreResult<Vec<Amf0Value>> {
    let mut values = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let (value, consumed) = decode_one(&data[offset..])?;
        values.push(value);
        offset += consumed;
    }
    Ok(values)
}

fn decode_one(data: &[u8]) -> CoreResult<(Amf0Value, usize)> {
    let marker = *data.first().ok_or_else(|| amf_err("truncated value"))?;
    match marker {
        MARKER_NUMBER => {
            let bytes: [u8; 8] = data.get(1..9).ok_or_else(|| amf_err("truncated number"))?.try_into().unwrap();
            Ok((Amf0Value::Number(f64::from_be_bytes(bytes)), 9))
        }
        MARKER_BOOLEAN => {
            let b = *data.get(1).ok_or_else(|| amf_err("truncated boolean"))?;
            Ok((Amf0Value::Boolean(b != 0), 2))
        }
        MARKER_STRING => {
            let (s, len) = read_short_string(&data[1..])?;
            Ok((Amf0Value::String(s), 1 + len))
        }
        MARKER_OBJECT => decode_object(&data[1..], false).map(|(m, n)| (Amf0Value::Object(m), 1 + n)),
        MARKER_ECMA_ARRAY => {
            let count_bytes: [u8; 4] = data.get(1..5).ok_or_else(|| amf_err("truncated ecma array"))?.try_into().unwrap();
            let _count = u32::from_be_bytes(count_bytes);
            decode_object(&data[5..], false).map(|(m, n)| (Amf0Value::Object(m), 5 + n))
        }
        MARKER_NULL => Ok((Amf0Value::Null, 1)),
        MARKER_UNDEFINED => Ok((Amf0Value::Undefined, 1)),
        other => Err(amf_err(&format!("unsupported AMF0 marker 0x{other:02x}"))),
    }
}

fn decode_object(data: &[u8], _top_level: bool) -> CoreResult<(BTreeMap<String, Amf0Value>, usize)> {
    let mut map = BTreeMap::new();
    let mut offset = 0;
    loop {
        if data[offset..].starts_with(&[0x00, 0x00, 0x09]) {
            offset += 3;
            break;
        }
        let (key, key_len) = read_short_string(&data[offset..])?;
        offset += key_len;
        let (value, value_len) = decode_one(&data[offset..])?;
        offset += value_len;
        map.insert(key, value);
    }
    Ok((map, offset))
}

fn read_short_string(data: &[u8]) -> CoreResult<(String, usize)> {
    let len_bytes: [u8; 2] = data.get(0..2).ok_or_else(|| amf_err("truncated string length"))?.try_into().unwrap();
    let len = u16::from_be_bytes(len_bytes) as usize;
    let bytes = data.get(2..2 + len).ok_or_else(|| amf_err("truncated string body"))?;
    let s = String::from_utf8_lossy(bytes).into_owned();
    Ok((s, 2 + len))
}

fn amf_err(msg: &str) -> CoreError {
    CoreError::Protocol(format!("amf0: {msg}"))
}

/// A parsed RTMP command: name, transaction id, command object, and any
/// trailing arguments (e.g. `publish`'s stream name and publish type).
#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub transaction_id: f64,
    pub command_object: Option<Amf0Value>,
    pub args: Vec<Amf0Value>,
}

pub fn parse_command(payload: &[u8]) -> CoreResult<Command> {
    let mut values = decode_all(payload)?.into_iter();
    let name = values
        .next()
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| amf_err("command missing name"))?;
    let transaction_id = values.next().and_then(|v| v.as_f64()).unwrap_or(0.0);
    let command_object = values.next();
    let args: Vec<Amf0Value> = values.collect();
    Ok(Command {
        name,
        transaction_id,
        command_object,
        args,
    })
}

pub fn encode_values(values: &[Amf0Value]) -> Bytes {
    let mut buf = BytesMut::new();
    for v in values {
        v.encode(&mut buf);
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_connect_command() {
        let mut object = BTreeMap::new();
        object.insert("app".to_string(), Amf0Value::String("live".to_string()));
        object.insert("tcUrl".to_string(), Amf0Value::String("rtmp://host/live".to_string()));

        let values = vec![
            Amf0Value::String("connect".to_string()),
            Amf0Value::Number(1.0),
            Amf0Value::Object(object),
        ];
        let encoded = encode_values(&values);
        let command = parse_command(&encoded).unwrap();

        assert_eq!(command.name, "connect");
        assert_eq!(command.transaction_id, 1.0);
        let app = command.command_object.unwrap();
        assert_eq!(app.as_object().unwrap().get("app").unwrap().as_str(), Some("live"));
    }

    #[test]
    fn parses_publish_command_with_stream_name_and_type() {
        let values = vec![
            Amf0Value::String("publish".to_string()),
            Amf0Value::Number(3.0),
            Amf0Value::Null,
            Amf0Value::String("mystream".to_string()),
            Amf0Value::String("live".to_string()),
        ];
        let encoded = encode_values(&values);
        let command = parse_command(&encoded).unwrap();
        assert_eq!(command.name, "publish");
        assert_eq!(command.args[0].as_str(), Some("mystream"));
        assert_eq!(command.args[1].as_str(), Some("live"));
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = [MARKER_STRING, 0x00, 0x05, b'h', b'i'];
        assert!(decode_all(&bytes).is_err());
    }
}
