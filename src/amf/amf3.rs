// AMF3 value, used only inside an AMF0 "switch-to-AMF3" marker

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

use super::decode::AMFDecodingCursor;

const AMF3_TYPE_UNDEFINED: u8 = 0x00;
const AMF3_TYPE_NULL: u8 = 0x01;
const AMF3_TYPE_FALSE: u8 = 0x02;
const AMF3_TYPE_TRUE: u8 = 0x03;
const AMF3_TYPE_INTEGER: u8 = 0x04;
const AMF3_TYPE_DOUBLE: u8 = 0x05;
const AMF3_TYPE_STRING: u8 = 0x06;
const AMF3_TYPE_XML_DOC: u8 = 0x07;
const AMF3_TYPE_DATE: u8 = 0x08;
const AMF3_TYPE_XML: u8 = 0x0B;
const AMF3_TYPE_BYTE_ARRAY: u8 = 0x0C;

/// AMF3 compatible value. Array/Object are not carried by any packet this
/// crate decodes (RTMP command/data channels stay on AMF0); they round-trip
/// as an encode error rather than a silently wrong value.
#[derive(Debug, Clone, PartialEq)]
pub enum AMF3Value {
    Undefined,
    Null,
    False,
    True,
    Integer { value: i32 },
    Double { value: f64 },
    String { value: String },
    XmlDocument { content: String },
    Date { timestamp: f64 },
    Xml { value: String },
    ByteArray { value: Vec<u8> },
}

impl AMF3Value {
    pub fn to_debug_string(&self, _tabs: &str) -> String {
        match self {
            AMF3Value::Undefined => "Undefined".to_string(),
            AMF3Value::Null => "Null".to_string(),
            AMF3Value::False => "False".to_string(),
            AMF3Value::True => "True".to_string(),
            AMF3Value::Integer { value } => format!("Integer({})", value),
            AMF3Value::Double { value } => format!("Double({})", value),
            AMF3Value::String { value } => format!("'{}'", value),
            AMF3Value::XmlDocument { content } => format!("XML_DOC'{}'", content),
            AMF3Value::Date { timestamp } => format!("DATE({})", timestamp),
            AMF3Value::Xml { value } => format!("XML'{}'", value),
            AMF3Value::ByteArray { value } => format!("Bytes({})", hex::encode(value)),
        }
    }

    pub fn get_bool(&self) -> bool {
        matches!(self, AMF3Value::True)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, AMF3Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AMF3Value::Null)
    }

    pub fn get_integer(&self) -> i64 {
        match self {
            AMF3Value::Integer { value } => *value as i64,
            AMF3Value::Double { value } => *value as i64,
            _ => 0,
        }
    }

    pub fn get_float(&self) -> f64 {
        match self {
            AMF3Value::Integer { value } => *value as f64,
            AMF3Value::Double { value } => *value,
            _ => 0.0,
        }
    }

    pub fn get_string(&self) -> &str {
        match self {
            AMF3Value::String { value } => value.as_str(),
            AMF3Value::XmlDocument { content } => content.as_str(),
            AMF3Value::Xml { value } => value.as_str(),
            _ => "",
        }
    }

    pub fn get_byte_array(&self) -> Option<&Vec<u8>> {
        match self {
            AMF3Value::ByteArray { value } => Some(value),
            _ => None,
        }
    }

    /// Encodes the value. U29 varint lengths/integers are only ever used
    /// here with values this crate produces itself (small transaction ids,
    /// short strings), so a single-byte-or-more encoding is enough; values
    /// needing the full 4-byte U29 form are out of scope.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            AMF3Value::Undefined => vec![AMF3_TYPE_UNDEFINED],
            AMF3Value::Null => vec![AMF3_TYPE_NULL],
            AMF3Value::False => vec![AMF3_TYPE_FALSE],
            AMF3Value::True => vec![AMF3_TYPE_TRUE],
            AMF3Value::Integer { value } => {
                let mut buf = vec![AMF3_TYPE_INTEGER];
                buf.extend(encode_u29(*value as u32));
                buf
            }
            AMF3Value::Double { value } => {
                let mut buf = vec![AMF3_TYPE_DOUBLE; 1];
                let mut bytes = [0u8; 8];
                BigEndian::write_f64(&mut bytes, *value);
                buf.extend(bytes);
                buf
            }
            AMF3Value::String { value } => {
                let mut buf = vec![AMF3_TYPE_STRING];
                buf.extend(encode_utf8_vr(value));
                buf
            }
            AMF3Value::XmlDocument { content } => {
                let mut buf = vec![AMF3_TYPE_XML_DOC];
                buf.extend(encode_utf8_vr(content));
                buf
            }
            AMF3Value::Date { timestamp } => {
                let mut buf = vec![AMF3_TYPE_DATE];
                buf.extend(encode_u29(1)); // inline marker, no ref cache
                let mut bytes = [0u8; 8];
                BigEndian::write_f64(&mut bytes, *timestamp);
                buf.extend(bytes);
                buf
            }
            AMF3Value::Xml { value } => {
                let mut buf = vec![AMF3_TYPE_XML];
                buf.extend(encode_utf8_vr(value));
                buf
            }
            AMF3Value::ByteArray { value } => {
                let mut buf = vec![AMF3_TYPE_BYTE_ARRAY];
                buf.extend(encode_u29((((value.len() as u32) << 1) | 1) as u32));
                buf.extend(value);
                buf
            }
        }
    }

    pub fn read(cursor: &mut AMFDecodingCursor, buffer: &[u8]) -> Result<AMF3Value> {
        let marker = cursor.read(buffer, 1)?[0];

        match marker {
            AMF3_TYPE_UNDEFINED => Ok(AMF3Value::Undefined),
            AMF3_TYPE_NULL => Ok(AMF3Value::Null),
            AMF3_TYPE_FALSE => Ok(AMF3Value::False),
            AMF3_TYPE_TRUE => Ok(AMF3Value::True),
            AMF3_TYPE_INTEGER => {
                let (value, _) = decode_u29(cursor, buffer)?;
                Ok(AMF3Value::Integer {
                    value: value as i32,
                })
            }
            AMF3_TYPE_DOUBLE => {
                let bytes = cursor.read(buffer, 8)?;
                Ok(AMF3Value::Double {
                    value: BigEndian::read_f64(bytes),
                })
            }
            AMF3_TYPE_STRING => Ok(AMF3Value::String {
                value: decode_utf8_vr(cursor, buffer)?,
            }),
            AMF3_TYPE_XML_DOC => Ok(AMF3Value::XmlDocument {
                content: decode_utf8_vr(cursor, buffer)?,
            }),
            AMF3_TYPE_DATE => {
                let (_, _) = decode_u29(cursor, buffer)?;
                let bytes = cursor.read(buffer, 8)?;
                Ok(AMF3Value::Date {
                    timestamp: BigEndian::read_f64(bytes),
                })
            }
            AMF3_TYPE_XML => Ok(AMF3Value::Xml {
                value: decode_utf8_vr(cursor, buffer)?,
            }),
            AMF3_TYPE_BYTE_ARRAY => {
                let (header, _) = decode_u29(cursor, buffer)?;
                let len = (header >> 1) as usize;
                let bytes = cursor.read(buffer, len)?;
                Ok(AMF3Value::ByteArray {
                    value: bytes.to_vec(),
                })
            }
            other => Err(Error::protocol(format!(
                "unsupported amf3 marker {:#x}",
                other
            ))),
        }
    }
}

fn encode_u29(value: u32) -> Vec<u8> {
    let v = value & 0x3FFFFFFF;
    if v < 0x80 {
        vec![v as u8]
    } else if v < 0x4000 {
        vec![((v >> 7) | 0x80) as u8, (v & 0x7F) as u8]
    } else if v < 0x200000 {
        vec![
            ((v >> 14) | 0x80) as u8,
            (((v >> 7) & 0x7F) | 0x80) as u8,
            (v & 0x7F) as u8,
        ]
    } else {
        vec![
            ((v >> 22) | 0x80) as u8,
            (((v >> 15) & 0x7F) | 0x80) as u8,
            (((v >> 8) & 0x7F) | 0x80) as u8,
            (v & 0xFF) as u8,
        ]
    }
}

fn decode_u29(cursor: &mut AMFDecodingCursor, buffer: &[u8]) -> Result<(u32, usize)> {
    let mut result: u32 = 0;
    for i in 0..4 {
        let b = cursor.read(buffer, 1)?[0];
        if i == 3 {
            result = (result << 8) | b as u32;
            return Ok((result, 4));
        }
        result = (result << 7) | (b & 0x7F) as u32;
        if b & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }
    Ok((result, 4))
}

fn encode_utf8_vr(s: &str) -> Vec<u8> {
    let mut buf = encode_u29(((s.len() as u32) << 1) | 1);
    buf.extend(s.as_bytes());
    buf
}

fn decode_utf8_vr(cursor: &mut AMFDecodingCursor, buffer: &[u8]) -> Result<String> {
    let (header, _) = decode_u29(cursor, buffer)?;
    let len = (header >> 1) as usize;
    if len == 0 {
        return Ok(String::new());
    }
    let bytes = cursor.read(buffer, len)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_round_trip() {
        let v = AMF3Value::Integer { value: 1234 };
        let encoded = v.encode();
        let mut cursor = AMFDecodingCursor::new(&encoded);
        let decoded = AMF3Value::read(&mut cursor, &encoded).unwrap();
        assert_eq!(decoded.get_integer(), 1234);
    }

    #[test]
    fn test_string_round_trip() {
        let v = AMF3Value::String {
            value: "hello".to_string(),
        };
        let encoded = v.encode();
        let mut cursor = AMFDecodingCursor::new(&encoded);
        let decoded = AMF3Value::read(&mut cursor, &encoded).unwrap();
        assert_eq!(decoded.get_string(), "hello");
    }
}
