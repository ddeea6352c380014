// AMF0 value (spec.md S3)

use byteorder::{BigEndian, ByteOrder};
use indexmap::IndexMap;

use crate::error::{Error, Result};

use super::decode::AMFDecodingCursor;
use super::AMF3Value;

const AMF0_TYPE_NUMBER: u8 = 0x00;
const AMF0_TYPE_BOOL: u8 = 0x01;
const AMF0_TYPE_STRING: u8 = 0x02;
const AMF0_TYPE_OBJECT: u8 = 0x03;
const AMF0_TYPE_NULL: u8 = 0x05;
const AMF0_TYPE_UNDEFINED: u8 = 0x06;
const AMF0_TYPE_REF: u8 = 0x07;
const AMF0_TYPE_ARRAY: u8 = 0x08;
const AMF0_TYPE_STRICT_ARRAY: u8 = 0x0A;
const AMF0_TYPE_DATE: u8 = 0x0B;
const AMF0_TYPE_LONG_STRING: u8 = 0x0C;
const AMF0_TYPE_XML_DOC: u8 = 0x0F;
const AMF0_TYPE_TYPED_OBJ: u8 = 0x10;
const AMF0_TYPE_SWITCH_AMF3: u8 = 0x11;

const AMF0_OBJECT_TERM_CODE: u8 = 0x09;

/// Ordered property map backing Object/Array/TypedObject. Plain `HashMap`
/// loses insertion order, which `onMetaData` consumers key their display
/// on; `IndexMap` keeps encode output reproducible and decode output
/// order-preserving so a re-encode of a decoded value is byte-identical
/// modulo key sort (AMF0 objects are otherwise unordered on the wire).
pub type AMF0Object = IndexMap<String, AMF0Value>;

/// AMF0 compatible value
#[derive(Debug, Clone, PartialEq)]
pub enum AMF0Value {
    Number {
        value: f64,
    },
    Bool {
        value: bool,
    },
    String {
        value: String,
    },
    Object {
        properties: AMF0Object,
    },
    Null,
    Undefined,
    Ref {
        addr: i64,
    },
    Array {
        items: AMF0Object,
    },
    StrictArray {
        items: Vec<AMF0Value>,
    },
    Date {
        timestamp: f64,
    },
    LongString {
        value: String,
    },
    XmlDocument {
        content: String,
    },
    TypedObject {
        type_name: String,
        properties: AMF0Object,
    },
    SwitchAmf3 {
        value: AMF3Value,
    },
}

impl AMF0Value {
    /// Obtains a string representation of the value, for debug logging
    pub fn to_debug_string(&self, tabs: &str) -> String {
        match self {
            AMF0Value::Number { value } => format!("{}", value),
            AMF0Value::Bool { value } => {
                if *value {
                    "TRUE".to_string()
                } else {
                    "FALSE".to_string()
                }
            }
            AMF0Value::String { value } => format!("'{}'", value),
            AMF0Value::Object { properties } => Self::debug_map("{", "}", properties, tabs),
            AMF0Value::Null => "NULL".to_string(),
            AMF0Value::Undefined => "UNDEFINED".to_string(),
            AMF0Value::Ref { addr } => format!("REF#{}", addr),
            AMF0Value::Array { items } => Self::debug_map("ARRAY [", "]", items, tabs),
            AMF0Value::StrictArray { items } => {
                let mut res = "STRICT_ARRAY [\n".to_string();
                for value in items {
                    res.push_str(tabs);
                    res.push_str("    ");
                    res.push_str(&value.to_debug_string(&format!("{}    ", tabs)));
                    res.push('\n');
                }
                res.push_str(tabs);
                res.push(']');
                res
            }
            AMF0Value::Date { timestamp } => format!("DATE({})", timestamp),
            AMF0Value::LongString { value } => format!("L'{}'", value),
            AMF0Value::XmlDocument { content } => format!("XML'{}'", content),
            AMF0Value::TypedObject {
                type_name,
                properties,
            } => Self::debug_map(&format!("{} {{", type_name), "}", properties, tabs),
            AMF0Value::SwitchAmf3 { value } => format!("AMF3({})", value.to_debug_string(tabs)),
        }
    }

    fn debug_map(open: &str, close: &str, map: &AMF0Object, tabs: &str) -> String {
        let mut res = format!("{}\n", open);
        for (key, value) in map {
            res.push_str(tabs);
            res.push_str("    '");
            res.push_str(key);
            res.push_str("' = ");
            res.push_str(&value.to_debug_string(&format!("{}    ", tabs)));
            res.push('\n');
        }
        res.push_str(tabs);
        res.push_str(close);
        res
    }

    // Value check functions:

    pub fn is_amf3(&self) -> bool {
        matches!(self, AMF0Value::SwitchAmf3 { .. })
    }

    pub fn is_undefined(&self) -> bool {
        match self {
            AMF0Value::Undefined => true,
            AMF0Value::SwitchAmf3 { value } => value.is_undefined(),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            AMF0Value::Null => true,
            AMF0Value::SwitchAmf3 { value } => value.is_null(),
            _ => false,
        }
    }

    pub fn get_bool(&self) -> bool {
        match self {
            AMF0Value::Bool { value } => *value,
            AMF0Value::Number { value } => *value != 0.0,
            AMF0Value::SwitchAmf3 { value } => value.get_bool(),
            _ => false,
        }
    }

    pub fn get_integer(&self) -> i64 {
        match self {
            AMF0Value::Number { value } => *value as i64,
            AMF0Value::Ref { addr } => *addr,
            AMF0Value::Date { timestamp } => *timestamp as i64,
            AMF0Value::SwitchAmf3 { value } => value.get_integer(),
            _ => 0,
        }
    }

    pub fn get_float(&self) -> f64 {
        match self {
            AMF0Value::Number { value } => *value,
            AMF0Value::Ref { addr } => *addr as f64,
            AMF0Value::Date { timestamp } => *timestamp,
            AMF0Value::SwitchAmf3 { value } => value.get_float(),
            _ => 0.0,
        }
    }

    pub fn get_string(&self) -> &str {
        match self {
            AMF0Value::String { value } => value.as_str(),
            AMF0Value::LongString { value } => value.as_str(),
            AMF0Value::XmlDocument { content } => content.as_str(),
            AMF0Value::SwitchAmf3 { value } => value.get_string(),
            _ => "",
        }
    }

    pub fn get_byte_array(&self) -> Option<&Vec<u8>> {
        match self {
            AMF0Value::SwitchAmf3 { value } => value.get_byte_array(),
            _ => None,
        }
    }

    pub fn get_object(&self) -> Option<&AMF0Object> {
        match self {
            AMF0Value::Object { properties } => Some(properties),
            AMF0Value::Array { items } => Some(items),
            AMF0Value::TypedObject { properties, .. } => Some(properties),
            _ => None,
        }
    }

    pub fn get_object_property(&self, property_name: &str) -> Option<&AMF0Value> {
        self.get_object().and_then(|o| o.get(property_name))
    }

    pub fn get_array(&self) -> Option<&Vec<AMF0Value>> {
        match self {
            AMF0Value::StrictArray { items } => Some(items),
            _ => None,
        }
    }

    pub fn get_array_element(&self, index: usize) -> Option<&AMF0Value> {
        self.get_array().and_then(|a| a.get(index))
    }

    // Encoding functions:

    /// Encodes value into bytes
    pub fn encode(&self) -> Vec<u8> {
        match self {
            AMF0Value::Number { value } => {
                let mut buf = vec![AMF0_TYPE_NUMBER];
                buf.extend(Self::encode_number(*value));
                buf
            }
            AMF0Value::Bool { value } => {
                let mut buf = vec![AMF0_TYPE_BOOL];
                buf.extend(Self::encode_bool(*value));
                buf
            }
            AMF0Value::String { value } => {
                let mut buf = vec![AMF0_TYPE_STRING];
                buf.extend(Self::encode_string(value));
                buf
            }
            AMF0Value::Object { properties } => {
                let mut buf = vec![AMF0_TYPE_OBJECT];
                buf.extend(Self::encode_object(properties));
                buf
            }
            AMF0Value::Null => vec![AMF0_TYPE_NULL],
            AMF0Value::Undefined => vec![AMF0_TYPE_UNDEFINED],
            AMF0Value::Ref { addr } => {
                let mut buf = vec![AMF0_TYPE_REF];
                buf.extend(Self::encode_ref(*addr as u16));
                buf
            }
            AMF0Value::Array { items } => {
                let mut buf = vec![AMF0_TYPE_ARRAY];
                buf.extend(Self::encode_array(items));
                buf
            }
            AMF0Value::StrictArray { items } => {
                let mut buf = vec![AMF0_TYPE_STRICT_ARRAY];
                buf.extend(Self::encode_strict_array(items));
                buf
            }
            AMF0Value::Date { timestamp } => {
                let mut buf = vec![AMF0_TYPE_DATE];
                buf.extend(Self::encode_date(*timestamp));
                buf
            }
            AMF0Value::LongString { value } => {
                let mut buf = vec![AMF0_TYPE_LONG_STRING];
                buf.extend(Self::encode_long_string(value));
                buf
            }
            AMF0Value::XmlDocument { content } => {
                let mut buf = vec![AMF0_TYPE_XML_DOC];
                buf.extend(Self::encode_long_string(content));
                buf
            }
            AMF0Value::TypedObject {
                type_name,
                properties,
            } => {
                let mut buf = vec![AMF0_TYPE_TYPED_OBJ];
                buf.extend(Self::encode_typed_object(type_name, properties));
                buf
            }
            AMF0Value::SwitchAmf3 { value } => {
                let mut buf = vec![AMF0_TYPE_SWITCH_AMF3];
                buf.extend(value.encode());
                buf
            }
        }
    }

    pub fn encode_number(num: f64) -> Vec<u8> {
        let mut buf = vec![0u8; 8];
        BigEndian::write_f64(&mut buf, num);
        buf
    }

    pub fn encode_bool(b: bool) -> Vec<u8> {
        vec![if b { 0x01 } else { 0x00 }]
    }

    pub fn encode_date(ts: f64) -> Vec<u8> {
        let mut buf = Self::encode_number(ts);
        buf.extend([0x00, 0x00]);
        buf
    }

    /// Encodes a UTF8-1 string with a 16-bit length prefix
    pub fn encode_string(s: &str) -> Vec<u8> {
        let mut buf = vec![0u8; 2];
        BigEndian::write_u16(&mut buf, s.len() as u16);
        buf.extend(s.as_bytes());
        buf
    }

    /// Encodes a UTF8-1 string with a 32-bit length prefix (LongString/XmlDocument)
    pub fn encode_long_string(s: &str) -> Vec<u8> {
        let mut buf = vec![0u8; 4];
        BigEndian::write_u32(&mut buf, s.len() as u32);
        buf.extend(s.as_bytes());
        buf
    }

    /// Encodes object properties followed by the empty-key object-end marker.
    /// Keys are emitted in insertion order, matching the `AMF0Object` map.
    pub fn encode_object(o: &AMF0Object) -> Vec<u8> {
        let mut buf = Vec::new();

        for (key, value) in o {
            buf.extend(Self::encode_string(key));
            buf.extend(value.encode());
        }

        buf.extend(Self::encode_string(""));
        buf.push(AMF0_OBJECT_TERM_CODE);

        buf
    }

    pub fn encode_array(arr: &AMF0Object) -> Vec<u8> {
        let mut buf = vec![0u8; 4];
        BigEndian::write_u32(&mut buf, arr.len() as u32);
        buf.extend(Self::encode_object(arr));
        buf
    }

    pub fn encode_strict_array(arr: &[AMF0Value]) -> Vec<u8> {
        let mut buf = vec![0u8; 4];
        BigEndian::write_u32(&mut buf, arr.len() as u32);

        for item in arr {
            buf.extend(item.encode());
        }

        buf
    }

    pub fn encode_ref(index: u16) -> Vec<u8> {
        let mut buf = vec![0u8; 2];
        BigEndian::write_u16(&mut buf, index);
        buf
    }

    pub fn encode_typed_object(type_name: &str, o: &AMF0Object) -> Vec<u8> {
        let mut buf = Self::encode_string(type_name);
        buf.extend(Self::encode_object(o));
        buf
    }

    // Decoding functions:

    /// Decodes one tagged value, advancing `cursor`.
    pub fn read(cursor: &mut AMFDecodingCursor, buffer: &[u8]) -> Result<AMF0Value> {
        let marker = cursor.read(buffer, 1)?[0];

        match marker {
            AMF0_TYPE_NUMBER => Ok(AMF0Value::Number {
                value: Self::read_number_body(cursor, buffer)?,
            }),
            AMF0_TYPE_BOOL => {
                let b = cursor.read(buffer, 1)?[0];
                Ok(AMF0Value::Bool { value: b != 0 })
            }
            AMF0_TYPE_STRING => Ok(AMF0Value::String {
                value: Self::read_utf8(cursor, buffer)?,
            }),
            AMF0_TYPE_OBJECT => Ok(AMF0Value::Object {
                properties: Self::read_object_body(cursor, buffer)?,
            }),
            AMF0_TYPE_NULL => Ok(AMF0Value::Null),
            AMF0_TYPE_UNDEFINED => Ok(AMF0Value::Undefined),
            AMF0_TYPE_REF => {
                let bytes = cursor.read(buffer, 2)?;
                Ok(AMF0Value::Ref {
                    addr: BigEndian::read_u16(bytes) as i64,
                })
            }
            AMF0_TYPE_ARRAY => {
                let len_bytes = cursor.read(buffer, 4)?;
                let _count = BigEndian::read_u32(len_bytes);
                Ok(AMF0Value::Array {
                    items: Self::read_object_body(cursor, buffer)?,
                })
            }
            AMF0_TYPE_STRICT_ARRAY => {
                let len_bytes = cursor.read(buffer, 4)?;
                let count = BigEndian::read_u32(len_bytes) as usize;
                let mut items = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    items.push(Self::read(cursor, buffer)?);
                }
                Ok(AMF0Value::StrictArray { items })
            }
            AMF0_TYPE_DATE => {
                let value = Self::read_number_body(cursor, buffer)?;
                cursor.skip(2)?; // timezone, unused
                Ok(AMF0Value::Date { timestamp: value })
            }
            AMF0_TYPE_LONG_STRING => Ok(AMF0Value::LongString {
                value: Self::read_utf8_long(cursor, buffer)?,
            }),
            AMF0_TYPE_XML_DOC => Ok(AMF0Value::XmlDocument {
                content: Self::read_utf8_long(cursor, buffer)?,
            }),
            AMF0_TYPE_TYPED_OBJ => {
                let type_name = Self::read_utf8(cursor, buffer)?;
                let properties = Self::read_object_body(cursor, buffer)?;
                Ok(AMF0Value::TypedObject {
                    type_name,
                    properties,
                })
            }
            AMF0_TYPE_SWITCH_AMF3 => Ok(AMF0Value::SwitchAmf3 {
                value: AMF3Value::read(cursor, buffer)?,
            }),
            other => Err(Error::protocol(format!("unknown amf0 marker {:#x}", other))),
        }
    }

    fn read_number_body(cursor: &mut AMFDecodingCursor, buffer: &[u8]) -> Result<f64> {
        let bytes = cursor.read(buffer, 8)?;
        Ok(BigEndian::read_f64(bytes))
    }

    /// Reads a 16-bit-length-prefixed string, without the leading type marker
    fn read_utf8(cursor: &mut AMFDecodingCursor, buffer: &[u8]) -> Result<String> {
        let len_bytes = cursor.read(buffer, 2)?;
        let len = BigEndian::read_u16(len_bytes) as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let bytes = cursor.read(buffer, len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Reads a 32-bit-length-prefixed string (LongString/XmlDocument)
    fn read_utf8_long(cursor: &mut AMFDecodingCursor, buffer: &[u8]) -> Result<String> {
        let len_bytes = cursor.read(buffer, 4)?;
        let len = BigEndian::read_u32(len_bytes) as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let bytes = cursor.read(buffer, len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Reads properties up to the object-end marker (empty key + 0x09).
    /// A key repeated on the wire overwrites the earlier value but keeps
    /// its original position, matching `IndexMap::insert`.
    fn read_object_body(cursor: &mut AMFDecodingCursor, buffer: &[u8]) -> Result<AMF0Object> {
        let mut properties = AMF0Object::new();

        loop {
            let key_len_bytes = cursor.read(buffer, 2)?;
            let key_len = BigEndian::read_u16(key_len_bytes) as usize;

            if key_len == 0 {
                let term = cursor.read(buffer, 1)?[0];
                if term != AMF0_OBJECT_TERM_CODE {
                    return Err(Error::protocol("amf0 object missing end marker"));
                }
                break;
            }

            let key_bytes = cursor.read(buffer, key_len)?;
            let key = String::from_utf8_lossy(key_bytes).into_owned();
            let value = Self::read(cursor, buffer)?;
            properties.insert(key, value);
        }

        Ok(properties)
    }
}
