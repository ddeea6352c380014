// RTMP data (onMetaData and other AMF0 data-channel messages)

use std::sync::LazyLock;

use indexmap::IndexMap;

use crate::amf::{AMFDecodingCursor, AMF0Value};
use crate::error::Result;

/// RTMP data message
pub struct RtmpData {
    /// Data tag
    pub tag: String,

    /// Named arguments, in the positional order the tag's field list defines
    pub arguments: IndexMap<String, AMF0Value>,
}

static RTMP_DATA_CODES: LazyLock<IndexMap<&'static str, Vec<&'static str>>> = LazyLock::new(|| {
    let mut m = IndexMap::new();

    m.insert("@setDataFrame", vec!["method", "dataObj"]);
    m.insert("onFI", vec!["info"]);
    m.insert("onMetaData", vec!["dataObj"]);
    m.insert("|RtmpSampleAccess", vec!["bool1", "bool2"]);

    m
});

impl RtmpData {
    pub fn new(tag: String) -> RtmpData {
        RtmpData {
            tag,
            arguments: IndexMap::new(),
        }
    }

    pub fn set_argument(&mut self, arg_name: String, value: AMF0Value) {
        self.arguments.insert(arg_name, value);
    }

    pub fn get_argument(&self, arg_name: &str) -> Option<&AMF0Value> {
        self.arguments.get(arg_name)
    }

    pub fn to_debug_string(&self) -> String {
        let mut s = format!("{} {}\n", self.tag, "{");

        for (arg_name, arg_val) in &self.arguments {
            s.push_str(&format!(
                "    '{}' = {}\n",
                arg_name,
                arg_val.to_debug_string("    ")
            ));
        }

        s.push('}');

        s
    }

    pub fn encode(&self) -> Vec<u8> {
        let tag = AMF0Value::String {
            value: self.tag.clone(),
        };

        let mut buf = tag.encode();

        if let Some(arg_list) = RTMP_DATA_CODES.get(self.tag.as_str()) {
            for arg_name in arg_list {
                if let Some(val) = self.arguments.get(*arg_name) {
                    buf.extend(val.encode());
                }
            }
        }

        buf
    }

    pub fn decode(data: &[u8]) -> Result<RtmpData> {
        let mut cursor = AMFDecodingCursor::new(data);

        let tag_amf = AMF0Value::read(&mut cursor, data)?;
        let tag = tag_amf.get_string().to_string();

        let mut d = RtmpData::new(tag.clone());

        if let Some(arg_list) = RTMP_DATA_CODES.get(tag.as_str()) {
            let mut i = 0;

            while i < arg_list.len() && !cursor.ended() {
                let val = AMF0Value::read(&mut cursor, data)?;
                d.set_argument(arg_list[i].to_string(), val);
                i += 1;
            }
        }

        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_metadata_round_trip() {
        let mut data = RtmpData::new("onMetaData".to_string());
        data.set_argument(
            "dataObj".to_string(),
            AMF0Value::Object {
                properties: IndexMap::new(),
            },
        );

        let encoded = data.encode();
        let decoded = RtmpData::decode(&encoded).unwrap();

        assert_eq!(decoded.tag, "onMetaData");
        assert!(decoded.get_argument("dataObj").is_some());
    }
}
