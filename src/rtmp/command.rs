// RTMP command (connect/createStream/publish/play/... AMF0 command messages)

use std::sync::LazyLock;

use indexmap::IndexMap;

use crate::amf::{AMFDecodingCursor, AMF0Value};
use crate::error::Result;

/// RTMP command
pub struct RtmpCommand {
    /// Command name
    pub cmd: String,

    /// Named arguments, in the positional order the command's field list defines
    pub arguments: IndexMap<String, AMF0Value>,
}

static RTMP_COMMAND_CODES: LazyLock<IndexMap<&'static str, Vec<&'static str>>> =
    LazyLock::new(|| {
        let mut m = IndexMap::new();

        m.insert("_result", vec!["transId", "cmdObj", "info"]);
        m.insert("_error", vec!["transId", "cmdObj", "info", "streamId"]);
        m.insert("onStatus", vec!["transId", "cmdObj", "info"]);
        m.insert("releaseStream", vec!["transId", "cmdObj", "streamName"]);
        m.insert("getStreamLength", vec!["transId", "cmdObj", "streamId"]);
        m.insert("getMovLen", vec!["transId", "cmdObj", "streamId"]);
        m.insert("FCPublish", vec!["transId", "cmdObj", "streamName"]);
        m.insert("FCUnpublish", vec!["transId", "cmdObj", "streamName"]);
        m.insert("FCSubscribe", vec!["transId", "cmdObj", "streamName"]);
        m.insert("onFCPublish", vec!["transId", "cmdObj", "info"]);
        m.insert("connect", vec!["transId", "cmdObj", "args"]);
        m.insert("call", vec!["transId", "cmdObj", "args"]);
        m.insert("createStream", vec!["transId", "cmdObj"]);
        m.insert("close", vec!["transId", "cmdObj"]);
        m.insert(
            "play",
            vec!["transId", "cmdObj", "streamName", "start", "duration", "reset"],
        );
        m.insert("play2", vec!["transId", "cmdObj", "params"]);
        m.insert("deleteStream", vec!["transId", "cmdObj", "streamId"]);
        m.insert("closeStream", vec!["transId", "cmdObj"]);
        m.insert("receiveAudio", vec!["transId", "cmdObj", "bool"]);
        m.insert("receiveVideo", vec!["transId", "cmdObj", "bool"]);
        m.insert("publish", vec!["transId", "cmdObj", "streamName", "type"]);
        m.insert("seek", vec!["transId", "cmdObj", "ms"]);
        m.insert("pause", vec!["transId", "cmdObj", "pause", "ms"]);

        m
    });

impl RtmpCommand {
    /// Creates an empty command
    pub fn new(cmd: String) -> RtmpCommand {
        RtmpCommand {
            cmd,
            arguments: IndexMap::new(),
        }
    }

    pub fn set_argument(&mut self, arg_name: String, value: AMF0Value) {
        self.arguments.insert(arg_name, value);
    }

    pub fn get_argument(&self, arg_name: &str) -> Option<&AMF0Value> {
        self.arguments.get(arg_name)
    }

    /// Gets string representation of the command, for debug logging
    pub fn to_debug_string(&self) -> String {
        let mut s = format!("{} {}\n", self.cmd, "{");

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

    /// Encodes the command name followed by its known positional arguments
    pub fn encode(&self) -> Vec<u8> {
        let name = AMF0Value::String {
            value: self.cmd.clone(),
        };

        let mut buf = name.encode();

        if let Some(arg_list) = RTMP_COMMAND_CODES.get(self.cmd.as_str()) {
            for arg_name in arg_list {
                match self.arguments.get(*arg_name) {
                    Some(val) => buf.extend(val.encode()),
                    None => buf.extend(AMF0Value::Undefined.encode()),
                }
            }
        }

        buf
    }

    /// Decodes a command from an AMF0 command-channel message payload
    pub fn decode(data: &[u8]) -> Result<RtmpCommand> {
        let mut cursor = AMFDecodingCursor::new(data);

        let cmd_amf = AMF0Value::read(&mut cursor, data)?;
        let cmd = cmd_amf.get_string().to_string();

        let mut c = RtmpCommand::new(cmd.clone());

        if let Some(arg_list) = RTMP_COMMAND_CODES.get(cmd.as_str()) {
            let mut i = 0;

            while i < arg_list.len() && !cursor.ended() {
                let val = AMF0Value::read(&mut cursor, data)?;
                c.set_argument(arg_list[i].to_string(), val);
                i += 1;
            }
        }

        Ok(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_round_trip() {
        let mut cmd = RtmpCommand::new("connect".to_string());
        cmd.set_argument("transId".to_string(), AMF0Value::Number { value: 1.0 });
        cmd.set_argument(
            "cmdObj".to_string(),
            AMF0Value::Object {
                properties: IndexMap::new(),
            },
        );

        let encoded = cmd.encode();
        let decoded = RtmpCommand::decode(&encoded).unwrap();

        assert_eq!(decoded.cmd, "connect");
        assert_eq!(decoded.get_argument("transId").unwrap().get_integer(), 1);
    }

    #[test]
    fn test_unknown_command_decodes_name_only() {
        let cmd = RtmpCommand::new("someCustomCmd".to_string());
        let encoded = cmd.encode();
        let decoded = RtmpCommand::decode(&encoded).unwrap();
        assert_eq!(decoded.cmd, "someCustomCmd");
        assert!(decoded.arguments.is_empty());
    }
}
