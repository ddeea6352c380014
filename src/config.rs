// Core configuration: the small set of tunables the protocol engine
// itself needs (chunk size bounds, ack window default, id length limit,
// IP allow-list) loaded from environment variables via the teacher's
// `get_env_*` helpers (server/config.rs's `RtmpServerConfiguration::
// load_from_env`). Config *file* parsing, CLI/daemon lifecycle and the
// rest of the outer server stack are out of scope for this crate.

use crate::error::{Error, Result};
use crate::log::Logger;
use crate::log_error;
use crate::rtmp::{DEFAULT_WINDOW_ACK_SIZE, RTMP_MAX_CHUNK_SIZE, RTMP_MIN_CHUNK_SIZE};
use crate::utils::{get_env_string, get_env_u32, IpRangeConfig, DEFAULT_MAX_ID_LENGTH};

#[derive(Clone)]
pub struct CoreConfig {
    /// Smallest chunk size this process will accept via `Set Chunk Size`
    pub chunk_size_min: usize,

    /// Largest chunk size this process will accept via `Set Chunk Size`
    pub chunk_size_max: usize,

    /// Window acknowledgement size advertised to peers by default
    pub window_ack_size: u32,

    /// Max length accepted for stream keys / ids
    pub id_max_length: usize,

    /// IPs allowed to connect; `*` (the default) allows everyone
    pub ip_whitelist: IpRangeConfig,
}

impl CoreConfig {
    pub fn load_from_env(logger: &Logger) -> Result<CoreConfig> {
        let chunk_size_min = get_env_u32("RTMP_CHUNK_SIZE_MIN", RTMP_MIN_CHUNK_SIZE as u32) as usize;
        let chunk_size_max = get_env_u32("RTMP_CHUNK_SIZE_MAX", RTMP_MAX_CHUNK_SIZE as u32) as usize;

        if chunk_size_min == 0 || chunk_size_min > chunk_size_max {
            log_error!(
                logger,
                format!("invalid chunk size bounds: min={chunk_size_min} max={chunk_size_max}")
            );
            return Err(Error::protocol("invalid RTMP_CHUNK_SIZE_MIN/RTMP_CHUNK_SIZE_MAX"));
        }

        let window_ack_size = get_env_u32("RTMP_WINDOW_ACK_SIZE", DEFAULT_WINDOW_ACK_SIZE);

        let id_max_length = get_env_u32("ID_MAX_LENGTH", DEFAULT_MAX_ID_LENGTH as u32) as usize;

        let whitelist_str = get_env_string("IP_WHITELIST", "*");
        let ip_whitelist = IpRangeConfig::new_from_string(&whitelist_str).map_err(|bad_range| {
            log_error!(logger, format!("invalid entry in IP_WHITELIST: {bad_range}"));
            Error::protocol(format!("invalid IP_WHITELIST entry: {bad_range}"))
        })?;

        Ok(CoreConfig {
            chunk_size_min,
            chunk_size_max,
            window_ack_size,
            id_max_length,
            ip_whitelist,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_env_defaults() {
        // Clear any leftover values from a previous test run in the same process.
        for var in [
            "RTMP_CHUNK_SIZE_MIN",
            "RTMP_CHUNK_SIZE_MAX",
            "RTMP_WINDOW_ACK_SIZE",
            "ID_MAX_LENGTH",
            "IP_WHITELIST",
        ] {
            std::env::remove_var(var);
        }

        let logger = Logger::new_disabled();
        let config = CoreConfig::load_from_env(&logger).unwrap();

        assert_eq!(config.chunk_size_min, RTMP_MIN_CHUNK_SIZE);
        assert_eq!(config.chunk_size_max, RTMP_MAX_CHUNK_SIZE);
        assert_eq!(config.window_ack_size, DEFAULT_WINDOW_ACK_SIZE);
        assert_eq!(config.id_max_length, DEFAULT_MAX_ID_LENGTH);
    }
}
