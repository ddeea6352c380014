// RTMP URL parsing: `rtmp://host[:port]/app[/app2]/stream?query`, the
// legacy `...vhost...` host-override substitution, and the FMLE variant
// where `?query` is embedded right after the app segment instead of at
// the end (srs_protocol_utility.cpp's `srs_discovery_tc_url`).

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::utils::parse_query_string_simple;

use super::headers::HttpHeaders;

const DEFAULT_VHOST: &str = "__defaultVhost__";

#[derive(Debug, Clone)]
pub struct RtmpUrl {
    pub host: String,
    pub port: Option<u16>,
    pub vhost: String,
    pub app: String,
    pub app2: Option<String>,
    pub stream: String,
    pub query: HashMap<String, String>,
}

/// Pulls the query string out of a `path` that may carry it either at
/// the very end (`app/stream?k=v`, the common case) or right after the
/// app segment (`app?k=v/stream`, the FMLE case some encoders send).
/// Returns `(path_without_query, query_string)`.
fn split_embedded_query(path: &str) -> (String, String) {
    let Some(q_idx) = path.find('?') else {
        return (path.to_string(), String::new());
    };

    let before = &path[..q_idx];
    let after = &path[q_idx + 1..];

    match after.find('/') {
        Some(slash_idx) => {
            let query = after[..slash_idx].to_string();
            let rest = &after[slash_idx..];
            (format!("{before}{rest}"), query)
        }
        None => (before.to_string(), after.to_string()),
    }
}

pub fn parse_rtmp_url(raw: &str) -> Result<RtmpUrl> {
    let normalized = raw.replace("...vhost...", "?vhost=");

    let without_scheme = normalized
        .strip_prefix("rtmp://")
        .or_else(|| normalized.strip_prefix("rtmps://"))
        .unwrap_or(&normalized);

    let (authority, path) = match without_scheme.find('/') {
        Some(idx) => (&without_scheme[..idx], &without_scheme[idx + 1..]),
        None => return Err(Error::protocol("RTMP URL is missing an app/stream path")),
    };

    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => (
            h.to_string(),
            Some(
                p.parse::<u16>()
                    .map_err(|_| Error::protocol(format!("bad port in RTMP URL: {p:?}")))?,
            ),
        ),
        None => (authority.to_string(), None),
    };

    let (path_only, query_string) = split_embedded_query(path);
    let query = parse_query_string_simple(&query_string);

    let segments: Vec<&str> = path_only.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return Err(Error::protocol("RTMP URL needs at least an app and a stream segment"));
    }

    let app = segments[0].to_string();
    let stream = segments[segments.len() - 1].to_string();
    let app2 = if segments.len() > 2 {
        Some(segments[1..segments.len() - 1].join("/"))
    } else {
        None
    };

    let vhost = query
        .get("vhost")
        .or_else(|| query.get("domain"))
        .filter(|v| *v != DEFAULT_VHOST)
        .cloned()
        .unwrap_or_else(|| host.clone());

    Ok(RtmpUrl {
        host,
        port,
        vhost,
        app,
        app2,
        stream,
        query,
    })
}

/// Extracts the client's original IP from proxy headers:
/// `X-Forwarded-For` (first entry before any comma) takes priority over
/// `X-Real-IP` (with any trailing `:port` stripped).
pub fn original_client_ip(headers: &HttpHeaders) -> Option<String> {
    if let Some(xff) = headers.get("X-Forwarded-For") {
        let first = xff.split(',').next().unwrap_or(xff).trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }

    if let Some(real_ip) = headers.get("X-Real-IP") {
        let host = real_ip.split(':').next().unwrap_or(real_ip).trim();
        if !host.is_empty() {
            return Some(host.to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_url() {
        let url = parse_rtmp_url("rtmp://example.com/live/stream1?token=abc").unwrap();
        assert_eq!(url.host, "example.com");
        assert_eq!(url.port, None);
        assert_eq!(url.app, "live");
        assert_eq!(url.app2, None);
        assert_eq!(url.stream, "stream1");
        assert_eq!(url.query.get("token").unwrap(), "abc");
        assert_eq!(url.vhost, "example.com");
    }

    #[test]
    fn test_parse_url_with_port_and_nested_app() {
        let url = parse_rtmp_url("rtmp://10.0.0.1:1935/live/room1/stream1").unwrap();
        assert_eq!(url.port, Some(1935));
        assert_eq!(url.app, "live");
        assert_eq!(url.app2.as_deref(), Some("room1"));
        assert_eq!(url.stream, "stream1");
    }

    #[test]
    fn test_parse_fmle_embedded_query() {
        let url = parse_rtmp_url("rtmp://example.com/live?key=abc/stream1").unwrap();
        assert_eq!(url.app, "live");
        assert_eq!(url.stream, "stream1");
        assert_eq!(url.query.get("key").unwrap(), "abc");
    }

    #[test]
    fn test_legacy_vhost_syntax() {
        let url = parse_rtmp_url("rtmp://example.com/live...vhost...myvhost.com/stream1").unwrap();
        assert_eq!(url.vhost, "myvhost.com");
    }

    #[test]
    fn test_original_client_ip_prefers_forwarded_for() {
        let mut headers = HttpHeaders::new();
        headers.push("X-Forwarded-For", "203.0.113.5, 10.0.0.1");
        headers.push("X-Real-IP", "198.51.100.9:4000");

        assert_eq!(original_client_ip(&headers).as_deref(), Some("203.0.113.5"));
    }

    #[test]
    fn test_original_client_ip_falls_back_to_real_ip_strips_port() {
        let mut headers = HttpHeaders::new();
        headers.push("X-Real-IP", "198.51.100.9:4000");

        assert_eq!(original_client_ip(&headers).as_deref(), Some("198.51.100.9"));
    }
}
