// Thin demonstration binary: accepts RTMP connections, performs the
// handshake, then logs every decoded packet. The connection-accept loop,
// control-plane callbacks and stream registry that used to live here are
// out of scope for this crate; see `DESIGN.md`.

use std::sync::Arc;

use rtmp_core::buffer::FastBufferedStream;
use rtmp_core::config::CoreConfig;
use rtmp_core::log::{LogConfig, Logger};
use rtmp_core::{log_error, log_info, log_warning};
use rtmp_core::rtmp::{generate_s0_s1_s2, RtmpMessageLayer, RtmpPacketKind};
use rtmp_core::runtime::{self, write_fully, AcceptGuard, Deadline, Interrupt};
use rtmp_core::utils::{get_env_bool, validate_id_string};

const RTMP_SIG_SIZE: usize = 1536;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _ = dotenvy::dotenv();

    let logger = Logger::new(LogConfig {
        prefix: "".to_string(),
        error_enabled: get_env_bool("LOG_ERROR", true),
        warning_enabled: get_env_bool("LOG_WARNING", true),
        info_enabled: get_env_bool("LOG_INFO", true),
        debug_enabled: get_env_bool("LOG_DEBUG", false),
        trace_enabled: get_env_bool("LOG_TRACE", get_env_bool("LOG_DEBUG", false)),
    });

    const VERSION: &str = env!("CARGO_PKG_VERSION");
    log_info!(logger, format!("RTMP protocol core ({VERSION})"));

    let config = match CoreConfig::load_from_env(&logger) {
        Ok(c) => c,
        Err(e) => {
            log_error!(logger, format!("failed to load configuration: {e}"));
            std::process::exit(1);
        }
    };

    let bind_addr = std::env::var("RTMP_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:1935".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    log_info!(logger, format!("listening on {bind_addr}"));

    let logger = Arc::new(logger);

    let accept_task = runtime::spawn(move |interrupt| async move {
        accept_loop(listener, config, logger, interrupt).await;
    });

    accept_task.join().await?;

    Ok(())
}

async fn accept_loop(
    listener: tokio::net::TcpListener,
    config: CoreConfig,
    logger: Arc<Logger>,
    interrupt: Interrupt,
) {
    let accept_guard = AcceptGuard::new();

    loop {
        let (socket, addr) =
            match runtime::serialize_accept(&accept_guard, &listener, Deadline::never(), &interrupt).await {
                Ok(v) => v,
                Err(e) => {
                    log_error!(logger, format!("accept failed: {e}"));
                    continue;
                }
            };

        if !config.ip_whitelist.contains_ip(&addr.ip()) {
            log_warning!(logger, format!("rejected connection from {addr}: not in IP_WHITELIST"));
            continue;
        }

        let conn_logger = Arc::new(logger.make_child_logger(&format!("[{addr}] ")));
        let conn_config = config.clone();

        runtime::spawn(move |interrupt| async move {
            if let Err(e) = handle_connection(socket, conn_config, conn_logger.clone(), interrupt).await {
                log_error!(conn_logger, format!("connection closed: {e}"));
            }
        });
    }
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    config: CoreConfig,
    logger: Arc<Logger>,
    interrupt: Interrupt,
) -> rtmp_core::Result<()> {
    socket.set_nodelay(true).ok();
    let mut stream = FastBufferedStream::new(socket);
    let deadline = Deadline::never();

    // C0 + C1
    let handshake_in = stream.read_slice(1 + RTMP_SIG_SIZE, deadline, &interrupt).await?;
    let client_signature = &handshake_in[1..];

    let outcome = generate_s0_s1_s2(client_signature, &logger)?;
    write_fully(stream.get_mut(), &outcome.response, deadline, &interrupt).await?;

    // C2
    let _ = stream.read_slice(RTMP_SIG_SIZE, deadline, &interrupt).await?;

    log_info!(logger, "handshake complete");

    let mut layer = RtmpMessageLayer::new();
    layer.set_chunk_size_bounds(config.chunk_size_min, config.chunk_size_max);

    loop {
        let packet = match layer.recv_message(&mut stream, deadline, &interrupt).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                flush_pending(&mut layer, &mut stream, deadline, &interrupt).await?;
                continue;
            }
            Err(e) if e.is_eof() => {
                log_info!(logger, "peer disconnected");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match layer.decode_message(&packet) {
            Ok(RtmpPacketKind::Publish(cmd)) => {
                let stream_name = cmd.get_argument("streamName").map(|v| v.get_string()).unwrap_or("");
                if !validate_id_string(stream_name, config.id_max_length) {
                    log_warning!(
                        logger,
                        format!("rejecting publish with invalid stream key {stream_name:?}")
                    );
                    return Err(rtmp_core::error::Error::protocol("invalid stream key"));
                }
                log_info!(logger, format!("received Publish({stream_name})"));
            }
            Ok(kind) => log_info!(logger, format!("received {}", kind_name(&kind))),
            Err(e) => log_error!(logger, format!("failed to decode packet: {e}")),
        }

        flush_pending(&mut layer, &mut stream, deadline, &interrupt).await?;
    }
}

/// Short name for a decoded packet kind, for logging (`RtmpPacketKind` does
/// not derive `Debug`: its payloads carry AMF0 values that don't either).
fn kind_name(kind: &RtmpPacketKind) -> &'static str {
    match kind {
        RtmpPacketKind::ConnectApp(_) => "ConnectApp",
        RtmpPacketKind::ConnectAppResponse(_) => "ConnectAppResponse",
        RtmpPacketKind::CreateStream(_) => "CreateStream",
        RtmpPacketKind::CreateStreamResponse(_) => "CreateStreamResponse",
        RtmpPacketKind::CloseStream(_) => "CloseStream",
        RtmpPacketKind::FmleStart(_) => "FmleStart",
        RtmpPacketKind::FmleStartResponse(_) => "FmleStartResponse",
        RtmpPacketKind::Publish(_) => "Publish",
        RtmpPacketKind::Pause(_) => "Pause",
        RtmpPacketKind::Play(_) => "Play",
        RtmpPacketKind::PlayResponse(_) => "PlayResponse",
        RtmpPacketKind::OnBwDone(_) => "OnBwDone",
        RtmpPacketKind::OnStatusCall(_) => "OnStatusCall",
        RtmpPacketKind::OnStatusData(_) => "OnStatusData",
        RtmpPacketKind::SampleAccess(_) => "SampleAccess",
        RtmpPacketKind::OnMetaData(_) => "OnMetaData",
        RtmpPacketKind::SetWindowAckSize(_) => "SetWindowAckSize",
        RtmpPacketKind::Acknowledgement(_) => "Acknowledgement",
        RtmpPacketKind::SetChunkSize(_) => "SetChunkSize",
        RtmpPacketKind::SetPeerBandwidth { .. } => "SetPeerBandwidth",
        RtmpPacketKind::UserControl { .. } => "UserControl",
        RtmpPacketKind::Audio => "Audio",
        RtmpPacketKind::Video => "Video",
        RtmpPacketKind::GenericCall(_) => "GenericCall",
    }
}

async fn flush_pending(
    layer: &mut RtmpMessageLayer,
    stream: &mut FastBufferedStream<tokio::net::TcpStream>,
    deadline: Deadline,
    interrupt: &Interrupt,
) -> rtmp_core::Result<()> {
    for out in layer.drain_pending_writes() {
        write_fully(stream.get_mut(), &out, deadline, interrupt).await?;
    }
    Ok(())
}
