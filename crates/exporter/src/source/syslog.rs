use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::{Source, SourceError};
use crate::conf::SyslogSource;

/// Buffered messages per tag before the listener waits on the pipeline.
const TAG_CHANNEL_CAPACITY: usize = 1024;

const MAX_DATAGRAM: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyslogFormat {
    Automatic,
    Rfc3164,
    Rfc5424,
}

impl FromStr for SyslogFormat {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "automatic" => Ok(SyslogFormat::Automatic),
            "rfc3164" => Ok(SyslogFormat::Rfc3164),
            "rfc5424" => Ok(SyslogFormat::Rfc5424),
            other => Err(SourceError::UnknownFormat(other.to_string())),
        }
    }
}

/// The parts of a syslog message used for routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslogMessage {
    pub priority: u32,
    pub hostname: Option<String>,
    pub tag: String,
    pub content: String,
}

/// Parse one syslog message (RFC 3164 or RFC 5424).
///
/// The tag is the RFC 5424 app-name or the RFC 3164 program name.
pub fn parse_message(text: &str, format: SyslogFormat) -> Option<SyslogMessage> {
    let rest = text.strip_prefix('<')?;
    let pri_end = rest.find('>')?;
    let priority: u32 = rest[..pri_end].parse().ok()?;
    let remainder = &rest[pri_end + 1..];

    let is_5424 = remainder.starts_with("1 ");
    match format {
        SyslogFormat::Rfc5424 if !is_5424 => None,
        SyslogFormat::Rfc5424 => parse_rfc5424(priority, &remainder[2..]),
        SyslogFormat::Automatic if is_5424 => parse_rfc5424(priority, &remainder[2..]),
        SyslogFormat::Automatic | SyslogFormat::Rfc3164 => parse_rfc3164(priority, remainder),
    }
}

/// `TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA MSG`
fn parse_rfc5424(priority: u32, text: &str) -> Option<SyslogMessage> {
    let parts: Vec<&str> = text.splitn(6, ' ').collect();
    if parts.len() < 5 {
        return None;
    }

    let nil = |s: &str| (s != "-").then(|| s.to_string());
    let hostname = nil(parts[1]);
    let tag = nil(parts[2])?;

    let sd_and_msg = parts.get(5).copied().unwrap_or("");
    let content = skip_structured_data(sd_and_msg)
        .trim_start_matches('\u{feff}')
        .to_string();

    Some(SyslogMessage {
        priority,
        hostname,
        tag,
        content,
    })
}

fn skip_structured_data(text: &str) -> &str {
    if let Some(rest) = text.strip_prefix('-') {
        return rest.trim_start();
    }

    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i] == b'[' {
        let mut escaped = false;
        i += 1;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' if !escaped => escaped = true,
                b']' if !escaped => break,
                _ => escaped = false,
            }
            i += 1;
        }
        i += 1;
    }
    text.get(i.min(text.len())..).unwrap_or("").trim_start()
}

/// `Mmm dd hh:mm:ss HOSTNAME TAG[PID]: MSG`
fn parse_rfc3164(priority: u32, text: &str) -> Option<SyslogMessage> {
    // The timestamp is always "Mmm dd hh:mm:ss"; day is space-padded
    let after_ts = text.get(16..).filter(|_| text.as_bytes().get(15) == Some(&b' '))?;

    let (hostname, rest) = after_ts.split_once(' ')?;
    let (tag_part, content) = match rest.split_once(':') {
        Some((tag, msg)) => (tag, msg.strip_prefix(' ').unwrap_or(msg)),
        None => (rest, ""),
    };
    let tag = tag_part.split('[').next().unwrap_or(tag_part).trim();
    if tag.is_empty() {
        return None;
    }

    Some(SyslogMessage {
        priority,
        hostname: Some(hostname.to_string()),
        tag: tag.to_string(),
        content: content.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Udp,
    Tcp,
}

fn parse_address(address: &str) -> Result<(Transport, &str), SourceError> {
    if let Some(host) = address.strip_prefix("udp://") {
        Ok((Transport::Udp, host))
    } else if let Some(host) = address.strip_prefix("tcp://") {
        Ok((Transport::Tcp, host))
    } else {
        Err(SourceError::InvalidAddress(address.to_string()))
    }
}

struct Router {
    format: SyslogFormat,
    tags: HashMap<String, mpsc::Sender<String>>,
}

impl Router {
    async fn route(&self, text: &str) {
        let text = text.trim_end_matches(['\n', '\r', '\0']);
        let Some(message) = parse_message(text, self.format) else {
            debug!("dropping unparsable syslog message");
            return;
        };
        match self.tags.get(&message.tag) {
            // A closed receiver means the pipeline is gone
            Some(tx) => {
                let _ = tx.send(message.content).await;
            }
            None => debug!(tag = %message.tag, "dropping syslog message for unknown tag"),
        }
    }
}

/// A syslog listener shared by all tags of one namespace.
#[derive(Debug)]
pub struct SyslogServer {
    address: String,
    local_addr: SocketAddr,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl SyslogServer {
    /// Bind the listener and return one line source per configured tag.
    pub async fn listen(cfg: &SyslogSource) -> Result<(Self, Vec<Source>), SourceError> {
        let format: SyslogFormat = cfg.format.parse()?;
        let (transport, host) = parse_address(&cfg.listen_address)?;

        let mut tags = HashMap::new();
        let mut sources = Vec::with_capacity(cfg.tags.len());
        for tag in &cfg.tags {
            let (tx, rx) = mpsc::channel(TAG_CHANNEL_CAPACITY);
            tags.insert(tag.clone(), tx);
            let lines = ReceiverStream::new(rx).map(Ok);
            sources.push(Source::new(format!("syslog:{}", tag), lines));
        }
        let router = Arc::new(Router { format, tags });

        let bind_err = |source| SourceError::Bind {
            address: cfg.listen_address.clone(),
            source,
        };
        let stop = CancellationToken::new();

        let (local_addr, task) = match transport {
            Transport::Udp => {
                let socket = UdpSocket::bind(host).await.map_err(bind_err)?;
                let local_addr = socket.local_addr().map_err(bind_err)?;
                (local_addr, tokio::spawn(serve_udp(socket, router, stop.clone())))
            }
            Transport::Tcp => {
                let listener = TcpListener::bind(host).await.map_err(bind_err)?;
                let local_addr = listener.local_addr().map_err(bind_err)?;
                (local_addr, tokio::spawn(serve_tcp(listener, router, stop.clone())))
            }
        };

        info!("Running syslog server on address {}", cfg.listen_address);
        Ok((
            Self {
                address: cfg.listen_address.clone(),
                local_addr,
                stop,
                task,
            },
            sources,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting messages. Every tag stream ends once the listener
    /// has shut down.
    pub async fn close(self) {
        info!("Closing syslog server on address {}", self.address);
        self.stop.cancel();
        if let Err(e) = self.task.await {
            warn!("syslog server task failed: {}", e);
        }
    }
}

async fn serve_udp(socket: UdpSocket, router: Arc<Router>, stop: CancellationToken) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((n, _peer)) => {
                    let text = String::from_utf8_lossy(&buf[..n]);
                    router.route(&text).await;
                }
                Err(e) => warn!("syslog receive error: {}", e),
            }
        }
    }
}

async fn serve_tcp(listener: TcpListener, router: Arc<Router>, stop: CancellationToken) {
    let connections = TaskTracker::new();
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "syslog connection accepted");
                    connections.spawn(serve_connection(stream, router.clone(), stop.clone()));
                }
                Err(e) => warn!("syslog accept error: {}", e),
            }
        }
    }
    connections.close();
    connections.wait().await;
}

async fn serve_connection(stream: TcpStream, router: Arc<Router>, stop: CancellationToken) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => router.route(&line).await,
                Ok(None) => break,
                Err(e) => {
                    debug!("syslog connection closed: {}", e);
                    break;
                }
            }
        }
    }
}
