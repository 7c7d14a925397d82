use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use super::*;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

/// Decoder position inside the telnet byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IacState {
    Data,
    Iac,
    Negotiate(u8),
    Sub,
    SubIac,
}

/// Data captured by [`TelnetTransport::read_until`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Captured {
    pub text: String,
    /// Whether the needle was seen before the deadline.
    pub matched: bool,
}

/// Cleartext telnet transport.
///
/// Strips option negotiation from the incoming stream and refuses every
/// option the device offers or requests.
pub(crate) struct TelnetTransport<S = TcpStream> {
    stream: S,
    buffer: Vec<u8>,
    replies: Vec<u8>,
    state: IacState,
    recorder: Option<SessionRecorder>,
}

impl TelnetTransport<TcpStream> {
    /// Opens a TCP connection bounded by `timeout`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ConnectError> {
        let stream = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Err(_) => return Err(ConnectError::ConnectTimeout(format!("{host}:{port}"))),
            Ok(Err(err)) => {
                return Err(ConnectError::ConnectFailed(
                    format!("{host}:{port}"),
                    err.to_string(),
                ));
            }
            Ok(Ok(stream)) => stream,
        };
        let _ = stream.set_nodelay(true);
        Ok(Self::new(stream))
    }
}

impl<S> TelnetTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            replies: Vec::new(),
            state: IacState::Data,
            recorder: None,
        }
    }

    pub fn set_recorder(&mut self, recorder: Option<SessionRecorder>) {
        self.recorder = recorder;
    }

    /// Reads until `needle` appears or `timeout` elapses.
    ///
    /// On timeout everything buffered so far is returned with `matched == false`.
    /// A closed stream is an error.
    pub async fn read_until(
        &mut self,
        needle: &str,
        timeout: Duration,
    ) -> Result<Captured, ConnectError> {
        let deadline = Instant::now() + timeout;
        let needle = needle.as_bytes();
        let mut chunk = [0u8; 4096];

        loop {
            if let Some(pos) = find_subsequence(&self.buffer, needle) {
                let taken = self.buffer.drain(..pos + needle.len()).collect::<Vec<_>>();
                return Ok(Captured {
                    text: String::from_utf8_lossy(&taken).into_owned(),
                    matched: true,
                });
            }

            match tokio::time::timeout_at(deadline, self.stream.read(&mut chunk)).await {
                Err(_) => {
                    let taken = std::mem::take(&mut self.buffer);
                    return Ok(Captured {
                        text: String::from_utf8_lossy(&taken).into_owned(),
                        matched: false,
                    });
                }
                Ok(Ok(0)) => return Err(ConnectError::StreamClosed),
                Ok(Ok(n)) => {
                    trace!("{:?}", String::from_utf8_lossy(&chunk[..n]));
                    let start = self.buffer.len();
                    self.decode(&chunk[..n]);
                    if let Some(recorder) = self.recorder.as_ref()
                        && self.buffer.len() > start
                    {
                        let _ = recorder.record_raw_chunk(
                            String::from_utf8_lossy(&self.buffer[start..]).into_owned(),
                        );
                    }
                    self.flush_replies().await?;
                }
                Ok(Err(err)) => return Err(map_io_error(err)),
            }
        }
    }

    /// Drops data received but not consumed by a previous read.
    pub fn discard_buffered(&mut self) {
        if !self.buffer.is_empty() {
            trace!(
                "Discarding residual data: {:?}",
                String::from_utf8_lossy(&self.buffer)
            );
            self.buffer.clear();
        }
    }

    /// Writes `data` in one go.
    pub async fn write_str(&mut self, data: &str) -> Result<(), ConnectError> {
        let encoded = escape(data.as_bytes());
        self.stream
            .write_all(&encoded)
            .await
            .map_err(map_io_error)?;
        self.stream.flush().await.map_err(map_io_error)
    }

    /// Writes `data` one character at a time.
    ///
    /// Sleeps `character_spacing` after every character and `line_spacing`
    /// after every newline so the device's input buffer is never overrun.
    pub async fn write_throttled(
        &mut self,
        data: &str,
        character_spacing: Duration,
        line_spacing: Duration,
    ) -> Result<(), ConnectError> {
        let mut utf8 = [0u8; 4];
        for ch in data.chars() {
            self.write_str(ch.encode_utf8(&mut utf8)).await?;
            if !character_spacing.is_zero() {
                tokio::time::sleep(character_spacing).await;
            }
            if ch == '\n' && !line_spacing.is_zero() {
                tokio::time::sleep(line_spacing).await;
            }
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ConnectError> {
        self.stream.shutdown().await.map_err(map_io_error)
    }

    fn decode(&mut self, data: &[u8]) {
        for &byte in data {
            self.state = match (self.state, byte) {
                (IacState::Data, IAC) => IacState::Iac,
                (IacState::Data, _) => {
                    self.buffer.push(byte);
                    IacState::Data
                }
                (IacState::Iac, IAC) => {
                    self.buffer.push(IAC);
                    IacState::Data
                }
                (IacState::Iac, WILL | WONT | DO | DONT) => IacState::Negotiate(byte),
                (IacState::Iac, SB) => IacState::Sub,
                (IacState::Iac, _) => IacState::Data,
                (IacState::Negotiate(command), option) => {
                    match command {
                        DO => self.replies.extend_from_slice(&[IAC, WONT, option]),
                        WILL => self.replies.extend_from_slice(&[IAC, DONT, option]),
                        _ => {}
                    }
                    IacState::Data
                }
                (IacState::Sub, IAC) => IacState::SubIac,
                (IacState::Sub, _) => IacState::Sub,
                (IacState::SubIac, SE) => IacState::Data,
                (IacState::SubIac, _) => IacState::Sub,
            };
        }
    }

    async fn flush_replies(&mut self) -> Result<(), ConnectError> {
        if self.replies.is_empty() {
            return Ok(());
        }
        let replies = std::mem::take(&mut self.replies);
        trace!("Refusing telnet options: {:?}", replies);
        self.stream.write_all(&replies).await.map_err(map_io_error)
    }
}

fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        if byte == IAC {
            out.push(IAC);
        }
        out.push(byte);
    }
    out
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn map_io_error(err: std::io::Error) -> ConnectError {
    match err.kind() {
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof
        | ErrorKind::NotConnected => ConnectError::StreamClosed,
        _ => ConnectError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn negotiation_is_stripped_and_refused() {
        let (client, mut device) = duplex(1024);
        let mut transport = TelnetTransport::new(client);

        device
            .write_all(&[IAC, DO, 24, IAC, WILL, 1, b'U', b's', b'e', b'r', b':'])
            .await
            .unwrap();

        let captured = transport
            .read_until(":", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(captured.matched);
        assert_eq!(captured.text, "User:");

        let mut replies = [0u8; 6];
        device.read_exact(&mut replies).await.unwrap();
        assert_eq!(replies, [IAC, WONT, 24, IAC, DONT, 1]);
    }

    #[tokio::test]
    async fn subnegotiation_and_escaped_iac_are_handled() {
        let (client, mut device) = duplex(1024);
        let mut transport = TelnetTransport::new(client);

        device
            .write_all(&[IAC, SB, 24, 1, IAC, SE, b'a', IAC, IAC, b'#'])
            .await
            .unwrap();

        let captured = transport
            .read_until("#", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(captured.matched);
        assert_eq!(captured.text, String::from_utf8_lossy(&[b'a', IAC, b'#']));
    }

    #[tokio::test]
    async fn read_until_returns_partial_data_on_timeout() {
        let (client, mut device) = duplex(1024);
        let mut transport = TelnetTransport::new(client);

        device.write_all(b"partial output").await.unwrap();

        let captured = transport
            .read_until("sw1#", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(!captured.matched);
        assert_eq!(captured.text, "partial output");
    }

    #[tokio::test]
    async fn read_until_keeps_data_after_needle() {
        let (client, mut device) = duplex(1024);
        let mut transport = TelnetTransport::new(client);

        device.write_all(b"one\r\nsw1#two\r\nsw1#").await.unwrap();

        let first = transport
            .read_until("sw1#", Duration::from_secs(1))
            .await
            .unwrap();
        let second = transport
            .read_until("sw1#", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(first.text, "one\r\nsw1#");
        assert_eq!(second.text, "two\r\nsw1#");
    }

    #[tokio::test]
    async fn closed_stream_is_reported() {
        let (client, device) = duplex(1024);
        let mut transport = TelnetTransport::new(client);
        drop(device);

        let err = transport
            .read_until("#", Duration::from_secs(1))
            .await
            .expect_err("closed stream");
        assert!(matches!(err, ConnectError::StreamClosed));
    }

    #[tokio::test]
    async fn throttled_write_delivers_every_character() {
        let (client, mut device) = duplex(1024);
        let mut transport = TelnetTransport::new(client);

        transport
            .write_throttled(
                "show arp\n",
                Duration::from_millis(1),
                Duration::from_millis(1),
            )
            .await
            .unwrap();

        let mut received = [0u8; 9];
        device.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"show arp\n");
    }
}
