use bytes::{
    Bytes,
    BytesMut,
};
use futures::StreamExt as _;
use std::{
    future::Future,
    io,
    pin::Pin,
    time::Duration,
};
use tokio::{
    io::AsyncWriteExt as _,
    net::{
        tcp::{
            OwnedReadHalf,
            OwnedWriteHalf,
        },
        TcpStream,
    },
};
use tokio_util::codec::{
    AnyDelimiterCodec,
    AnyDelimiterCodecError,
    Decoder,
    FramedRead,
};

/// Lines longer than this are dropped.
const MAX_LINE_LENGTH: usize = 8 * 1024;

const PASSWORD_PROMPT: &str = "Enter password";
const AUTHENTICATION_SUCCEEDED: &str = "Authentication successful";
const AUTHENTICATION_FAILED: &str = "Wrong password";

#[derive(thiserror::Error, Debug)]
pub enum EconError {
    #[error("econ socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("econ did not answer within {0:?}")]
    Timeout(Duration),
    #[error("econ authentication failed: {0}")]
    Authentication(String),
    #[error("econ connection closed by the server")]
    ConnectionClosed,
    #[error("invalid event pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, PartialEq, Eq)]
enum ConsoleFrame {
    Line(String),
    Oversized,
}

/// Splits the console output at `\n`. Bytes that are not UTF-8 are replaced
/// and a line over [`MAX_LINE_LENGTH`] becomes [`ConsoleFrame::Oversized`]
/// instead of failing the stream.
#[derive(Debug)]
struct ConsoleCodec {
    chunks: AnyDelimiterCodec,
}

impl ConsoleCodec {
    fn new(max_length: usize) -> Self {
        Self {
            chunks: AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), max_length),
        }
    }

    fn frame(decoded: Result<Option<Bytes>, AnyDelimiterCodecError>) -> io::Result<Option<ConsoleFrame>> {
        match decoded {
            Ok(Some(chunk)) => {
                let line = String::from_utf8_lossy(&chunk);
                Ok(Some(ConsoleFrame::Line(line.trim_end_matches('\r').to_string())))
            }
            Ok(None) => Ok(None),
            // the inner codec skips the rest of the line on the next call
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => Ok(Some(ConsoleFrame::Oversized)),
            Err(AnyDelimiterCodecError::Io(err)) => Err(err),
        }
    }
}

impl Decoder for ConsoleCodec {
    type Item = ConsoleFrame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<ConsoleFrame>> {
        Self::frame(self.chunks.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<ConsoleFrame>> {
        Self::frame(self.chunks.decode_eof(buf))
    }
}

/// Source of raw console lines, one line per call.
pub trait EventStream: Send + 'static {
    /// `Ok(None)` once the peer closed the stream.
    fn next_event(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<String>, EconError>> + Send + '_>>;
}

/// Authenticated connection to a Teeworlds external console.
#[derive(Debug)]
pub struct EconConnection {
    lines: FramedRead<OwnedReadHalf, ConsoleCodec>,
    // dropping the write half shuts the connection down
    writer: OwnedWriteHalf,
}

impl EconConnection {
    /// Connects and authenticates, both bounded by `timeout`.
    pub async fn connect(host: &str, port: u16, password: &str, timeout: Duration) -> Result<Self, EconError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| EconError::Timeout(timeout))??;
        let (reader, writer) = stream.into_split();
        let mut connection = Self {
            lines: FramedRead::new(reader, ConsoleCodec::new(MAX_LINE_LENGTH)),
            writer,
        };

        tokio::time::timeout(timeout, connection.authenticate(password))
            .await
            .map_err(|_| EconError::Timeout(timeout))??;
        debug!(host, port, "econ authenticated");
        Ok(connection)
    }

    async fn authenticate(&mut self, password: &str) -> Result<(), EconError> {
        loop {
            match self.read_line().await? {
                Some(line) if line.contains(PASSWORD_PROMPT) => break,
                Some(line) => trace!(%line, "skipping line before the password prompt"),
                None => return Err(EconError::ConnectionClosed),
            }
        }

        self.writer.write_all(format!("{password}\n").as_bytes()).await?;

        loop {
            match self.read_line().await? {
                Some(line) if line.contains(AUTHENTICATION_SUCCEEDED) => return Ok(()),
                Some(line) if line.contains(AUTHENTICATION_FAILED) => return Err(EconError::Authentication(line)),
                Some(line) => trace!(%line, "skipping line while authenticating"),
                None => return Err(EconError::ConnectionClosed),
            }
        }
    }

    async fn read_line(&mut self) -> Result<Option<String>, EconError> {
        while let Some(frame) = self.lines.next().await {
            match frame? {
                ConsoleFrame::Line(line) => return Ok(Some(line)),
                ConsoleFrame::Oversized => debug!(max = MAX_LINE_LENGTH, "dropping oversized console line"),
            }
        }
        Ok(None)
    }
}

impl EventStream for EconConnection {
    fn next_event(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<String>, EconError>> + Send + '_>> {
        Box::pin(self.read_line())
    }
}
