//! Relay connection for one participant

use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;

use super::config::ClientConfig;
use super::transcript::Transcript;
use crate::codec::{Cipher, LineCodec, WireFramer};
use crate::error::{Error, Result};
use crate::message::{is_valid_username, Message};

/// Connected chat participant
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use chat_relay::client::{ChatClient, ClientConfig};
/// use chat_relay::codec::{AesGcmCipher, SharedKey};
///
/// # async fn example() -> chat_relay::Result<()> {
/// let key = SharedKey::parse("12345678901234567890123456789012")?;
/// let config = ClientConfig::new("127.0.0.1:9000".parse().unwrap(), "alice");
/// let mut client = ChatClient::connect(config, Arc::new(AesGcmCipher::new(&key))).await?;
///
/// client.send("hello").await?;
/// while let Some(msg) = client.next_message().await? {
///     println!("{}: {}", msg.username, msg.content);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ChatClient {
    username: String,
    framer: WireFramer,
    reader: FramedRead<OwnedReadHalf, LineCodec>,
    writer: OwnedWriteHalf,
    transcript: Transcript,
    max_frame_length: usize,
}

impl ChatClient {
    /// Connect to the relay
    ///
    /// Fails without connecting if the username contains the field
    /// separator.
    pub async fn connect(config: ClientConfig, cipher: Arc<dyn Cipher>) -> Result<Self> {
        if !is_valid_username(&config.username) {
            return Err(Error::InvalidUsername(config.username));
        }

        let socket = TcpStream::connect(config.server_addr).await?;
        if config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        let (read_half, write_half) = socket.into_split();

        tracing::debug!(server = %config.server_addr, username = %config.username, "Connected to relay");

        Ok(Self {
            username: config.username,
            framer: WireFramer::new(cipher),
            reader: FramedRead::new(read_half, LineCodec::new(config.max_frame_length)),
            writer: write_half,
            transcript: Transcript::new(),
            max_frame_length: config.max_frame_length,
        })
    }

    /// Send a message
    ///
    /// The message is added to the local transcript before it is written, so
    /// the relay's echo is recognised as a duplicate. Content whose frame
    /// would exceed the line limit is rejected without writing anything, since
    /// the relay would drop the connection on it.
    pub async fn send(&mut self, content: impl Into<String>) -> Result<Message> {
        let msg = Message::new(self.username.clone(), content);
        let frame = self.framer.encode(&msg)?;

        // Terminator is not counted against the limit
        let len = frame.len() - 1;
        if len > self.max_frame_length {
            return Err(Error::MessageTooLong {
                len,
                max: self.max_frame_length,
            });
        }

        self.transcript.insert(msg.clone());
        self.writer.write_all(&frame).await?;

        Ok(msg)
    }

    /// Wait for the next message not already in the transcript
    ///
    /// Undecodable lines and duplicates are skipped. Returns `None` once the
    /// relay closes the connection.
    pub async fn next_message(&mut self) -> Result<Option<Message>> {
        while let Some(line) = self.reader.next().await {
            let line = line?;

            let msg = match self.framer.decode(&line) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping bad frame from relay");
                    continue;
                }
            };

            if self.transcript.insert(msg.clone()) {
                return Ok(Some(msg));
            }
        }

        Ok(None)
    }

    /// Messages received or sent so far
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// This participant's username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Close the outbound direction; the relay ends the session
    pub async fn disconnect(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
