use anyhow::Result;
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::{
    bytes::Bytes,
    codec::{FramedRead, FramedWrite, LengthDelimitedCodec},
    sync::CancellationToken,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{daemon::tracking::event::TrackerEvent, utils::clock::Clock};

use super::messages::{HostCommand, HostReply, InboundMessage, ReplyData};

/// Largest message a browser will exchange with a native host.
pub const MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// Native messaging framing: a 4 byte little-endian length followed by that many bytes of JSON.
pub fn native_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .little_endian()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Reads browser events from the native messaging pipe, stamps them and hands them to the
/// processing loop. Every frame is acknowledged on the output pipe, [HostCommand]s are answered
/// right away.
///
/// The browser closing the pipe is how the host learns it should exit, so end of input cancels
/// the shared shutdown token.
pub struct NativeIntake<R, W> {
    frames: FramedRead<R, LengthDelimitedCodec>,
    replies: FramedWrite<W, LengthDelimitedCodec>,
    next: mpsc::Sender<TrackerEvent>,
    shutdown: CancellationToken,
    time_provider: Box<dyn Clock>,
    backend_url: Url,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> NativeIntake<R, W> {
    pub fn new(
        input: R,
        output: W,
        next: mpsc::Sender<TrackerEvent>,
        shutdown: CancellationToken,
        time_provider: Box<dyn Clock>,
        backend_url: Url,
    ) -> Self {
        Self {
            frames: FramedRead::new(input, native_codec()),
            replies: FramedWrite::new(output, native_codec()),
            next,
            shutdown,
            time_provider,
            backend_url,
        }
    }

    /// Executes the intake loop.
    pub async fn run(mut self) -> Result<()> {
        let result = self.read_frames().await;
        // Whatever stopped us, the rest of the host has nothing left to wait for.
        self.shutdown.cancel();
        result
    }

    async fn read_frames(&mut self) -> Result<()> {
        loop {
            let frame = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                frame = self.frames.next() => frame,
            };

            let frame = match frame {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    error!("Native messaging pipe is broken {e:?}");
                    return Err(e.into());
                }
                None => {
                    info!("Browser closed the native messaging pipe");
                    return Ok(());
                }
            };

            let timestamp = self.time_provider.time();
            let reply = match serde_json::from_slice::<InboundMessage>(&frame) {
                Ok(InboundMessage::Browser(message)) => {
                    debug!("Received {:?}", message);
                    self.next
                        .send(TrackerEvent::browser(message, timestamp))
                        .await
                        .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
                    HostReply::ok()
                }
                Ok(InboundMessage::Command(command)) => {
                    debug!("Received {:?}", command);
                    self.answer(command)
                }
                Err(e) => {
                    warn!(
                        "Skipping undecodable message {}: {e}",
                        String::from_utf8_lossy(&frame)
                    );
                    HostReply::Error {
                        message: e.to_string(),
                    }
                }
            };

            self.reply(reply).await;
        }
    }

    fn answer(&self, command: HostCommand) -> HostReply {
        match command {
            HostCommand::GetBackendUrl => HostReply::Ok(ReplyData {
                backend_url: Some(self.backend_url.to_string()),
                ..ReplyData::default()
            }),
            HostCommand::GetUsername => match current_username() {
                Some(username) => HostReply::Ok(ReplyData {
                    username: Some(username),
                    ..ReplyData::default()
                }),
                None => HostReply::Error {
                    message: "username_unavailable".into(),
                },
            },
        }
    }

    async fn reply(&mut self, reply: HostReply) {
        let payload = match serde_json::to_vec(&reply) {
            Ok(v) => Bytes::from(v),
            Err(e) => {
                error!("Failed to encode reply {:?}: {e}", reply);
                return;
            }
        };
        if let Err(e) = self.replies.send(payload).await {
            warn!("Failed to acknowledge message {e:?}");
        }
    }
}

/// Login name of the user running the host.
fn current_username() -> Option<String> {
    ["USER", "USERNAME", "LOGNAME"]
        .into_iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|v| !v.is_empty())
}
