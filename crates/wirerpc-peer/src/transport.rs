use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::SinkExt;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWrite, ReadHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tracing::{debug, trace, warn};
use wirerpc_channel::{Channel, ChannelError};
use wirerpc_codec::{DecodeError, Framer};
use wirerpc_frame::{FrameError, LengthPrefixCodec, LengthPrefixParser, ParserConfig};

use crate::error::{PeerError, Result};
use crate::message::Message;
use crate::provider::Context;

/// Read granularity for inbound bytes.
const READ_CHUNK: usize = 8 * 1024;

type BoxedChannel = Box<dyn Channel>;

/// Something the transport observed on its channel.
#[derive(Debug)]
pub enum TransportEvent {
    /// A payload decoded into a message.
    Message {
        message: Message,
        context: Option<Context>,
    },
    /// A complete payload that the framer rejected.
    DecodeError {
        error: DecodeError,
        payload: Bytes,
        context: Option<Context>,
    },
    /// The channel terminated. `None` means a clean end of stream.
    Closed { error: Option<PeerError> },
}

/// Cloneable outbound half of a [`Transport`].
///
/// Encoding happens on the caller; the frames are queued for the writer task
/// in send order.
#[derive(Clone)]
pub struct TransportSender {
    framer: Arc<dyn Framer>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<Bytes>>>>,
    max_payload: usize,
}

impl TransportSender {
    /// Encode and queue one message.
    pub fn send(&self, message: &Message) -> Result<()> {
        let payload = self.framer.encode(&message.to_value())?;
        if payload.len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            }
            .into());
        }
        let outbound = self.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            return Err(PeerError::NotConnected);
        };
        trace!(kind = message.kind(), len = payload.len(), "queued frame");
        tx.send(payload).map_err(|_| PeerError::NotConnected)
    }

    /// Whether a writer is still accepting frames.
    pub fn is_connected(&self) -> bool {
        self.outbound
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

impl fmt::Debug for TransportSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSender")
            .field("connected", &self.is_connected())
            .field("max_payload", &self.max_payload)
            .finish()
    }
}

/// One channel, one parser, one framer.
///
/// Inbound bytes go through the parser and the framer and come out of
/// [`recv`](Self::recv) as [`TransportEvent`]s. Outbound messages are encoded
/// by [`TransportSender`] and written by a dedicated task.
pub struct Transport {
    framer: Arc<dyn Framer>,
    parser: LengthPrefixParser,
    reader: Option<ReadHalf<BoxedChannel>>,
    writer: Option<JoinHandle<std::result::Result<(), FrameError>>>,
    sender: TransportSender,
    context: Option<Context>,
    pending: VecDeque<TransportEvent>,
    read_buf: BytesMut,
}

impl Transport {
    /// Create an unbound transport.
    pub fn new(framer: Arc<dyn Framer>, config: ParserConfig) -> Self {
        let sender = TransportSender {
            framer: Arc::clone(&framer),
            outbound: Arc::new(Mutex::new(None)),
            max_payload: config.max_payload,
        };
        Self {
            framer,
            parser: LengthPrefixParser::with_config(config),
            reader: None,
            writer: None,
            sender,
            context: None,
            pending: VecDeque::new(),
            read_buf: BytesMut::new(),
        }
    }

    /// Context attached to every inbound event.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn set_context(&mut self, context: Option<Context>) {
        self.context = context;
    }

    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    /// Bind a channel, replacing any previous one.
    ///
    /// The previous channel's writer is detached: it flushes what was already
    /// queued and shuts its half down. The parser is reset so no partial
    /// frame carries over. Must be called within a Tokio runtime.
    pub fn bind<C: Channel>(&mut self, channel: C) {
        self.detach();
        self.parser.reset(None);
        self.pending.clear();

        let boxed: BoxedChannel = Box::new(channel);
        let (reader, writer) = tokio::io::split(boxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let codec = LengthPrefixCodec::with_max_payload(self.sender.max_payload);

        self.writer = Some(tokio::spawn(write_loop(writer, codec, rx)));
        self.reader = Some(reader);
        *self.sender.outbound.lock() = Some(tx);
        debug!(context = ?self.context, "transport bound");
    }

    /// Outbound handle sharing this transport's writer.
    pub fn sender(&self) -> TransportSender {
        self.sender.clone()
    }

    pub fn send(&self, message: &Message) -> Result<()> {
        self.sender.send(message)
    }

    pub fn is_bound(&self) -> bool {
        self.reader.is_some()
    }

    pub fn framer(&self) -> &Arc<dyn Framer> {
        &self.framer
    }

    /// Push raw bytes through the parser and framer by hand.
    ///
    /// Returns every event completed by this chunk, in arrival order. A
    /// declared frame length above the configured maximum is an error; the
    /// stream cannot be resynchronized after it.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<TransportEvent>> {
        let mut events = VecDeque::new();
        ingest(
            &mut self.parser,
            self.framer.as_ref(),
            &self.context,
            chunk,
            &mut events,
        )?;
        Ok(events.into())
    }

    /// Next inbound event.
    ///
    /// Returns `Closed` once when the channel ends, then `None`. Cancel-safe:
    /// dropping the future loses no bytes.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let reader = self.reader.as_mut()?;

            self.read_buf.reserve(READ_CHUNK);
            let read = reader.read_buf(&mut self.read_buf).await;
            let closed = match read {
                Ok(0) => Some(None),
                Ok(_) => {
                    let outcome = ingest(
                        &mut self.parser,
                        self.framer.as_ref(),
                        &self.context,
                        &self.read_buf,
                        &mut self.pending,
                    );
                    self.read_buf.clear();
                    outcome.err().map(|err| Some(PeerError::from(err)))
                }
                Err(err) => Some(Some(PeerError::from(ChannelError::Io(err)))),
            };

            if let Some(error) = closed {
                match &error {
                    Some(error) => warn!(%error, "channel terminated"),
                    None => debug!("channel reached end of stream"),
                }
                self.close().await;
                self.pending.push_back(TransportEvent::Closed { error });
            }
        }
    }

    /// Release the channel.
    ///
    /// Queued outbound frames are flushed before the write half shuts down.
    /// The parser buffer is released.
    pub async fn close(&mut self) {
        self.sender.outbound.lock().take();
        if let Some(writer) = self.writer.take() {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!(%error, "writer stopped with error"),
                Err(error) => warn!(%error, "writer task failed"),
            }
        }
        if self.reader.take().is_some() {
            debug!(context = ?self.context, "transport closed");
        }
        self.parser.reset(Some(0));
    }

    fn detach(&mut self) {
        self.sender.outbound.lock().take();
        self.writer.take();
        self.reader.take();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.sender.outbound.lock().take();
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("bound", &self.is_bound())
            .field("buffered", &self.parser.buffered())
            .field("context", &self.context)
            .finish()
    }
}

fn ingest(
    parser: &mut LengthPrefixParser,
    framer: &dyn Framer,
    context: &Option<Context>,
    chunk: &[u8],
    out: &mut VecDeque<TransportEvent>,
) -> std::result::Result<usize, FrameError> {
    parser.parse(chunk, |payload| {
        let event = match framer.decode(&payload) {
            Ok(value) => TransportEvent::Message {
                message: Message::from_value(value),
                context: context.clone(),
            },
            Err(error) => {
                debug!(%error, len = payload.len(), "payload failed to decode");
                TransportEvent::DecodeError {
                    error,
                    payload,
                    context: context.clone(),
                }
            }
        };
        out.push_back(event);
    })
}

async fn write_loop<W>(
    writer: W,
    codec: LengthPrefixCodec,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
) -> std::result::Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, codec);
    while let Some(payload) = rx.recv().await {
        sink.feed(payload).await?;
        while let Ok(payload) = rx.try_recv() {
            sink.feed(payload).await?;
        }
        sink.flush().await?;
    }
    sink.close().await
}
