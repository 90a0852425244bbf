//! The streaming session engine.
//!
//! A [`Session`] owns every moving part of one conversation: the transport
//! halves, the encode/decode transforms, the capture source, the playback
//! queue and sink, the text sink, and the liveness watchdog. Nothing is
//! global; a second session is just a second `Session`.
//!
//! Pipelines run as tokio tasks:
//!
//! - capture: microphone samples → encoder input
//! - encode pump: encoder output → outbound channel
//! - send pump: outbound channel → transport (gated on the handshake)
//! - receive: transport → dispatch (handshake / text / decoder input)
//! - decode pump: decoder output → reassembler → playback queue
//! - watchdog: forces teardown after prolonged inbound silence
//!
//! Any terminal condition (peer close, transport error, watchdog, explicit
//! stop, transform death) funnels into one idempotent teardown that runs the
//! fixed shutdown sequence and lands the state machine in `Closed`.

pub mod liveness;
pub mod playback;
pub mod reassembly;
pub mod text;

use crate::archive::PcmArchive;
use crate::audio::sink::AudioSink;
use crate::audio::source::AudioSource;
use crate::defaults;
use crate::endpoint::Endpoint;
use crate::error::{Result, VoxlinkError};
use crate::protocol::WireMessage;
use crate::transform::{AudioTransform, TransformInput};
use crate::transport::{self, Transport, TransportSink, TransportStream};
use liveness::LivenessTracker;
use playback::PlaybackQueue;
use reassembly::FrameReassembler;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use text::TextSink;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Lifecycle of a session.
///
/// `Connecting` covers the gap between transport-open and protocol-open: the
/// socket may be up, but the session is not `Open` until the server's
/// handshake message arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Timing knobs, separated from the global defaults so tests can shrink them.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub capture_poll: Duration,
    pub watchdog_poll: Duration,
    pub stale_threshold: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture_poll: defaults::CAPTURE_POLL_INTERVAL,
            watchdog_poll: defaults::WATCHDOG_POLL_INTERVAL,
            stale_threshold: defaults::STALE_THRESHOLD,
        }
    }
}

/// The collaborators a session is assembled from.
pub struct SessionParts {
    pub source: Box<dyn AudioSource>,
    pub sink: Box<dyn AudioSink>,
    pub encoder: Box<dyn AudioTransform>,
    pub decoder: Box<dyn AudioTransform>,
    pub text_sink: Box<dyn TextSink>,
    /// When set, all decoded PCM is written here as WAV at teardown.
    pub archive: Option<PcmArchive>,
}

/// A not-yet-started session.
pub struct Session {
    parts: SessionParts,
    config: SessionConfig,
}

impl Session {
    pub fn new(parts: SessionParts) -> Self {
        Self::with_config(parts, SessionConfig::default())
    }

    pub fn with_config(parts: SessionParts, config: SessionConfig) -> Self {
        Self { parts, config }
    }

    /// Opens the endpoint's transport and runs the session.
    ///
    /// Open failures (credential rejection, unresolvable endpoint) are
    /// returned as-is; the session ends `Closed` without ever being `Open`
    /// and is never retried.
    pub async fn start(self, endpoint: &Endpoint) -> Result<SessionHandle> {
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let _ = state_tx.send(SessionState::Connecting);

        let transport = match transport::connect(endpoint).await {
            Ok(transport) => transport,
            Err(e) => {
                let _ = state_tx.send(SessionState::Closed);
                return Err(e);
            }
        };

        self.start_on(transport, state_tx, state_rx)
    }

    /// Runs the session over an already-open transport. Used by tests to
    /// drive the engine without a network.
    pub fn start_with_transport(self, transport: Box<dyn Transport>) -> Result<SessionHandle> {
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let _ = state_tx.send(SessionState::Connecting);
        self.start_on(transport, state_tx, state_rx)
    }

    fn start_on(
        self,
        transport: Box<dyn Transport>,
        state_tx: watch::Sender<SessionState>,
        state_rx: watch::Receiver<SessionState>,
    ) -> Result<SessionHandle> {
        let SessionParts {
            mut source,
            mut sink,
            encoder,
            decoder,
            text_sink,
            archive,
        } = self.parts;

        let (transport_sink, transport_stream) = transport.split();
        let (encoder_in, encoder_out) = encoder.split();
        let (decoder_in, decoder_out) = decoder.split();

        let queue = Arc::new(Mutex::new(PlaybackQueue::new()));

        // Capture and playback devices come up as soon as the transport is
        // open; transmission is still gated on the protocol handshake.
        if let Err(e) = source.start() {
            let _ = state_tx.send(SessionState::Closed);
            return Err(e);
        }
        if let Err(e) = sink.start(queue.clone()) {
            let _ = source.stop();
            let _ = state_tx.send(SessionState::Closed);
            return Err(e);
        }

        let runtime = Arc::new(SessionRuntime {
            state_tx,
            liveness: LivenessTracker::new(),
            torn_down: AtomicBool::new(false),
            teardown_parts: Mutex::new(Some(TeardownParts {
                source,
                sink,
                archive_slot: Arc::new(Mutex::new(archive)),
            })),
            encoder_in: tokio::sync::Mutex::new(encoder_in),
            decoder_in: tokio::sync::Mutex::new(decoder_in),
            transport_sink: tokio::sync::Mutex::new(transport_sink),
        });

        let archive_slot = runtime
            .teardown_parts
            .lock()
            .map_err(|_| VoxlinkError::Other("teardown state poisoned".to_string()))?
            .as_ref()
            .map(|parts| parts.archive_slot.clone())
            .unwrap_or_default();

        let (outbound_tx, outbound_rx) =
            mpsc::channel::<Vec<u8>>(defaults::OUTBOUND_CHANNEL_CAPACITY);

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(capture_pump(
            runtime.clone(),
            state_rx.clone(),
            self.config.capture_poll,
        )));
        tasks.push(tokio::spawn(encode_pump(
            runtime.clone(),
            encoder_out,
            outbound_tx,
        )));
        tasks.push(tokio::spawn(send_pump(
            runtime.clone(),
            state_rx.clone(),
            outbound_rx,
        )));
        tasks.push(tokio::spawn(receive_pump(
            runtime.clone(),
            transport_stream,
            text_sink,
        )));
        tasks.push(tokio::spawn(decode_pump(
            runtime.clone(),
            decoder_out,
            queue.clone(),
            archive_slot,
        )));
        tasks.push(tokio::spawn(watchdog(
            runtime.clone(),
            state_rx.clone(),
            self.config.watchdog_poll,
            self.config.stale_threshold,
        )));

        Ok(SessionHandle {
            runtime,
            state_rx,
            queue,
            tasks,
        })
    }
}

/// Control handle to a running session.
pub struct SessionHandle {
    runtime: Arc<SessionRuntime>,
    state_rx: watch::Receiver<SessionState>,
    queue: Arc<Mutex<PlaybackQueue>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Shared playback queue, mainly for inspection in tests.
    pub fn playback_queue(&self) -> Arc<Mutex<PlaybackQueue>> {
        self.queue.clone()
    }

    /// Waits until the session reaches `Closed`.
    pub async fn closed(&mut self) {
        let _ = self
            .state_rx
            .wait_for(|state| *state == SessionState::Closed)
            .await;
    }

    /// Explicit stop: runs the teardown sequence and waits for `Closed`.
    /// Safe to call more than once.
    pub async fn stop(&mut self) {
        self.runtime.teardown("stop requested").await;
        self.closed().await;
        // Pumps blocked on I/O that will never complete (e.g. a peer that
        // never answers our close) are cut loose here.
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// Parts only touched during teardown.
struct TeardownParts {
    source: Box<dyn AudioSource>,
    sink: Box<dyn AudioSink>,
    archive_slot: Arc<Mutex<Option<PcmArchive>>>,
}

/// State shared by every pump task.
struct SessionRuntime {
    state_tx: watch::Sender<SessionState>,
    liveness: LivenessTracker,
    torn_down: AtomicBool,
    teardown_parts: Mutex<Option<TeardownParts>>,
    encoder_in: tokio::sync::Mutex<Box<dyn TransformInput>>,
    decoder_in: tokio::sync::Mutex<Box<dyn TransformInput>>,
    transport_sink: tokio::sync::Mutex<Box<dyn TransportSink>>,
}

impl SessionRuntime {
    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SessionState) {
        let _ = self.state_tx.send(state);
    }

    /// Marks the session `Open` on the first handshake.
    fn protocol_open(&self) {
        if self.state() == SessionState::Connecting {
            self.set_state(SessionState::Open);
            tracing::info!("handshake received, session is open");
        }
    }

    /// The fixed shutdown sequence. Runs exactly once no matter how many
    /// terminal conditions fire; every step is best-effort and none is
    /// skipped when an earlier one fails.
    async fn teardown(&self, reason: &str) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(reason, "tearing down session");
        self.set_state(SessionState::Closing);
        self.liveness.clear();

        let mut parts = self
            .teardown_parts
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());

        // 1. stop microphone capture
        if let Some(parts) = parts.as_mut() {
            if let Err(e) = parts.source.stop() {
                tracing::warn!(error = %e, "failed to stop capture");
            }
        }

        // 2. end encoder input
        if let Err(e) = self.encoder_in.lock().await.end_input().await {
            tracing::warn!(error = %e, "failed to end encoder input");
        }

        // 3. end decoder input
        if let Err(e) = self.decoder_in.lock().await.end_input().await {
            tracing::warn!(error = %e, "failed to end decoder input");
        }

        // 4. close the transport
        if let Err(e) = self.transport_sink.lock().await.close().await {
            tracing::warn!(error = %e, "failed to close transport");
        }

        // 5. release playback and flush the archive
        if let Some(mut parts) = parts {
            if let Err(e) = parts.sink.stop() {
                tracing::warn!(error = %e, "failed to stop playback");
            }
            let archive = parts.archive_slot.lock().ok().and_then(|mut a| a.take());
            if let Some(archive) = archive {
                let path = archive.path().to_path_buf();
                match archive.finish() {
                    Ok(()) => tracing::info!(path = %path.display(), "saved received audio"),
                    Err(e) => tracing::warn!(error = %e, "failed to save received audio"),
                }
            }
        }

        self.set_state(SessionState::Closed);
    }
}

/// Polls the microphone and feeds raw PCM into the encoder.
async fn capture_pump(
    runtime: Arc<SessionRuntime>,
    state_rx: watch::Receiver<SessionState>,
    poll: Duration,
) {
    loop {
        if matches!(
            *state_rx.borrow(),
            SessionState::Closing | SessionState::Closed
        ) {
            return;
        }

        let samples = {
            let parts = runtime.teardown_parts.lock().ok();
            match parts {
                Some(mut guard) => match guard.as_mut() {
                    Some(parts) => parts.source.read_samples(),
                    None => return, // teardown already claimed the source
                },
                None => return,
            }
        };

        match samples {
            Ok(samples) if !samples.is_empty() => {
                let mut bytes = Vec::with_capacity(samples.len() * 2);
                for sample in &samples {
                    bytes.extend_from_slice(&sample.to_le_bytes());
                }
                if let Err(e) = runtime.encoder_in.lock().await.write(&bytes).await {
                    if runtime.state() == SessionState::Open
                        || runtime.state() == SessionState::Connecting
                    {
                        tracing::error!(error = %e, "encoder rejected input");
                        runtime.teardown("encoder failed").await;
                    }
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "capture read failed");
                runtime.teardown("capture failed").await;
                return;
            }
        }

        tokio::time::sleep(poll).await;
    }
}

/// Forwards encoder output chunks to the outbound channel, in order.
async fn encode_pump(
    runtime: Arc<SessionRuntime>,
    mut encoder_out: Box<dyn crate::transform::TransformOutput>,
    outbound_tx: mpsc::Sender<Vec<u8>>,
) {
    while let Some(chunk) = encoder_out.read_chunk().await {
        match chunk {
            Ok(chunk) => {
                if outbound_tx.send(chunk).await.is_err() {
                    return; // send pump is gone, session is ending
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "encoder output failed");
                runtime.teardown("encoder failed").await;
                return;
            }
        }
    }
    // Output closed. Normal during teardown; fatal while live.
    if runtime.state() == SessionState::Open {
        runtime.teardown("encoder exited").await;
    }
}

/// Transmits outbound audio once the session is protocol-open.
///
/// Chunks produced before the handshake wait in the bounded channel; nothing
/// is sent while `Connecting`.
async fn send_pump(
    runtime: Arc<SessionRuntime>,
    mut state_rx: watch::Receiver<SessionState>,
    mut outbound_rx: mpsc::Receiver<Vec<u8>>,
) {
    let opened = state_rx
        .wait_for(|state| {
            matches!(
                state,
                SessionState::Open | SessionState::Closing | SessionState::Closed
            )
        })
        .await
        .map(|state| *state);
    match opened {
        Ok(state) if state == SessionState::Open => {}
        _ => return, // closed before the handshake ever arrived
    }

    while let Some(chunk) = outbound_rx.recv().await {
        let payload = WireMessage::Audio(chunk).encode();
        if let Err(e) = runtime.transport_sink.lock().await.send(payload).await {
            if runtime.state() == SessionState::Open {
                tracing::error!(error = %e, "transmit failed");
                runtime.teardown("transport send failed").await;
            }
            return;
        }
    }
}

/// Receives wire messages and dispatches them by tag.
async fn receive_pump(
    runtime: Arc<SessionRuntime>,
    mut stream: Box<dyn TransportStream>,
    mut text_sink: Box<dyn TextSink>,
) {
    while let Some(received) = stream.next_message().await {
        let buffer = match received {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::error!(error = %e, "transport receive failed");
                runtime.teardown("transport receive failed").await;
                return;
            }
        };

        match WireMessage::decode(&buffer) {
            Ok(message) => {
                runtime.liveness.touch();
                match message {
                    WireMessage::Handshake => runtime.protocol_open(),
                    WireMessage::Text(chunk) => {
                        if let Err(e) = text_sink.handle(&chunk) {
                            tracing::warn!(error = %e, "text sink failed");
                        }
                    }
                    WireMessage::Audio(bytes) => {
                        if let Err(e) = runtime.decoder_in.lock().await.write(&bytes).await {
                            tracing::error!(error = %e, "decoder rejected input");
                            runtime.teardown("decoder failed").await;
                            return;
                        }
                    }
                }
            }
            // A malformed message is dropped; the session carries on
            Err(e) => tracing::warn!(error = %e, len = buffer.len(), "dropping malformed message"),
        }
    }

    // Peer closed the connection
    runtime.teardown("connection closed by peer").await;
}

/// Reassembles decoder output into frames and queues them for playback.
async fn decode_pump(
    runtime: Arc<SessionRuntime>,
    mut decoder_out: Box<dyn crate::transform::TransformOutput>,
    queue: Arc<Mutex<PlaybackQueue>>,
    archive_slot: Arc<Mutex<Option<PcmArchive>>>,
) {
    let mut reassembler = FrameReassembler::new();

    while let Some(chunk) = decoder_out.read_chunk().await {
        match chunk {
            Ok(chunk) => {
                if let Ok(mut guard) = archive_slot.lock()
                    && let Some(archive) = guard.as_mut()
                {
                    archive.append(&chunk);
                }
                let frames = reassembler.feed(&chunk);
                if frames.is_empty() {
                    continue;
                }
                if let Ok(mut queue) = queue.lock() {
                    for frame in frames {
                        queue.enqueue(frame);
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "decoder output failed");
                runtime.teardown("decoder failed").await;
                return;
            }
        }
    }
    if runtime.state() == SessionState::Open {
        runtime.teardown("decoder exited").await;
    }
}

/// Forces teardown when inbound messages stop while the session is open.
///
/// Only a successfully decoded message resets the clock; the watchdog itself
/// never touches it. Polling stops as soon as the session leaves `Open`.
async fn watchdog(
    runtime: Arc<SessionRuntime>,
    state_rx: watch::Receiver<SessionState>,
    poll: Duration,
    threshold: Duration,
) {
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let state = *state_rx.borrow();
        match state {
            SessionState::Idle | SessionState::Connecting => {}
            SessionState::Open => {
                if let Some(elapsed) = runtime.liveness.staleness(threshold) {
                    let elapsed_ms = elapsed.as_millis() as u64;
                    tracing::warn!(
                        "{}",
                        VoxlinkError::StaleConnection { elapsed_ms }
                    );
                    runtime.teardown("stale connection").await;
                    return;
                }
            }
            SessionState::Closing | SessionState::Closed => return,
        }
    }
}
