//! Duplex audio bridge between a transport client and a live session.
//!
//! One `ConnectionBridge` exists per client connection. It owns the
//! per-connection resampler pair and frame accumulator, drives the session
//! lifecycle, and converts between the transport's 8 kHz PCM world and the
//! session's 16 kHz input / 24 kHz output world:
//!
//! - client audio: 8 kHz PCM16 -> upsample to 16 kHz -> session
//! - session audio: 24 kHz PCM16 -> downsample to 8 kHz -> 320-byte frames
//!   -> transport, in order
//!
//! Session callbacks feed a `SessionEvent` channel; the transport handler
//! drives the bridge by passing those events to `handle_session_event`
//! alongside inbound client audio.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::audio::frame::FrameAccumulator;
use crate::audio::resampler::StreamResampler;
use crate::audio::{
    self, CLIENT_SAMPLE_RATE, LIVE_INPUT_MIME, LIVE_INPUT_SAMPLE_RATE, LIVE_OUTPUT_SAMPLE_RATE,
};
use crate::core::live::base::{
    BoxedLiveSession, LiveError, LiveResult, LiveSessionConfig, SessionErrorCallback,
    ToolCallRequest,
};
use crate::tools::ToolRegistry;

/// Text turn injected once the session reports ready, prompting the model
/// to speak first.
pub const CONVERSATION_NUDGE: &str = "Please start the conversation.";

/// Capacity of the session event and transport event channels.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates live sessions; injectable so tests can substitute a mock.
pub type SessionFactory =
    Arc<dyn Fn(LiveSessionConfig) -> LiveResult<BoxedLiveSession> + Send + Sync>;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Waiting for the client's init message
    AwaitingInit,
    /// Session connect in flight, not yet ready for audio
    SessionOpening,
    /// Session ready, audio flows in both directions
    Active,
    /// Teardown in progress
    Closing,
    /// Terminal
    Closed,
}

/// Events the bridge emits toward the transport handler.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One canonical 320-byte 8 kHz PCM16 frame of session audio
    Frame(Bytes),
    /// The session interrupted its output; the client should flush playback
    Interruption,
    /// A terminal error description
    Error(String),
    /// The connection is finished; no further events follow
    Close,
}

/// Events flowing from the live session's callbacks into the bridge.
#[derive(Debug)]
pub enum SessionEvent {
    /// Session completed setup and accepts audio
    Opened,
    /// Raw 24 kHz PCM16 audio from the session
    Audio(Bytes),
    /// A batch of tool calls to dispatch and answer
    ToolCalls(Vec<ToolCallRequest>),
    /// The session interrupted its own output
    Interrupted,
    /// Session-level error; terminal for this connection
    Error(String),
    /// The session closed, with an optional reason
    Closed(Option<String>),
}

/// Per-connection duplex bridge.
pub struct ConnectionBridge {
    session_id: String,
    state: BridgeState,
    session: Option<BoxedLiveSession>,
    factory: SessionFactory,
    tools: Arc<ToolRegistry>,

    /// Client 8 kHz -> session 16 kHz
    upsampler: StreamResampler,
    /// Session 24 kHz -> client 8 kHz
    downsampler: StreamResampler,
    /// Frames downsampled session audio into canonical frames
    frames: FrameAccumulator,
    /// Trailing odd byte of inbound client audio, carried to the next chunk
    inbound_carry: Option<u8>,

    transport_tx: mpsc::Sender<TransportEvent>,
    event_tx: mpsc::Sender<SessionEvent>,
}

impl ConnectionBridge {
    /// Create a bridge in `AwaitingInit`. Returns the bridge and the
    /// receiver for session events the transport loop must feed back in.
    pub fn new(
        session_id: String,
        factory: SessionFactory,
        tools: Arc<ToolRegistry>,
        transport_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), audio::resampler::AudioError> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let bridge = Self {
            session_id,
            state: BridgeState::AwaitingInit,
            session: None,
            factory,
            tools,
            upsampler: StreamResampler::new(CLIENT_SAMPLE_RATE, LIVE_INPUT_SAMPLE_RATE)?,
            downsampler: StreamResampler::new(LIVE_OUTPUT_SAMPLE_RATE, CLIENT_SAMPLE_RATE)?,
            frames: FrameAccumulator::default(),
            inbound_carry: None,
            transport_tx,
            event_tx,
        };

        Ok((bridge, event_rx))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Open the live session. Valid only in `AwaitingInit`; a failure tears
    /// the connection down.
    pub async fn open(&mut self, config: LiveSessionConfig) {
        if self.state != BridgeState::AwaitingInit {
            tracing::warn!(
                session_id = %self.session_id,
                state = ?self.state,
                "Ignoring duplicate session open"
            );
            return;
        }
        self.state = BridgeState::SessionOpening;

        let mut session = match (self.factory)(config) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(session_id = %self.session_id, "Failed to create session: {}", e);
                self.fail(e.to_string()).await;
                return;
            }
        };

        self.wire_callbacks(&mut session);

        if let Err(e) = session.connect().await {
            tracing::error!(session_id = %self.session_id, "Session connect failed: {}", e);
            self.fail(e.to_string()).await;
            return;
        }

        tracing::info!(session_id = %self.session_id, "Live session opening");
        self.session = Some(session);
    }

    /// Forward callbacks into the session event channel.
    fn wire_callbacks(&self, session: &mut BoxedLiveSession) {
        let tx = self.event_tx.clone();
        session.on_open(Arc::new(move || {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(SessionEvent::Opened).await;
            })
        }));

        let tx = self.event_tx.clone();
        session.on_audio(Arc::new(move |audio| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(SessionEvent::Audio(audio)).await;
            })
        }));

        let tx = self.event_tx.clone();
        session.on_tool_call(Arc::new(move |requests| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(SessionEvent::ToolCalls(requests)).await;
            })
        }));

        let tx = self.event_tx.clone();
        session.on_interrupted(Arc::new(move || {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(SessionEvent::Interrupted).await;
            })
        }));

        let tx = self.event_tx.clone();
        let error_cb: SessionErrorCallback = Arc::new(move |err: LiveError| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(SessionEvent::Error(err.to_string())).await;
            })
        });
        session.on_error(error_cb);

        let tx = self.event_tx.clone();
        session.on_closed(Arc::new(move |reason| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(SessionEvent::Closed(reason)).await;
            })
        }));
    }

    /// Handle raw PCM16LE client audio bytes.
    ///
    /// Audio received before the session is active is dropped. A trailing
    /// odd byte is carried over and prepended to the next chunk.
    pub async fn handle_client_audio(&mut self, data: &[u8]) {
        if self.state != BridgeState::Active {
            tracing::trace!(
                session_id = %self.session_id,
                state = ?self.state,
                "Dropping client audio outside active state"
            );
            return;
        }

        let mut buf;
        let mut bytes = data;
        if let Some(carry) = self.inbound_carry.take() {
            buf = Vec::with_capacity(data.len() + 1);
            buf.push(carry);
            buf.extend_from_slice(data);
            bytes = &buf;
        }
        if bytes.len() % 2 != 0 {
            self.inbound_carry = Some(bytes[bytes.len() - 1]);
            bytes = &bytes[..bytes.len() - 1];
        }
        if bytes.is_empty() {
            return;
        }

        let samples = audio::samples_from_le_bytes(bytes);
        let upsampled = match self.upsampler.convert(&samples) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::error!(session_id = %self.session_id, "Upsampling failed: {}", e);
                self.fail(e.to_string()).await;
                return;
            }
        };
        if upsampled.is_empty() {
            return;
        }

        let payload = Bytes::from(audio::samples_to_le_bytes(&upsampled));
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.send_audio(payload, LIVE_INPUT_MIME).await {
                tracing::error!(session_id = %self.session_id, "Failed to forward audio: {}", e);
                self.fail(e.to_string()).await;
            }
        }
    }

    /// Handle one event from the live session.
    pub async fn handle_session_event(&mut self, event: SessionEvent) {
        if self.state == BridgeState::Closed {
            return;
        }

        match event {
            SessionEvent::Opened => self.handle_opened().await,
            SessionEvent::Audio(audio) => self.handle_session_audio(audio).await,
            SessionEvent::ToolCalls(requests) => self.handle_tool_calls(requests).await,
            SessionEvent::Interrupted => self.handle_interrupted().await,
            SessionEvent::Error(message) => {
                tracing::error!(session_id = %self.session_id, "Session error: {}", message);
                self.fail(message).await;
            }
            SessionEvent::Closed(reason) => {
                tracing::info!(
                    session_id = %self.session_id,
                    reason = ?reason,
                    "Session closed"
                );
                self.shutdown().await;
            }
        }
    }

    async fn handle_opened(&mut self) {
        if self.state != BridgeState::SessionOpening {
            return;
        }
        self.state = BridgeState::Active;
        tracing::info!(session_id = %self.session_id, "Session active");

        // Prompt the model to take the first turn
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.send_text(CONVERSATION_NUDGE).await {
                tracing::warn!(session_id = %self.session_id, "Failed to send opening turn: {}", e);
            }
        }
    }

    async fn handle_session_audio(&mut self, audio: Bytes) {
        if self.state != BridgeState::Active {
            return;
        }

        let samples = audio::samples_from_le_bytes(&audio);
        let downsampled = match self.downsampler.convert(&samples) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::error!(session_id = %self.session_id, "Downsampling failed: {}", e);
                self.fail(e.to_string()).await;
                return;
            }
        };

        for frame in self.frames.push(&downsampled) {
            if self.transport_tx.send(TransportEvent::Frame(frame)).await.is_err() {
                // Transport is gone; tear down quietly
                self.shutdown().await;
                return;
            }
        }
    }

    async fn handle_tool_calls(&mut self, requests: Vec<ToolCallRequest>) {
        if requests.is_empty() {
            return;
        }
        let results = self.tools.dispatch(&self.session_id, requests).await;

        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.send_tool_results(results).await {
                tracing::error!(session_id = %self.session_id, "Failed to send tool results: {}", e);
                self.fail(e.to_string()).await;
            }
        }
    }

    /// Discard buffered session audio so stale output never reaches the
    /// client after an interruption, then signal the transport.
    async fn handle_interrupted(&mut self) {
        if self.state != BridgeState::Active {
            return;
        }
        tracing::debug!(session_id = %self.session_id, "Session interrupted, flushing output");
        self.frames.reset();
        self.downsampler.reset();
        let _ = self.transport_tx.send(TransportEvent::Interruption).await;
    }

    /// Report a terminal error to the transport and tear down.
    async fn fail(&mut self, message: String) {
        if self.state == BridgeState::Closed || self.state == BridgeState::Closing {
            return;
        }
        let _ = self.transport_tx.send(TransportEvent::Error(message)).await;
        self.shutdown().await;
    }

    /// Tear the connection down. Idempotent: later calls are no-ops, and the
    /// transport receives exactly one `Close`.
    pub async fn shutdown(&mut self) {
        if self.state == BridgeState::Closed || self.state == BridgeState::Closing {
            return;
        }
        self.state = BridgeState::Closing;
        tracing::info!(session_id = %self.session_id, "Closing connection");

        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::warn!(session_id = %self.session_id, "Session close failed: {}", e);
            }
        }

        self.state = BridgeState::Closed;
        let _ = self.transport_tx.send(TransportEvent::Close).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::core::live::base::{
        AudioChunkCallback, BaseLiveSession, ClosedCallback, InterruptedCallback, OpenCallback,
        ToolCallCallback, ToolCallResult,
    };

    #[derive(Default)]
    struct MockLog {
        audio: Mutex<Vec<(Bytes, String)>>,
        texts: Mutex<Vec<String>>,
        tool_results: Mutex<Vec<Vec<ToolCallResult>>>,
        close_calls: Mutex<usize>,
    }

    struct MockLiveSession {
        log: Arc<MockLog>,
        connect_ok: bool,
        connected: AtomicBool,
    }

    #[async_trait]
    impl BaseLiveSession for MockLiveSession {
        async fn connect(&mut self) -> LiveResult<()> {
            if self.connect_ok {
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            } else {
                Err(LiveError::ConnectionFailed("refused".to_string()))
            }
        }

        async fn close(&mut self) -> LiveResult<()> {
            self.connected.store(false, Ordering::SeqCst);
            *self.log.close_calls.lock() += 1;
            Ok(())
        }

        fn is_ready(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn send_audio(&mut self, audio: Bytes, mime: &str) -> LiveResult<()> {
            self.log.audio.lock().push((audio, mime.to_string()));
            Ok(())
        }

        async fn send_text(&mut self, text: &str) -> LiveResult<()> {
            self.log.texts.lock().push(text.to_string());
            Ok(())
        }

        async fn send_tool_results(&mut self, results: Vec<ToolCallResult>) -> LiveResult<()> {
            self.log.tool_results.lock().push(results);
            Ok(())
        }

        fn on_open(&mut self, _callback: OpenCallback) {}
        fn on_audio(&mut self, _callback: AudioChunkCallback) {}
        fn on_tool_call(&mut self, _callback: ToolCallCallback) {}
        fn on_interrupted(&mut self, _callback: InterruptedCallback) {}
        fn on_error(&mut self, _callback: crate::core::live::base::SessionErrorCallback) {}
        fn on_closed(&mut self, _callback: ClosedCallback) {}
    }

    fn mock_factory(log: Arc<MockLog>, connect_ok: bool) -> SessionFactory {
        Arc::new(move |_config| {
            Ok(Box::new(MockLiveSession {
                log: log.clone(),
                connect_ok,
                connected: AtomicBool::new(false),
            }) as BoxedLiveSession)
        })
    }

    async fn active_bridge(
        log: Arc<MockLog>,
    ) -> (ConnectionBridge, mpsc::Receiver<TransportEvent>) {
        let (transport_tx, transport_rx) = mpsc::channel(64);
        let (mut bridge, _event_rx) = ConnectionBridge::new(
            "test-session".to_string(),
            mock_factory(log, true),
            Arc::new(ToolRegistry::new()),
            transport_tx,
        )
        .unwrap();
        bridge.open(LiveSessionConfig::default()).await;
        bridge.handle_session_event(SessionEvent::Opened).await;
        assert_eq!(bridge.state(), BridgeState::Active);
        (bridge, transport_rx)
    }

    fn pcm_bytes(samples: usize) -> Vec<u8> {
        audio::samples_to_le_bytes(&vec![100i16; samples])
    }

    #[tokio::test]
    async fn test_connect_failure_reports_error_then_close() {
        let log = Arc::new(MockLog::default());
        let (transport_tx, mut transport_rx) = mpsc::channel(64);
        let (mut bridge, _event_rx) = ConnectionBridge::new(
            "test-session".to_string(),
            mock_factory(log.clone(), false),
            Arc::new(ToolRegistry::new()),
            transport_tx,
        )
        .unwrap();

        bridge.open(LiveSessionConfig::default()).await;

        assert_eq!(bridge.state(), BridgeState::Closed);
        assert!(matches!(
            transport_rx.recv().await,
            Some(TransportEvent::Error(_))
        ));
        assert_eq!(transport_rx.recv().await, Some(TransportEvent::Close));

        // Audio arriving after the failed open is never forwarded
        bridge.handle_client_audio(&pcm_bytes(160)).await;
        assert!(log.audio.lock().is_empty());
        assert!(transport_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_opened_sends_conversation_nudge() {
        let log = Arc::new(MockLog::default());
        let (_bridge, _rx) = active_bridge(log.clone()).await;
        assert_eq!(log.texts.lock().as_slice(), [CONVERSATION_NUDGE]);
    }

    #[tokio::test]
    async fn test_client_audio_is_upsampled_and_forwarded() {
        let log = Arc::new(MockLog::default());
        let (mut bridge, _rx) = active_bridge(log.clone()).await;

        // One 20 ms client frame: 160 samples at 8 kHz -> 320 at 16 kHz
        bridge.handle_client_audio(&pcm_bytes(160)).await;

        let sent = log.audio.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.len(), 640);
        assert_eq!(sent[0].1, LIVE_INPUT_MIME);
    }

    #[tokio::test]
    async fn test_audio_before_active_is_dropped() {
        let log = Arc::new(MockLog::default());
        let (transport_tx, _transport_rx) = mpsc::channel(64);
        let (mut bridge, _event_rx) = ConnectionBridge::new(
            "test-session".to_string(),
            mock_factory(log.clone(), true),
            Arc::new(ToolRegistry::new()),
            transport_tx,
        )
        .unwrap();

        bridge.handle_client_audio(&pcm_bytes(160)).await;
        bridge.open(LiveSessionConfig::default()).await;
        bridge.handle_client_audio(&pcm_bytes(160)).await;

        assert!(log.audio.lock().is_empty());
    }

    #[tokio::test]
    async fn test_odd_byte_is_carried_to_next_chunk() {
        let log = Arc::new(MockLog::default());
        let (mut bridge, _rx) = active_bridge(log.clone()).await;

        // 200 samples split at an odd byte offset: the first call carries
        // one full 160-sample chunk through, the rest stays staged
        let full = pcm_bytes(200);
        bridge.handle_client_audio(&full[..321]).await;
        bridge.handle_client_audio(&full[321..]).await;

        let sent = log.audio.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.len(), 640);
    }

    #[tokio::test]
    async fn test_session_audio_is_framed_in_order() {
        let log = Arc::new(MockLog::default());
        let (mut bridge, mut rx) = active_bridge(log).await;

        // 960 samples at 24 kHz = two full resampler chunks -> 320 samples
        // at 8 kHz -> exactly two canonical frames
        let audio = Bytes::from(audio::samples_to_le_bytes(&vec![50i16; 960]));
        bridge.handle_session_event(SessionEvent::Audio(audio)).await;

        for _ in 0..2 {
            match rx.recv().await {
                Some(TransportEvent::Frame(frame)) => assert_eq!(frame.len(), 320),
                other => panic!("expected frame, got {:?}", other),
            }
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_interruption_flushes_and_signals() {
        let log = Arc::new(MockLog::default());
        let (mut bridge, mut rx) = active_bridge(log).await;

        // 480 samples -> one frame plus nothing pending downstream, then
        // 240 extra samples leave a partial chunk in the downsampler
        let audio = Bytes::from(audio::samples_to_le_bytes(&vec![25i16; 720]));
        bridge.handle_session_event(SessionEvent::Audio(audio)).await;
        assert!(matches!(rx.recv().await, Some(TransportEvent::Frame(_))));

        bridge.handle_session_event(SessionEvent::Interrupted).await;
        assert_eq!(rx.recv().await, Some(TransportEvent::Interruption));

        // Post-interruption audio starts clean: one full chunk, one frame
        let audio = Bytes::from(audio::samples_to_le_bytes(&vec![25i16; 480]));
        bridge.handle_session_event(SessionEvent::Audio(audio)).await;
        assert!(matches!(rx.recv().await, Some(TransportEvent::Frame(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tool_calls_answered_as_one_batch() {
        let log = Arc::new(MockLog::default());
        let (mut bridge, _rx) = active_bridge(log.clone()).await;

        let requests = vec![
            ToolCallRequest {
                id: "1".to_string(),
                name: "alpha".to_string(),
                args: serde_json::json!({}),
            },
            ToolCallRequest {
                id: "2".to_string(),
                name: "beta".to_string(),
                args: serde_json::json!({}),
            },
        ];
        bridge
            .handle_session_event(SessionEvent::ToolCalls(requests))
            .await;

        let batches = log.tool_results.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][0].id, "1");
        assert_eq!(batches[0][1].id, "2");
        assert_eq!(batches[0][0].result, crate::tools::FALLBACK_RESULT);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let log = Arc::new(MockLog::default());
        let (mut bridge, mut rx) = active_bridge(log.clone()).await;

        bridge.shutdown().await;
        bridge.shutdown().await;
        bridge.handle_session_event(SessionEvent::Closed(None)).await;

        assert_eq!(bridge.state(), BridgeState::Closed);
        assert_eq!(*log.close_calls.lock(), 1);
        assert_eq!(rx.recv().await, Some(TransportEvent::Close));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_session_error_tears_down() {
        let log = Arc::new(MockLog::default());
        let (mut bridge, mut rx) = active_bridge(log).await;

        bridge
            .handle_session_event(SessionEvent::Error("quota exceeded".to_string()))
            .await;

        assert_eq!(bridge.state(), BridgeState::Closed);
        match rx.recv().await {
            Some(TransportEvent::Error(msg)) => assert!(msg.contains("quota")),
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(rx.recv().await, Some(TransportEvent::Close));
    }
}
