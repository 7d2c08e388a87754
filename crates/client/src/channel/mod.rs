//! Live channel manager.
//!
//! One task owns the session, the transport and the reconnect timer:
//!
//! ```text
//! disconnected -> connecting -> open -> closed -(delay)-> connecting -> ...
//! ```
//!
//! A failed connect counts as a close. Every close schedules a reconnect
//! after the fixed delay, forever. The task publishes its state on a watch
//! channel and reports frames and send failures as [`ChannelEvent`]s.

pub mod frame;
pub mod session;
pub mod transport;

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

pub use frame::{ChannelAction, FrameError, InboundFrame, OutboundFrame, dispatch};
pub use session::{ChannelSession, ChannelState, channel_url};
pub use transport::{Connector, Transport, WsConnector, WsTransport};

/// What the channel reports to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    StateChanged(ChannelState),
    Action(ChannelAction),
    /// An outbound frame could not be written.
    SendFailed(String),
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: Url,
    /// Current user, for tagging own messages.
    pub username: String,
    pub reconnect_delay: Duration,
}

/// Handle to a running channel task.
pub struct ChannelHandle {
    state: watch::Receiver<ChannelState>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Queue a chat message. Only accepted while the channel is open;
    /// otherwise nothing is written and `false` is returned.
    pub fn send(&self, content: &str) -> bool {
        if self.state() != ChannelState::Open {
            tracing::debug!("channel not open, message not sent");
            return false;
        }
        self.outbound.send(OutboundFrame::message(content, Utc::now())).is_ok()
    }

    /// Stop the channel task.
    pub fn close(self) {
        self.task.abort();
    }
}

/// Start the channel task.
///
/// The task runs until the handle is closed or `events` has no receiver.
pub fn spawn<C>(connector: C, config: ChannelConfig, events: mpsc::UnboundedSender<ChannelEvent>) -> ChannelHandle
where
    C: Connector + 'static,
{
    let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(connector, config, state_tx, outbound_rx, events));
    ChannelHandle { state: state_rx, outbound: outbound_tx, task }
}

struct Channel {
    config: ChannelConfig,
    session: ChannelSession,
    state: watch::Sender<ChannelState>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl Channel {
    fn publish(&self) {
        let state = self.session.state();
        self.state.send_replace(state);
        self.emit(ChannelEvent::StateChanged(state));
    }

    fn emit(&self, event: ChannelEvent) {
        // A closed receiver is picked up at the top of the loop.
        let _ = self.events.send(event);
    }

    fn handle_text(&self, text: &str) {
        match InboundFrame::parse(text) {
            Ok(frame) => self.emit(ChannelEvent::Action(dispatch(frame, &self.config.username))),
            Err(e) => tracing::warn!("dropping inbound frame: {e}"),
        }
    }

    async fn serve<T: Transport>(&self, transport: &mut T, outbound: &mut mpsc::UnboundedReceiver<OutboundFrame>) {
        loop {
            tokio::select! {
                incoming = transport.recv() => match incoming {
                    Some(text) => self.handle_text(&text),
                    None => return,
                },
                Some(frame) = outbound.recv() => {
                    let text = match frame.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!("could not encode outbound frame: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = transport.send(text).await {
                        tracing::warn!("send failed: {e}");
                        self.emit(ChannelEvent::SendFailed(e.to_string()));
                    }
                }
            }
        }
    }
}

async fn run<C: Connector>(
    connector: C, config: ChannelConfig, state: watch::Sender<ChannelState>,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>, events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let delay = config.reconnect_delay;
    let mut channel = Channel { config, session: ChannelSession::new(delay), state, events };

    while !channel.events.is_closed() {
        channel.session.connecting();
        channel.publish();

        match connector.connect(&channel.config.url).await {
            Ok(mut transport) => {
                channel.session.opened();
                channel.publish();
                tracing::info!(
                    attempt = channel.session.attempts(),
                    reconnects = channel.session.reconnects(),
                    "channel open"
                );
                channel.emit(ChannelEvent::Action(ChannelAction::ReloadMessages));
                channel.serve(&mut transport, &mut outbound).await;
            }
            Err(e) => tracing::warn!(attempt = channel.session.attempts(), "channel connect failed: {e}"),
        }

        let delay = channel.session.closed();
        channel.publish();

        // Frames queued just before the close never reached the wire.
        while outbound.try_recv().is_ok() {
            channel.emit(ChannelEvent::SendFailed("channel closed".into()));
        }

        tracing::info!(
            closes = channel.session.closes(),
            reconnect_in_ms = delay.as_millis() as u64,
            "channel closed, reconnecting"
        );
        tokio::time::sleep(delay).await;
    }
    tracing::debug!("channel listener gone, stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    struct FakeTransport {
        inbound: mpsc::UnboundedReceiver<String>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn recv(&mut self) -> Option<String> {
            self.inbound.recv().await
        }

        async fn send(&mut self, text: String) -> Result<(), ClientError> {
            self.sent.lock().unwrap().push(text);
            Ok(())
        }
    }

    /// Hands out scripted transports, then transports that close at once
    /// (or refuses, if `refuse` is set).
    #[derive(Default)]
    struct FakeConnector {
        scripted: Mutex<VecDeque<FakeTransport>>,
        refuse: bool,
        connects: Arc<Mutex<Vec<Instant>>>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl FakeConnector {
        /// Script one transport; returns the sender that feeds it.
        fn script(&self) -> mpsc::UnboundedSender<String> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.scripted.lock().unwrap().push_back(FakeTransport { inbound: rx, sent: Arc::clone(&self.sent) });
            tx
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Transport = FakeTransport;

        async fn connect(&self, _url: &Url) -> Result<FakeTransport, ClientError> {
            self.connects.lock().unwrap().push(Instant::now());
            if let Some(transport) = self.scripted.lock().unwrap().pop_front() {
                return Ok(transport);
            }
            if self.refuse {
                return Err(ClientError::Channel("connection refused".into()));
            }
            let (_, inbound) = mpsc::unbounded_channel();
            Ok(FakeTransport { inbound, sent: Arc::clone(&self.sent) })
        }
    }

    fn config() -> ChannelConfig {
        ChannelConfig {
            url: Url::parse("wss://chat.example.com/ws?token=t").unwrap(),
            username: "alice".into(),
            reconnect_delay: Duration::from_secs(3),
        }
    }

    async fn next_action(events: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelAction {
        loop {
            match events.recv().await.unwrap() {
                ChannelEvent::Action(action) => return action,
                ChannelEvent::StateChanged(_) => {}
                ChannelEvent::SendFailed(reason) => panic!("unexpected send failure: {reason}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_close_is_followed_by_one_delayed_reconnect() {
        for refuse in [false, true] {
            let connector = FakeConnector { refuse, ..FakeConnector::default() };
            let connects = Arc::clone(&connector.connects);
            let (events_tx, _events_rx) = mpsc::unbounded_channel();
            let start = Instant::now();

            let handle = spawn(connector, config(), events_tx);
            tokio::time::sleep(Duration::from_millis(10_500)).await;
            handle.close();

            // Attempts at 0s, 3s, 6s, 9s: three closes, three reconnects, a
            // fourth close waiting out its delay.
            let connects = connects.lock().unwrap().clone();
            assert_eq!(connects.len(), 4, "refuse={refuse}");
            assert!(connects[0] - start < Duration::from_millis(1));
            for pair in connects.windows(2) {
                assert!(pair[1] - pair[0] >= Duration::from_secs(3));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_reloads_messages_then_dispatches_frames() {
        let connector = FakeConnector::default();
        let inbound = connector.script();
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let handle = spawn(connector, config(), events_tx);

        assert_eq!(next_action(&mut events).await, ChannelAction::ReloadMessages);
        assert_eq!(handle.state(), ChannelState::Open);

        inbound.send("{not json".into()).unwrap();
        inbound.send(r#"{"type":"mystery"}"#.into()).unwrap();
        inbound.send(r#"{"type":"online_count","count":7}"#.into()).unwrap();
        assert_eq!(next_action(&mut events).await, ChannelAction::SetOnlineCount(7));

        inbound.send(r#"{"type":"new_message","sender":"alice","content":"hi","timestamp":1234}"#.into()).unwrap();
        assert!(matches!(next_action(&mut events).await, ChannelAction::AppendMessage { own: true, .. }));

        inbound.send(r#"{"type":"new_message","sender":"bob","content":"yo","timestamp":1235}"#.into()).unwrap();
        assert!(matches!(next_action(&mut events).await, ChannelAction::AppendMessage { own: false, .. }));

        // Closing the transport reconnects, and the reconnect reloads again.
        drop(inbound);
        assert_eq!(next_action(&mut events).await, ChannelAction::ReloadMessages);
        handle.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_only_while_open() {
        let connector = FakeConnector { refuse: true, ..FakeConnector::default() };
        let sent = Arc::clone(&connector.sent);
        let (events_tx, _events) = mpsc::unbounded_channel();
        let handle = spawn(connector, config(), events_tx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.state(), ChannelState::Closed);
        assert!(!handle.send("hello"));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(sent.lock().unwrap().is_empty());
        handle.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_open_writes_message_frame() {
        let connector = FakeConnector::default();
        let sent = Arc::clone(&connector.sent);
        let _inbound = connector.script();
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let handle = spawn(connector, config(), events_tx);

        next_action(&mut events).await;
        assert!(handle.send("hello"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let sent = sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["content"], "hello");
        assert!(value["timestamp"].is_i64());
        handle.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_listener_dropped() {
        let connector = FakeConnector::default();
        let connects = Arc::clone(&connector.connects);
        let (events_tx, events) = mpsc::unbounded_channel();
        let handle = spawn(connector, config(), events_tx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(events);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(handle.task.is_finished());
        assert_eq!(connects.lock().unwrap().len(), 1);
    }
}
