//! Chat session: view, live channel and API wired together.
//!
//! Message and news reloads run as background tasks, so a reload that keeps
//! retrying while the backend is unreachable never blocks event handling.
//! Finished loads are applied by [`ChatClient::reloaded`].

use std::sync::Arc;

use techtalks_core::CacheStore;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::Instant;

use crate::ClientError;
use crate::api::{ApiClient, ChatMessage, NewsItem, Session};
use crate::channel::{ChannelEvent, ChannelHandle};
use crate::fetch::Network;
use crate::view::{ChatView, Followup};

enum Loaded {
    Messages(Result<Vec<ChatMessage>, ClientError>),
    News(Result<Vec<NewsItem>, ClientError>),
}

pub struct ChatClient<S, N> {
    api: Arc<ApiClient<S, N>>,
    session: Session,
    channel: ChannelHandle,
    view: ChatView,
    /// Dropping the set aborts reloads still in flight.
    loads: JoinSet<()>,
    messages_load: Option<AbortHandle>,
    news_load: Option<AbortHandle>,
    loaded_tx: mpsc::UnboundedSender<Loaded>,
    loaded_rx: mpsc::UnboundedReceiver<Loaded>,
}

impl<S, N> ChatClient<S, N> {
    pub fn new(api: Arc<ApiClient<S, N>>, session: Session, channel: ChannelHandle) -> Self {
        let (loaded_tx, loaded_rx) = mpsc::unbounded_channel();
        Self {
            api,
            session,
            channel,
            view: ChatView::new(),
            loads: JoinSet::new(),
            messages_load: None,
            news_load: None,
            loaded_tx,
            loaded_rx,
        }
    }

    pub fn view(&self) -> &ChatView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ChatView {
        &mut self.view
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Wait for the next background reload and apply it to the view.
    ///
    /// Returns which list changed. Failed loads are logged and skipped.
    /// Cancel safe, so it can sit in a `select!` loop.
    pub async fn reloaded(&mut self) -> Option<Followup> {
        while let Some(loaded) = self.loaded_rx.recv().await {
            match loaded {
                Loaded::Messages(Ok(messages)) => {
                    self.view.replace_messages(messages, &self.session.username);
                    return Some(Followup::ReloadMessages);
                }
                Loaded::News(Ok(news)) => {
                    self.view.replace_news(news);
                    return Some(Followup::ReloadNews);
                }
                Loaded::Messages(Err(e)) => tracing::warn!("could not load messages: {e}"),
                Loaded::News(Err(e)) => tracing::warn!("could not load news: {e}"),
            }
        }
        None
    }

    /// Stop the live channel and any reload still running.
    pub fn close(mut self) {
        self.loads.abort_all();
        self.channel.close();
    }
}

impl<S, N> ChatClient<S, N>
where
    S: CacheStore + 'static,
    N: Network + 'static,
{
    /// Send whatever is in the composer.
    ///
    /// The composer is cleared first and is not restored if the message
    /// cannot be sent. Returns whether the message was queued; nothing is
    /// written unless the channel is open.
    pub fn submit(&mut self) -> bool {
        match self.view.take_input() {
            Some(content) => self.channel.send(&content),
            None => false,
        }
    }

    /// Start loading messages and news from scratch.
    pub fn refresh(&mut self) {
        self.reload(Followup::ReloadMessages);
        self.reload(Followup::ReloadNews);
    }

    pub fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::StateChanged(state) => tracing::debug!(?state, "channel state"),
            ChannelEvent::Action(action) => {
                if let Some(followup) = self.view.apply(action) {
                    self.reload(followup);
                }
            }
            ChannelEvent::SendFailed(reason) => {
                tracing::warn!("message not delivered: {reason}");
                self.view.push_notice("Message could not be sent", Instant::now());
            }
        }
    }

    /// Post a news item, then reload the news list in the background.
    /// Failures, local checks included, become notices.
    pub async fn post_news(&mut self, text: &str) -> Result<(), ClientError> {
        match self.api.add_news(&self.session, text).await {
            Ok(()) => {
                self.reload(Followup::ReloadNews);
                Ok(())
            }
            Err(e) => {
                self.view.push_notice(e.to_string(), Instant::now());
                Err(e)
            }
        }
    }

    /// Spawn a reload, replacing one of the same kind still in flight.
    fn reload(&mut self, followup: Followup) {
        while self.loads.try_join_next().is_some() {}

        let api = Arc::clone(&self.api);
        let token = self.session.token.clone();
        let tx = self.loaded_tx.clone();
        let (slot, handle) = match followup {
            Followup::ReloadMessages => (
                &mut self.messages_load,
                self.loads.spawn(async move {
                    let _ = tx.send(Loaded::Messages(api.load_messages(&token).await));
                }),
            ),
            Followup::ReloadNews => (
                &mut self.news_load,
                self.loads.spawn(async move {
                    let _ = tx.send(Loaded::News(api.load_news(&token).await));
                }),
            ),
        };
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelAction, ChannelConfig, ChannelState, Connector, Transport};
    use crate::testing::{ScriptedNetwork, generation, origin};
    use crate::worker::Interceptor;
    use async_trait::async_trait;
    use std::time::Duration;
    use techtalks_core::MemoryStore;
    use tokio::sync::{mpsc, watch};
    use url::Url;

    struct Refusing;

    struct NeverTransport;

    #[async_trait]
    impl Transport for NeverTransport {
        async fn recv(&mut self) -> Option<String> {
            None
        }

        async fn send(&mut self, _text: String) -> Result<(), ClientError> {
            Ok(())
        }
    }

    #[async_trait]
    impl Connector for Refusing {
        type Transport = NeverTransport;

        async fn connect(&self, _url: &Url) -> Result<NeverTransport, ClientError> {
            Err(ClientError::Channel("connection refused".into()))
        }
    }

    fn chat(network: &Arc<ScriptedNetwork>) -> ChatClient<MemoryStore, ScriptedNetwork> {
        chat_with_retries(network, Some(0))
    }

    fn chat_with_retries(network: &Arc<ScriptedNetwork>, limit: Option<u32>) -> ChatClient<MemoryStore, ScriptedNetwork> {
        let (_tx, rx) = watch::channel(generation());
        let interceptor = Interceptor::new(Arc::new(MemoryStore::new()), Arc::clone(network), rx, origin(), "/404.html");
        let api = Arc::new(ApiClient::new(Arc::new(interceptor), Duration::from_secs(2), limit));
        let session = Session { user_id: "1".into(), username: "alice".into(), token: "tok".into() };
        let config = ChannelConfig {
            url: Url::parse("wss://chat.example.com/ws?token=tok").unwrap(),
            username: "alice".into(),
            reconnect_delay: Duration::from_secs(3),
        };
        let (events, _) = mpsc::unbounded_channel();
        ChatClient::new(api, session, crate::channel::spawn(Refusing, config, events))
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_while_closed_clears_input_and_sends_nothing() {
        let network = Arc::new(ScriptedNetwork::new());
        let mut chat = chat(&network);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_ne!(chat.channel.state(), ChannelState::Open);

        chat.view_mut().set_input("hello");
        assert!(!chat.submit());
        assert_eq!(chat.view().input(), "");
        chat.close();
    }

    #[tokio::test]
    async fn test_reload_actions_fetch_from_api() {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/api/messages", 200, r#"{"messages":[{"sender":"alice","content":"a","timestamp":1}]}"#);
        network.respond("/api/news", 200, r#"{"news":[{"text":"n"}]}"#);
        let mut chat = chat(&network);

        chat.handle_event(ChannelEvent::Action(ChannelAction::ReloadMessages));
        assert_eq!(chat.reloaded().await, Some(Followup::ReloadMessages));
        assert!(chat.view().messages()[0].own);

        chat.handle_event(ChannelEvent::Action(ChannelAction::ReloadNews));
        assert_eq!(chat.reloaded().await, Some(Followup::ReloadNews));
        assert_eq!(chat.view().news()[0].text, "n");
        chat.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_reload_does_not_block_event_handling() {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/api/news", 200, r#"{"news":[{"text":"back"}]}"#);
        network.go_offline();
        let mut chat = chat_with_retries(&network, None);

        chat.handle_event(ChannelEvent::Action(ChannelAction::ReloadNews));
        chat.handle_event(ChannelEvent::Action(ChannelAction::SetOnlineCount(4)));
        assert_eq!(chat.view().online_count(), 4);

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(network.calls() > 1);
        assert!(chat.view().news().is_empty());

        network.go_online();
        let reloaded = tokio::time::timeout(Duration::from_secs(10), chat.reloaded()).await;
        assert_eq!(reloaded.unwrap(), Some(Followup::ReloadNews));
        assert_eq!(chat.view().news()[0].text, "back");
        chat.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_reload_replaces_one_in_flight() {
        let network = Arc::new(ScriptedNetwork::new());
        network.go_offline();
        let mut chat = chat_with_retries(&network, None);

        chat.handle_event(ChannelEvent::Action(ChannelAction::ReloadMessages));
        chat.handle_event(ChannelEvent::Action(ChannelAction::ReloadMessages));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(network.calls(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(network.calls(), 2);
        chat.close();
    }

    #[tokio::test]
    async fn test_failures_become_notices() {
        let network = Arc::new(ScriptedNetwork::new());
        let mut chat = chat(&network);

        chat.handle_event(ChannelEvent::SendFailed("broken pipe".into()));
        assert_eq!(chat.view().notices().len(), 1);

        assert!(chat.post_news("hi").await.is_err());
        assert_eq!(chat.view().notices().len(), 2);
        assert_eq!(network.calls(), 0);
        chat.close();
    }
}
