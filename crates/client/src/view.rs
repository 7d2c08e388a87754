//! Page state driven by the API and the live channel.

use std::mem;
use std::time::Duration;

use tokio::time::Instant;

use crate::api::{ChatMessage, NewsItem};
use crate::channel::ChannelAction;

/// How long a notice stays visible.
pub const NOTICE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    pub message: ChatMessage,
    pub own: bool,
}

/// A transient, user-visible notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub expires_at: Instant,
}

/// Work a channel action leaves for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Followup {
    ReloadMessages,
    ReloadNews,
}

#[derive(Debug, Default)]
pub struct ChatView {
    messages: Vec<DisplayMessage>,
    online_count: u64,
    news: Vec<NewsItem>,
    input: String,
    notices: Vec<Notice>,
}

impl ChatView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    pub fn online_count(&self) -> u64 {
        self.online_count
    }

    pub fn news(&self) -> &[NewsItem] {
        &self.news
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Clear the composer and return its trimmed content, if any.
    pub fn take_input(&mut self) -> Option<String> {
        let text = mem::take(&mut self.input);
        let text = text.trim();
        if text.is_empty() { None } else { Some(text.to_string()) }
    }

    pub fn replace_messages(&mut self, messages: Vec<ChatMessage>, username: &str) {
        self.messages = messages
            .into_iter()
            .map(|message| {
                let own = message.sender == username;
                DisplayMessage { message, own }
            })
            .collect();
    }

    pub fn append_message(&mut self, message: ChatMessage, own: bool) {
        self.messages.push(DisplayMessage { message, own });
    }

    pub fn set_online_count(&mut self, count: u64) {
        self.online_count = count;
    }

    pub fn replace_news(&mut self, news: Vec<NewsItem>) {
        self.news = news;
    }

    /// Apply a channel action; reloads are handed back to the caller.
    pub fn apply(&mut self, action: ChannelAction) -> Option<Followup> {
        match action {
            ChannelAction::AppendMessage { message, own } => {
                self.append_message(message, own);
                None
            }
            ChannelAction::SetOnlineCount(count) => {
                self.set_online_count(count);
                None
            }
            ChannelAction::ReloadNews => Some(Followup::ReloadNews),
            ChannelAction::ReloadMessages => Some(Followup::ReloadMessages),
        }
    }

    pub fn push_notice(&mut self, text: impl Into<String>, now: Instant) {
        self.notices.push(Notice { text: text.into(), expires_at: now + NOTICE_TTL });
    }

    /// Drop notices whose time is up. Returns how many were removed.
    pub fn expire_notices(&mut self, now: Instant) -> usize {
        let before = self.notices.len();
        self.notices.retain(|n| n.expires_at > now);
        before - self.notices.len()
    }
}
