//! Channel session state machine.

use std::time::Duration;

use url::Url;

use crate::fetch::UrlError;

/// Connection state of the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
    /// Waiting out the reconnect delay.
    Closed,
}

/// One channel's state and counters. There is no terminal state: every
/// close is followed by a reconnect after `delay`.
#[derive(Debug, Clone)]
pub struct ChannelSession {
    state: ChannelState,
    delay: Duration,
    attempts: u64,
    closes: u64,
}

impl ChannelSession {
    pub fn new(delay: Duration) -> Self {
        Self { state: ChannelState::Disconnected, delay, attempts: 0, closes: 0 }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Connection attempts so far, the first included.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Reconnection attempts, i.e. attempts after the first.
    pub fn reconnects(&self) -> u64 {
        self.attempts.saturating_sub(1)
    }

    pub fn closes(&self) -> u64 {
        self.closes
    }

    pub fn connecting(&mut self) {
        self.attempts += 1;
        self.state = ChannelState::Connecting;
    }

    pub fn opened(&mut self) {
        self.state = ChannelState::Open;
    }

    /// Record a close and return how long to wait before reconnecting.
    pub fn closed(&mut self) -> Duration {
        self.closes += 1;
        self.state = ChannelState::Closed;
        self.delay
    }
}

/// WebSocket endpoint for `origin`: `wss://` for https origins, `ws://`
/// otherwise, path `/ws`, token in the query.
pub fn channel_url(origin: &Url, token: &str) -> Result<Url, UrlError> {
    let scheme = match origin.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(UrlError::UnsupportedScheme(other.to_string())),
    };
    let host = origin.host_str().ok_or_else(|| UrlError::InvalidUrl(format!("{origin} has no host")))?;
    let authority = match origin.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let mut url = Url::parse(&format!("{scheme}://{authority}/ws")).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}
