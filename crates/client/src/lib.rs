//! Client side of techtalks.
//!
//! This crate provides the offline worker (lifecycle and fetch interceptor),
//! the live channel, the resource versioner and the chat API shared by the
//! CLI.

pub mod api;
pub mod channel;
pub mod chat;
pub mod error;
pub mod fetch;
pub mod versioner;
pub mod view;
pub mod worker;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, ChatMessage, NewsItem, Session};
pub use channel::{ChannelConfig, ChannelEvent, ChannelHandle, ChannelState, WsConnector};
pub use chat::ChatClient;
pub use error::ClientError;
pub use fetch::{FetchConfig, HttpNetwork, Network, Request, Response};
pub use versioner::{HtmlFile, ResourceVersioner};
pub use view::ChatView;
pub use worker::{Interceptor, LocalHost, Worker, WorkerState};
