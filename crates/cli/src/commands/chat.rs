//! Interactive chat over the live channel.
//!
//! Lines typed on stdin go to the composer. `/news <text>` posts news,
//! `/skipWaiting` is handed to the worker as a control message and `/quit`
//! leaves.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use techtalks_client::api::Session;
use techtalks_client::channel::{self, ChannelAction, ChannelConfig, ChannelEvent, channel_url};
use techtalks_client::fetch::Network;
use techtalks_client::view::Followup;
use techtalks_client::{ApiClient, ChatClient, WsConnector};
use techtalks_core::{AppConfig, CacheStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{Context, LiveWorker};

pub async fn run(config: &AppConfig) -> Result<()> {
    let ctx = Context::open(config).await?;
    ctx.host.register_client();

    if let Err(e) = ctx.worker.start().await {
        tracing::warn!("worker install failed, continuing without offline assets: {e}");
    }
    let updates = ctx.worker.spawn_update_checks(config.update_interval());

    let api = Arc::new(ctx.api(config));
    let session = authenticate(config, &api).await?;
    println!("signed in as {} #{}", session.username, session.short_id());

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let channel_config = ChannelConfig {
        url: channel_url(&config.origin_url()?, &session.token)?,
        username: session.username.clone(),
        reconnect_delay: config.reconnect_delay(),
    };
    let handle = channel::spawn(WsConnector, channel_config, events_tx);
    let mut chat = ChatClient::new(api, session, handle);
    chat.refresh();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sweep = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !handle_line(&mut chat, &ctx.worker, line.trim()).await {
                        break;
                    }
                }
                None => break,
            },
            Some(event) = events.recv() => handle_event(&mut chat, event),
            Some(followup) = chat.reloaded() => match followup {
                Followup::ReloadMessages => print_messages(&chat),
                Followup::ReloadNews => print_news(&chat),
            },
            _ = sweep.tick() => {
                chat.view_mut().expire_notices(Instant::now());
            }
        }
    }

    updates.abort();
    chat.close();
    Ok(())
}

async fn authenticate<S, N>(config: &AppConfig, api: &ApiClient<S, N>) -> Result<Session>
where
    S: CacheStore + 'static,
    N: Network + 'static,
{
    if let Some(token) = &config.token {
        match api.validate(token).await? {
            Some(session) => return Ok(session),
            None => tracing::info!("stored token rejected, trying credentials"),
        }
    }
    match (&config.username, &config.password) {
        (Some(username), Some(password)) => Ok(api.login(username, password).await?),
        _ => bail!("no valid token and no credentials; set TECHTALKS_TOKEN or TECHTALKS_USERNAME/TECHTALKS_PASSWORD"),
    }
}

/// Returns false when the user asked to leave.
async fn handle_line<S, N>(chat: &mut ChatClient<S, N>, worker: &LiveWorker, line: &str) -> bool
where
    S: CacheStore + 'static,
    N: Network + 'static,
{
    match line {
        "/quit" => return false,
        "/skipWaiting" => match worker.handle_control("skipWaiting").await {
            Ok(Some(report)) => println!("* worker now serving {}", report.generation),
            Ok(None) => println!("* nothing waiting to activate"),
            Err(e) => println!("! {e}"),
        },
        _ => {
            if let Some(text) = line.strip_prefix("/news ") {
                if chat.post_news(text).await.is_err() {
                    print_latest_notice(chat);
                }
            } else {
                chat.view_mut().set_input(line);
                if !chat.submit() {
                    tracing::debug!("message not sent, channel closed");
                }
            }
        }
    }
    true
}

/// Reloads requested by the event are printed once they land.
fn handle_event<S, N>(chat: &mut ChatClient<S, N>, event: ChannelEvent)
where
    S: CacheStore + 'static,
    N: Network + 'static,
{
    match &event {
        ChannelEvent::StateChanged(state) => println!("* channel {state:?}"),
        ChannelEvent::Action(ChannelAction::AppendMessage { message, own }) => {
            let marker = if *own { ">" } else { " " };
            println!("{marker} [{}] {}: {}", message.timestamp.format("%H:%M:%S"), message.sender, message.content);
        }
        ChannelEvent::Action(ChannelAction::SetOnlineCount(count)) => println!("* {count} online"),
        ChannelEvent::Action(_) | ChannelEvent::SendFailed(_) => {}
    }
    let failed = matches!(event, ChannelEvent::SendFailed(_));

    chat.handle_event(event);

    if failed {
        print_latest_notice(chat);
    }
}

fn print_messages<S, N>(chat: &ChatClient<S, N>) {
    for shown in chat.view().messages() {
        let marker = if shown.own { ">" } else { " " };
        let message = &shown.message;
        println!("{marker} [{}] {}: {}", message.timestamp.format("%H:%M:%S"), message.sender, message.content);
    }
}

fn print_news<S, N>(chat: &ChatClient<S, N>) {
    let news = chat.view().news();
    if news.is_empty() {
        println!("# no news yet");
    }
    for item in news {
        match item.created_at {
            Some(at) => println!("# {} ({})", item.text, at.format("%d.%m.%Y %H:%M")),
            None => println!("# {}", item.text),
        }
    }
}

fn print_latest_notice<S, N>(chat: &ChatClient<S, N>) {
    if let Some(notice) = chat.view().notices().last() {
        println!("! {}", notice.text);
    }
}
