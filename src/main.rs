use chrono::Local;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use peercall::calls::{
    CallContext, CallEventRouter, CallHandle, CallManager, SignalingChannel, TrackDevices,
    WebRtcConnector,
};
use peercall::config::CallConfig;
use peercall::presence::{Presence, PresenceList};
use peercall::socket::{TransportEvent, WsTransport};
use peercall::types::{CallStatus, Contact, LogNoticeSink, NoticeBus, NoticeSink, UserId};
use peercall::types::format_duration;
use std::sync::Arc;
use std::time::Duration;

// Manual test client for the relay.
//
// Usage:
//   cargo run -- --user alice --name Alice call bob            # audio call to bob
//   cargo run -- --user alice --name Alice call bob --video    # video call
//   cargo run -- --user bob --name Bob listen --auto-accept    # answer incoming calls

#[derive(Debug, Parser)]
#[command(version, about = "Peer-to-peer call client")]
struct Args {
    /// WebSocket URL of the signaling relay.
    #[arg(long, default_value = "ws://localhost:5001")]
    relay: String,
    /// Local user id.
    #[arg(long)]
    user: String,
    /// Display name sent with invites.
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    avatar: Option<String>,
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Call a user and exit when the call ends.
    Call {
        target: String,
        #[arg(long)]
        video: bool,
    },
    /// Wait for incoming calls.
    Listen {
        #[arg(long)]
        auto_accept: bool,
    },
}

const PRESENCE_WAIT: Duration = Duration::from_secs(10);

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    rt.block_on(async {
        if let Err(e) = run(args).await {
            error!("{e:?}");
        }
    });
}

async fn run(args: Args) -> Result<(), anyhow::Error> {
    let mut local = Contact::new(args.user.as_str(), args.name.unwrap_or_else(|| args.user.clone()));
    if let Some(avatar) = args.avatar {
        local = local.with_avatar(avatar);
    }

    let (transport, mut events) = WsTransport::connect(&args.relay, &local.id).await?;
    let channel = SignalingChannel::new(transport);
    let presence = Arc::new(PresenceList::new());

    let notices = Arc::new(NoticeBus::new());
    let mut notice_rx = notices.subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = notice_rx.recv().await {
            LogNoticeSink.notify(notice);
        }
    });

    let handle = CallManager::spawn(CallContext {
        local: local.clone(),
        channel: channel.clone(),
        devices: Arc::new(TrackDevices::default()),
        connector: Arc::new(WebRtcConnector::new()),
        presence: presence.clone(),
        notices,
        config: CallConfig::default(),
    });

    let router = CallEventRouter::new(channel.clone(), handle.clone(), presence.clone());
    router.attach();

    let pump_channel = channel.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Connected => info!("Connected to relay"),
                TransportEvent::TextReceived(text) => {
                    pump_channel.dispatch(&text);
                }
                TransportEvent::Disconnected => {
                    warn!("Relay connection lost");
                    break;
                }
            }
        }
    });

    let (exit_when_idle, auto_accept) = match args.mode {
        Mode::Call { target, video } => {
            let target = UserId::new(target);
            wait_for_presence(&presence, &target).await;
            let contact = Contact::new(target.clone(), target.to_string());
            handle.start_outgoing_call(contact, video).await?;
            (true, false)
        }
        Mode::Listen { auto_accept } => {
            info!("Waiting for calls as {}", local.id);
            (false, auto_accept)
        }
    };

    watch_session(&handle, exit_when_idle, auto_accept).await;

    router.detach();
    handle.shutdown().await;
    channel.disconnect().await;
    Ok(())
}

async fn wait_for_presence(presence: &PresenceList, target: &UserId) {
    let deadline = tokio::time::Instant::now() + PRESENCE_WAIT;
    while !presence.is_online(target) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn watch_session(handle: &CallHandle, exit_when_idle: bool, auto_accept: bool) {
    let mut updates = handle.subscribe();
    let mut last_status = updates.borrow().status;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                let result = match handle.status() {
                    CallStatus::Incoming => handle.reject_incoming_call().await,
                    CallStatus::Outgoing | CallStatus::Connected => handle.end_call().await,
                    CallStatus::Idle => Ok(()),
                };
                if let Err(e) = result {
                    warn!("Failed to hang up: {e}");
                }
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.status != last_status {
                    let who = snapshot
                        .counterparty
                        .as_ref()
                        .map(|c| c.display_name.as_str())
                        .unwrap_or("-");
                    info!("Call status: {} ({} call, {who})", snapshot.status, snapshot.call_type);

                    if auto_accept && snapshot.status == CallStatus::Incoming {
                        if let Err(e) = handle.accept_incoming_call().await {
                            warn!("Failed to accept: {e}");
                        }
                    }
                    if exit_when_idle && snapshot.status.is_idle() {
                        break;
                    }
                    last_status = snapshot.status;
                } else if snapshot.status == CallStatus::Connected {
                    info!("In call {}", format_duration(snapshot.elapsed_seconds));
                }
            }
        }
    }
}
