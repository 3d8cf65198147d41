//! timeboxd - The timebox background service
//!
//! This is the main entry point for the timeboxd service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization and crash cleanup
//! - Timer engine
//! - IPC server
//! - Event forwarding to subscribed clients

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use timebox_api::{
    Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus, Response, ResponsePayload,
};
use timebox_config::load_config;
use timebox_core::{SubscriptionError, TimerEngine, TimerError, TimerEvent};
use timebox_ipc::{IpcServer, ServerMessage};
use timebox_store::{SessionStore, SqliteStore};
use timebox_util::{ClientId, MonotonicInstant, RateLimiter, default_config_path};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// timeboxd - single-session focus timer for humans and agents
#[derive(Parser, Debug)]
#[command(name = "timeboxd")]
#[command(about = "Session timer service driven over a local control socket", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/timebox/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set TIMEBOX_SOCKET env var)
    #[arg(short, long, env = "TIMEBOX_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set TIMEBOX_DATA_DIR env var)
    #[arg(short, long, env = "TIMEBOX_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (overrides the config file)
    #[arg(short, long)]
    log_level: Option<String>,
}

/// Main service state
struct Service {
    engine: TimerEngine,
    ipc: Arc<IpcServer>,
    store: Arc<dyn SessionStore>,
    rate_limiter: RateLimiter,
}

impl Service {
    async fn new(args: &Args, config: &timebox_config::Config) -> Result<Self> {
        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| config.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| config.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join("timeboxd.db");
        let store: Arc<dyn SessionStore> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        // A crash leaves the in-flight session row Running; close it before
        // accepting requests so history never shows a phantom active timer.
        match store.cleanup_stale_running() {
            Ok(0) => {}
            Ok(count) => warn!(count, "Closed stale running sessions from previous crash"),
            Err(e) => warn!(error = %e, "Failed to clean up stale sessions"),
        }

        let engine = TimerEngine::new(store.clone());

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        // 30 requests per second per client
        let rate_limiter = RateLimiter::new(30, Duration::from_secs(1));

        Ok(Self {
            engine,
            ipc: Arc::new(ipc),
            store,
            rate_limiter,
        })
    }

    async fn run(self) -> Result<()> {
        let ipc_ref = self.ipc.clone();
        let mut ipc_messages = ipc_ref
            .take_message_receiver()
            .await
            .expect("Message receiver should be available");

        let engine = self.engine.clone();
        let rate_limiter = Arc::new(Mutex::new(self.rate_limiter));
        let store = self.store.clone();

        // Spawn IPC accept task
        let ipc_accept = ipc_ref.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        // Forward engine events to subscribed IPC clients
        let mut events = engine.subscribe();
        let ipc_events = ipc_ref.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        ipc_events.broadcast_event(Event::new(to_wire(event)));
                    }
                    Err(SubscriptionError::Lagged(n)) => {
                        warn!(missed = n, "Event forwarder lagged");
                    }
                    Err(SubscriptionError::Closed) => break,
                }
            }
        });

        // Set up signal handlers
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&engine, &store, &ipc_ref, &rate_limiter, msg).await;
                }
            }
        }

        // Graceful shutdown: close out any running session so history does
        // not keep a phantom Running row.
        info!("Shutting down timeboxd");

        if engine.status().is_running {
            match engine.stop(timebox_util::now(), MonotonicInstant::now()).await {
                Ok(session) => {
                    info!(session_id = %session.id, "Stopped active session for shutdown")
                }
                Err(e) => warn!(error = %e, "Failed to stop active session"),
            }
        }

        ipc_ref.broadcast_event(Event::new(EventPayload::Shutdown));
        ipc_ref.shutdown();

        info!("Shutdown complete");
        Ok(())
    }

    async fn handle_ipc_message(
        engine: &TimerEngine,
        store: &Arc<dyn SessionStore>,
        ipc: &Arc<IpcServer>,
        rate_limiter: &Arc<Mutex<RateLimiter>>,
        msg: ServerMessage,
    ) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                {
                    let mut limiter = rate_limiter.lock().await;
                    if !limiter.check(&client_id) {
                        let response = Response::error(
                            request.request_id,
                            ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                        );
                        let _ = ipc.send_response(&client_id, response).await;
                        return;
                    }
                }

                let response = Self::handle_command(
                    engine,
                    store,
                    &client_id,
                    request.request_id,
                    request.command,
                )
                .await;

                let _ = ipc.send_response(&client_id, response).await;
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(client_id = %client_id, uid = ?info.uid, "Client connected");
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");

                let mut limiter = rate_limiter.lock().await;
                limiter.remove_client(&client_id);
            }
        }
    }

    async fn handle_command(
        engine: &TimerEngine,
        store: &Arc<dyn SessionStore>,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> Response {
        let now = timebox_util::now();
        let now_mono = MonotonicInstant::now();

        match command {
            Command::Start {
                duration_minutes,
                label,
                origin,
            } => match engine.start(duration_minutes, &label, origin, now, now_mono).await {
                Ok(session) => Response::success(request_id, ResponsePayload::Started(session)),
                Err(e) => Response::error(request_id, timer_error_info(e)),
            },

            Command::Stop => match engine.stop(now, now_mono).await {
                Ok(session) => Response::success(request_id, ResponsePayload::Stopped(session)),
                Err(e) => Response::error(request_id, timer_error_info(e)),
            },

            Command::GetStatus => {
                Response::success(request_id, ResponsePayload::Status(engine.status()))
            }

            Command::GetHistory {
                start_date,
                end_date,
            } => match store.query(start_date, end_date) {
                Ok(sessions) => {
                    Response::success(request_id, ResponsePayload::History { sessions })
                }
                Err(e) => Response::error(
                    request_id,
                    ErrorInfo::new(ErrorCode::StoreError, e.to_string()),
                ),
            },

            Command::SubscribeEvents => Response::success(
                request_id,
                ResponsePayload::Subscribed {
                    client_id: client_id.clone(),
                },
            ),

            Command::UnsubscribeEvents => {
                Response::success(request_id, ResponsePayload::Unsubscribed)
            }

            Command::GetHealth => {
                let health = HealthStatus {
                    live: true,
                    ready: true,
                    store_ok: store.is_healthy(),
                };
                Response::success(request_id, ResponsePayload::Health(health))
            }

            Command::Ping => Response::success(request_id, ResponsePayload::Pong),
        }
    }
}

/// Map an engine event onto the wire protocol.
fn to_wire(event: TimerEvent) -> EventPayload {
    match event {
        TimerEvent::Started { session } => EventPayload::Started { session },
        TimerEvent::Tick {
            remaining_secs,
            session,
        } => EventPayload::Tick {
            remaining_secs,
            session,
        },
        TimerEvent::Completed { session } => EventPayload::Completed { session },
        TimerEvent::Stopped { session } => EventPayload::Stopped { session },
    }
}

fn timer_error_info(e: TimerError) -> ErrorInfo {
    let code = match &e {
        TimerError::AlreadyRunning => ErrorCode::AlreadyRunning,
        TimerError::NoActiveSession => ErrorCode::NoActiveSession,
        TimerError::InvalidLabel(_) => ErrorCode::InvalidLabel,
        TimerError::InvalidDuration => ErrorCode::InvalidDuration,
        TimerError::Store(_) => ErrorCode::StoreError,
    };
    ErrorInfo::new(code, e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.service.log_level.clone());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "timeboxd starting");

    let service = Service::new(&args, &config).await?;
    service.run().await
}
