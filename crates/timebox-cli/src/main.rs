//! timebox - command-line client for timeboxd
//!
//! Talks to the daemon over its control socket. Human-readable output by
//! default; `--json` prints raw payloads for scripting.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use timebox_api::{
    Command, ErrorInfo, EventPayload, Origin, ResponsePayload, ResponseResult, Session,
    StatusSnapshot,
};
use timebox_ipc::IpcClient;
use timebox_util::{default_socket_path, format_duration};

/// timebox - control a running timeboxd
#[derive(Parser, Debug)]
#[command(name = "timebox")]
#[command(about = "Start, stop and inspect timebox sessions", long_about = None)]
struct Args {
    /// Socket path (or set TIMEBOX_SOCKET env var)
    #[arg(short, long, env = "TIMEBOX_SOCKET", default_value_os_t = default_socket_path())]
    socket: PathBuf,

    /// Print raw JSON payloads instead of human-readable output
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Start a new session
    Start {
        /// Planned duration in minutes (1-1440)
        #[arg(short, long)]
        minutes: u32,

        /// Label for the session (1-64 characters)
        #[arg(short, long)]
        label: String,

        /// Who is starting this session
        #[arg(long, value_enum, default_value = "human")]
        origin: OriginArg,
    },

    /// Stop the running session
    Stop,

    /// Show the current timer status
    Status,

    /// List terminated sessions, newest first
    History {
        /// Only sessions started at or after this time (RFC 3339)
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// Only sessions started at or before this time (RFC 3339)
        #[arg(long)]
        to: Option<DateTime<Utc>>,
    },

    /// Stream lifecycle events until interrupted
    Watch,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OriginArg {
    Human,
    Agent,
}

impl From<OriginArg> for Origin {
    fn from(value: OriginArg) -> Self {
        match value {
            OriginArg::Human => Origin::Human,
            OriginArg::Agent => Origin::Agent,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let client = IpcClient::connect(&args.socket)
        .await
        .with_context(|| format!("Failed to connect to timeboxd at {:?}", args.socket))?;

    match args.command {
        CliCommand::Start {
            minutes,
            label,
            origin,
        } => {
            let payload = request(
                client,
                Command::Start {
                    duration_minutes: minutes,
                    label,
                    origin: origin.into(),
                },
            )
            .await?;
            match payload {
                ResponsePayload::Started(session) => print_started(&session, args.json)?,
                other => bail!("Unexpected response: {:?}", other),
            }
        }

        CliCommand::Stop => {
            let payload = request(client, Command::Stop).await?;
            match payload {
                ResponsePayload::Stopped(session) => print_ended(&session, args.json)?,
                other => bail!("Unexpected response: {:?}", other),
            }
        }

        CliCommand::Status => {
            let payload = request(client, Command::GetStatus).await?;
            match payload {
                ResponsePayload::Status(status) => print_status(&status, args.json)?,
                other => bail!("Unexpected response: {:?}", other),
            }
        }

        CliCommand::History { from, to } => {
            let payload = request(
                client,
                Command::GetHistory {
                    start_date: from,
                    end_date: to,
                },
            )
            .await?;
            match payload {
                ResponsePayload::History { sessions } => print_history(&sessions, args.json)?,
                other => bail!("Unexpected response: {:?}", other),
            }
        }

        CliCommand::Watch => watch(client, args.json).await?,
    }

    Ok(())
}

/// Send one command and unwrap the response payload.
async fn request(mut client: IpcClient, command: Command) -> Result<ResponsePayload> {
    let response = client.send(command).await?;
    match response.result {
        ResponseResult::Ok(payload) => Ok(payload),
        ResponseResult::Err(ErrorInfo { code, message }) => {
            bail!("{} ({:?})", message, code)
        }
    }
}

async fn watch(client: IpcClient, json: bool) -> Result<()> {
    let mut stream = client.subscribe().await?;

    loop {
        let event = stream.next().await?;
        if json {
            println!("{}", serde_json::to_string(&event)?);
            continue;
        }

        match event.payload {
            EventPayload::Started { session } => {
                println!(
                    "started  {} ({})",
                    session.label,
                    format_duration(session.duration())
                );
            }
            EventPayload::Tick {
                remaining_secs,
                session,
            } => {
                println!(
                    "tick     {} remaining for {}",
                    format_duration(Duration::from_secs(remaining_secs)),
                    session.label
                );
            }
            EventPayload::Completed { session } => {
                println!("complete {}", session.label);
            }
            EventPayload::Stopped { session } => {
                println!("stopped  {}", session.label);
            }
            EventPayload::Shutdown => {
                println!("daemon shut down");
                return Ok(());
            }
        }
    }
}

fn print_started(session: &Session, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(session)?);
        return Ok(());
    }
    println!(
        "Started \"{}\" for {} (session {})",
        session.label,
        format_duration(session.duration()),
        session.id
    );
    Ok(())
}

fn print_ended(session: &Session, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(session)?);
        return Ok(());
    }
    println!("{} \"{}\"", session.status, session.label);
    Ok(())
}

fn print_status(status: &StatusSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }
    match &status.session {
        Some(session) => println!(
            "{} remaining of \"{}\" ({})",
            format_duration(Duration::from_secs(status.remaining_secs)),
            session.label,
            session.origin
        ),
        None => println!("No timer running"),
    }
    Ok(())
}

fn print_history(sessions: &[Session], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("No sessions recorded");
        return Ok(());
    }
    for session in sessions {
        println!(
            "{}  {:9}  {:>8}  {}  {}",
            session.started_at.format("%Y-%m-%d %H:%M"),
            session.status.to_string(),
            format_duration(session.duration()),
            session.origin,
            session.label
        );
    }
    Ok(())
}
