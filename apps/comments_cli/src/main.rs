use std::{
    io::{self, BufRead, Write},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comment_client::{
    config::load_settings, CommentEngine, CurrentUser, EngineConfig, EngineEvent, FetchMore,
    HttpCommentStore, NewComment, NoticeLevel, SessionAuth, RECENT_CONTAINER,
};
use shared::domain::{CommentId, ContainerId, VoteDirection};
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Parser, Debug)]
struct Cli {
    /// Logs in as this user; anonymous when omitted.
    #[arg(long, requires = "sid")]
    user: Option<String>,
    /// Session id issued by the docs server for `--user`.
    #[arg(long, requires = "user")]
    sid: Option<String>,
    #[arg(long, requires = "user")]
    moderator: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints the comment thread of a container.
    Thread { container: String },
    /// Prints the recent-comments index, following up to `pages` pages.
    Recent {
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    Post {
        container: String,
        content: String,
        #[arg(long)]
        rating: Option<String>,
    },
    Vote {
        container: String,
        comment: String,
        direction: Direction,
    },
    Edit {
        container: String,
        comment: String,
        content: String,
    },
    Delete {
        container: String,
        comment: String,
        /// Skips the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    Subscribe {
        container: String,
        #[arg(long)]
        off: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Direction {
    Up,
    Down,
}

impl From<Direction> for VoteDirection {
    fn from(value: Direction) -> Self {
        match value {
            Direction::Up => VoteDirection::Up,
            Direction::Down => VoteDirection::Down,
        }
    }
}

fn session(cli: &Cli) -> SessionAuth {
    match (&cli.user, &cli.sid) {
        (Some(user_name), Some(sid)) => SessionAuth::logged_in(
            CurrentUser {
                user_name: user_name.clone(),
                moderator: cli.moderator,
            },
            sid.clone(),
        ),
        _ => SessionAuth::anonymous(),
    }
}

fn confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn ask(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(confirmed(&answer))
}

fn report_events(events: &mut broadcast::Receiver<EngineEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::Notice {
                level: NoticeLevel::Error,
                message,
                ..
            } => warn!("{message}"),
            EngineEvent::Notice { message, .. } => info!("{message}"),
            EngineEvent::Added { target, .. } => info!(target = %target, "comment added"),
            EngineEvent::Removed { target, .. } => info!(target = %target, "comment removed"),
            EngineEvent::SubscriptionChanged {
                target, subscribed, ..
            } => info!(target = %target, subscribed, "subscription changed"),
            EngineEvent::AuthChanged { .. } => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();

    let settings = load_settings();
    let endpoint = settings.endpoint()?;
    info!(endpoint = endpoint.as_str(), "using comment store");
    let config = EngineConfig::from_settings(&settings)?;
    let engine = CommentEngine::new(
        Arc::new(HttpCommentStore::new(endpoint)),
        Arc::new(session(&cli)),
        config,
    );
    let mut events = engine.subscribe_events();

    let result = run(&engine, cli.command).await;
    report_events(&mut events);
    result
}

async fn run(engine: &CommentEngine, command: Command) -> Result<()> {
    match command {
        Command::Thread { container } => {
            let snapshot = engine
                .open(&ContainerId::new(container))
                .await
                .context("failed to load thread")?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Recent { pages } => {
            let recent = ContainerId::from(RECENT_CONTAINER);
            let mut snapshot = engine
                .load_index()
                .await
                .context("failed to load recent comments")?;
            for _ in 1..pages {
                match engine.fetch_more(&recent).await? {
                    FetchMore::Loaded(next) => snapshot = Some(next),
                    FetchMore::Exhausted | FetchMore::Discarded => break,
                }
            }
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Post {
            container,
            content,
            rating,
        } => {
            let comment = NewComment {
                content,
                rating,
                action: "comment".into(),
            };
            let stored = engine
                .create(&ContainerId::new(container), comment)
                .await
                .context("failed to post comment")?;
            println!("{}", serde_json::to_string_pretty(&stored)?);
        }
        Command::Vote {
            container,
            comment,
            direction,
        } => {
            let outcome = engine
                .vote(
                    &ContainerId::new(container),
                    &CommentId::new(comment),
                    direction.into(),
                )
                .await
                .context("vote failed")?;
            println!(
                "direction={} total={}",
                outcome.direction.map(VoteDirection::as_str).unwrap_or("none"),
                outcome.total
            );
        }
        Command::Edit {
            container,
            comment,
            content,
        } => {
            let container = ContainerId::new(container);
            let comment = CommentId::new(comment);
            engine.open(&container).await?;
            engine
                .begin_edit(&container, &comment)
                .await
                .context("failed to load comment for editing")?;
            let stored = engine
                .save_edit(&comment, &content)
                .await
                .context("failed to save comment")?;
            println!("{}", stored.unwrap_or_default());
        }
        Command::Delete {
            container,
            comment,
            yes,
        } => {
            let prompt =
                engine.prompt_remove(&ContainerId::new(container), &CommentId::new(comment))?;
            if !yes && !ask(prompt.message())? {
                println!("delete cancelled");
                return Ok(());
            }
            let removed = engine.remove(prompt).await.context("delete failed")?;
            println!("removed={removed}");
        }
        Command::Subscribe { container, off } => {
            let subscribed = engine
                .set_subscription(&ContainerId::new(container), !off)
                .await
                .context("subscription change failed")?;
            println!("subscribed={subscribed}");
        }
    }
    Ok(())
}
