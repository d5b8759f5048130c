use std::{
    io::{self, Write},
    sync::Arc,
};

use anyhow::{bail, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::{
    cli::{ChatArgs, Cli, Command, FeedArgs, InboxArgs},
    domain::{self, conversation_state::SessionStatus},
    infra::{self, error::AppError},
    ui::{
        self,
        commands::{self, ChatCommand, FeedCommand},
        feed_rendering, message_rendering,
    },
    usecases::{
        self, bootstrap,
        context::AppContext,
        conversation_list::{get_or_create_conversation, Inbox, InboxSource},
        conversation_sync::{ChatOptions, ConversationSession},
        error::SyncError,
        project_feed::{ProjectFeed, ProjectFeedSource},
    },
};

const CLI_ACTION_FAILED: &str = "CLI_ACTION_FAILED";

/// Scheduler turns granted to the live feed so echoes of our own sends
/// are applied before the conversation is printed.
const LIVE_DRAIN_TURNS: usize = 8;

pub fn run(cli: Cli) -> Result<()> {
    let context = bootstrap::bootstrap(cli.config.as_deref(), cli.seed.as_deref())?;

    tracing::debug!(
        ui = ui::module_name(),
        domain = domain::module_name(),
        backend = crate::backend::module_name(),
        usecases = usecases::module_name(),
        infra = infra::module_name(),
        "module boundaries loaded"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::RuntimeInit)?;

    runtime.block_on(async {
        let mut out = io::stdout();
        match cli.command_or_default() {
            Command::Feed(args) if args.interactive => {
                feed_interactive(&context, &args, stdin_lines(), &mut out).await
            }
            Command::Feed(args) => write_lines(&mut out, &feed(&context, &args).await?),
            Command::Chat(args) if args.interactive => {
                chat_interactive(&context, &args, stdin_lines(), &mut out).await
            }
            Command::Chat(args) => write_lines(&mut out, &chat(&context, &args).await?),
            Command::Inbox(args) => write_lines(&mut out, &inbox(&context, &args).await?),
        }
    })
}

async fn feed(context: &AppContext, args: &FeedArgs) -> Result<Vec<String>> {
    let feed = open_feed(context, args).await;

    for project_id in &args.likes {
        if let Err(error) = feed.toggle_like(project_id).await {
            report("toggle like", &error);
            feed.clear_error();
        }
    }

    let lines = feed_rendering::feed_lines(&feed.snapshot());
    feed.close();
    Ok(lines)
}

async fn feed_interactive<R, W>(
    context: &AppContext,
    args: &FeedArgs,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let feed = open_feed(context, args).await;
    writeln!(out, "{}", commands::FEED_HELP)?;
    write_lines(out, &feed_rendering::feed_lines(&feed.snapshot()))?;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let command = match commands::parse_feed_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(error) => {
                writeln!(out, "{error}")?;
                continue;
            }
        };

        let result = match command {
            FeedCommand::Quit => break,
            FeedCommand::More => feed.load_more().await.map(drop),
            FeedCommand::Refresh => feed.refresh().await,
            FeedCommand::Like(project_id) => feed.toggle_like(&project_id).await,
            FeedCommand::Filter(change) => {
                let mut filters = feed.filters();
                change.apply(&mut filters);
                feed.set_filters(filters).await.map(drop)
            }
            FeedCommand::Dismiss => {
                feed.clear_error();
                Ok(())
            }
        };
        if let Err(error) = result {
            log_failure("update the feed", &error);
        }

        write_lines(out, &feed_rendering::feed_lines(&feed.snapshot()))?;
    }

    feed.close();
    Ok(())
}

async fn open_feed(context: &AppContext, args: &FeedArgs) -> ProjectFeed {
    let source = ProjectFeedSource::new(Arc::clone(&context.backend), args.viewer.clone());
    let feed =
        ProjectFeed::initialize(source, args.filters(), context.config.feed.page_size).await;

    for _ in 1..args.pages {
        match feed.load_more().await {
            Ok(true) => {}
            Ok(false) => break,
            Err(error) => report("load more projects", &error),
        }
    }
    feed
}

async fn chat(context: &AppContext, args: &ChatArgs) -> Result<Vec<String>> {
    let (conversation_id, session) = open_session(context, args).await?;
    if session.snapshot().status == SessionStatus::Failed {
        let error = session.snapshot().error;
        session.close().await;
        bail!(
            "cannot open conversation {conversation_id}: {}",
            error.as_deref().unwrap_or("unknown error")
        );
    }

    for body in &args.messages {
        if let Err(error) = session.send(body).await {
            report("send message", &error);
        }
    }
    drain_live_feed().await;

    let lines = conversation_lines(&conversation_id, &session);
    session.close().await;
    Ok(lines)
}

async fn chat_interactive<R, W>(
    context: &AppContext,
    args: &ChatArgs,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let (conversation_id, mut session) = open_session(context, args).await?;
    writeln!(out, "{}", commands::CHAT_HELP)?;
    write_lines(out, &conversation_lines(&conversation_id, &session))?;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let command = match commands::parse_chat_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(error) => {
                writeln!(out, "{error}")?;
                continue;
            }
        };

        let result = match command {
            ChatCommand::Quit => break,
            ChatCommand::Send(body) => {
                let sent = session.send(&body).await;
                drain_live_feed().await;
                sent
            }
            ChatCommand::Reload => session.reload().await,
            ChatCommand::Dismiss => {
                session.clear_error();
                Ok(())
            }
        };
        if let Err(error) = result {
            log_failure("update the conversation", &error);
        }

        write_lines(out, &conversation_lines(&conversation_id, &session))?;
    }

    session.close().await;
    Ok(())
}

/// Resolves the conversation and opens it. An `Invalid` session is closed
/// and reported; a `Failed` one is returned so the caller can retry.
async fn open_session(
    context: &AppContext,
    args: &ChatArgs,
) -> Result<(String, ConversationSession)> {
    let conversation_id = match (&args.conversation, &args.with) {
        (Some(id), _) => id.clone(),
        (None, Some(other)) => {
            get_or_create_conversation(context.backend.as_ref(), &args.user, other)
                .await?
                .id
        }
        (None, None) => bail!("either --with or --conversation is required"),
    };

    let session = ConversationSession::open(
        Arc::clone(&context.backend),
        &conversation_id,
        &args.user,
        ChatOptions::from_config(&context.config.chat),
    )
    .await;

    let opened = session.snapshot();
    if opened.status == SessionStatus::Invalid {
        session.close().await;
        bail!(
            "cannot open conversation {conversation_id}: {}",
            opened.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok((conversation_id, session))
}

fn conversation_lines(conversation_id: &str, session: &ConversationSession) -> Vec<String> {
    let snapshot = session.snapshot();
    let counterpart = session
        .conversation()
        .and_then(|conversation| conversation.counterpart(session.current_user()));

    let mut lines = vec![match counterpart {
        Some(counterpart) => format!("Conversation {conversation_id} with {counterpart}"),
        None => format!("Conversation {conversation_id}"),
    }];
    if let Some(error) = snapshot.error.as_deref() {
        lines.push(format!("Error: {error}"));
    }
    for element in
        message_rendering::build_message_list_elements(&snapshot.entries, session.current_user())
    {
        lines.extend(message_rendering::element_lines(&element));
    }
    lines
}

async fn drain_live_feed() {
    for _ in 0..LIVE_DRAIN_TURNS {
        tokio::task::yield_now().await;
    }
}

async fn inbox(context: &AppContext, args: &InboxArgs) -> Result<Vec<String>> {
    let inbox = Inbox::initialize(
        InboxSource::new(Arc::clone(&context.backend)),
        args.user.clone(),
        context.config.feed.page_size,
    )
    .await;

    for _ in 1..args.pages {
        match inbox.load_more().await {
            Ok(true) => {}
            Ok(false) => break,
            Err(error) => report("load more conversations", &error),
        }
    }

    let snapshot = inbox.snapshot();
    inbox.close();

    let mut lines = Vec::new();
    if let Some(error) = snapshot.error.as_deref() {
        lines.push(format!("Error: {error}"));
    }
    if snapshot.items.is_empty() && snapshot.error.is_none() {
        lines.push("No conversations yet.".to_owned());
    }
    lines.extend(
        snapshot
            .items
            .iter()
            .map(|conversation| feed_rendering::conversation_line(conversation, &args.user)),
    );
    Ok(lines)
}

fn stdin_lines() -> BufReader<tokio::io::Stdin> {
    BufReader::new(tokio::io::stdin())
}

fn write_lines(out: &mut impl Write, lines: &[String]) -> Result<()> {
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

fn log_failure(action: &str, error: &SyncError) {
    tracing::warn!(
        code = CLI_ACTION_FAILED,
        action,
        kind = ?error.kind(),
        error = %error,
        "action failed"
    );
}

fn report(action: &str, error: &SyncError) {
    log_failure(action, error);
    eprintln!("Could not {action}: {error}");
}
