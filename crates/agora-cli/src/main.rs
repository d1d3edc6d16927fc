use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use agora_client::conversations::Conversations;
use agora_client::events::Events;
use agora_client::feed;
use agora_client::forums::Forums;
use agora_client::translate::Translator;
use agora_client::{ClientConfig, MessageStream, SessionContext};
use agora_gateway::EmbeddedBackend;
use agora_types::api::NewUser;
use agora_types::models::User;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

const USAGE: &str = "usage:
  agora signup <name> <username> <email> <password> <nationality>
  agora chat <email> <password> <peer-username>
  agora forum <email> <password> <forum-id>
  agora forums [search]
  agora events [country]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=info,agora_client=debug,agora_gateway=info".into()),
        )
        .init();

    let config = ClientConfig::from_env()?;
    if PLACEHOLDER_SECRETS.contains(&config.jwt_secret.as_str()) {
        eprintln!("FATAL: AGORA_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    let backend = EmbeddedBackend::open(&config.db_path, config.embedded())
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    info!("Using store at {}", config.db_path.display());
    let ctx = SessionContext::new(Arc::new(backend), config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["signup", name, username, email, password, nationality] => {
            let user = ctx
                .sign_up(NewUser {
                    name: name.to_string(),
                    email: email.to_string(),
                    username: username.to_string(),
                    password: password.to_string(),
                    nationality: nationality.to_string(),
                })
                .await?;
            println!("Welcome, {} ({})", user.name, user.id);
        }
        ["chat", email, password, peer] => {
            let me = ctx.sign_in(email, password).await?;
            let peer = find_user(&ctx, peer).await?;
            let conversations = Conversations::new(ctx.clone());
            let conversation = conversations.open_with(&peer.id).await?;
            let stream = conversations.open_stream(&conversation.id).await?;
            run_stream(ctx.clone(), me, stream).await?;
        }
        ["forum", email, password, forum_id] => {
            let me = ctx.sign_in(email, password).await?;
            let forum = Forums::new(ctx.clone()).details(forum_id).await?;
            println!("# {} ({})", forum.title, forum.theme);
            let stream = Forums::new(ctx.clone()).open_stream(forum_id).await?;
            run_stream(ctx.clone(), me, stream).await?;
        }
        ["forums", rest @ ..] => {
            let forums = Forums::new(ctx.clone()).list().await?;
            for forum in feed::filter_forums(&forums, None, rest.first().copied().unwrap_or("")) {
                println!("{}  [{}] {}", forum.id, forum.theme, forum.title);
            }
        }
        ["events", rest @ ..] => {
            let events = Events::new(ctx.clone()).list_by_country(None).await?;
            for event in feed::filter_events(&events, rest.first().copied(), "") {
                println!("{}  {} {} - {}", event.date.format("%Y-%m-%d"), event.country, event.location, event.title);
            }
        }
        _ => bail!("{}", USAGE),
    }
    Ok(())
}

async fn find_user(ctx: &SessionContext, username: &str) -> anyhow::Result<User> {
    feed::list_users(ctx, None)
        .await?
        .into_iter()
        .find(|u| u.username == username)
        .with_context(|| format!("no user named {}", username))
}

/// Print the stream as it changes and send every line typed on stdin.
/// `/translate` shows the conversation in the reader's language, `/quit` leaves.
async fn run_stream(ctx: Arc<SessionContext>, me: User, stream: MessageStream) -> anyhow::Result<()> {
    let stream = Arc::new(stream);
    let printer = {
        let stream = stream.clone();
        let me = me.id.clone();
        tokio::spawn(async move {
            let mut changes = stream.changes();
            let mut printed = HashSet::new();
            loop {
                for entry in stream.entries().await {
                    if entry.is_pending() || !printed.insert(entry.message.id.clone()) {
                        continue;
                    }
                    let who = if entry.message.sender_id == me {
                        "you".to_string()
                    } else {
                        entry.message.username.clone().unwrap_or_else(|| "them".into())
                    };
                    println!("{:>10} | {}", who, entry.message.text);
                }
                if changes.changed().await.is_err() {
                    break;
                }
            }
        })
    };

    let translator = Translator::new(ctx.config());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/translate" => {
                let messages = stream.messages().await;
                for message in translator.translate_messages(&messages, &me.nationality).await {
                    println!("{:>10} | {}", "~", message.text);
                }
            }
            text => {
                if let Err(e) = stream.send(text).await {
                    warn!("Message not sent: {}", e);
                    eprintln!("(not sent: {})", e);
                }
            }
        }
    }

    stream.close().await;
    printer.abort();
    Ok(())
}
