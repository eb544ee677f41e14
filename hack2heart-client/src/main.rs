use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use hack2heart_client::{
    ApiError, App, AuthOutcome, ClientConfig, ConfigError, GithubIdentity, RealtimeError,
    SessionError,
    config::default_data_dir,
    session::{clear_session_file, load_session_from_path, save_session_to_path},
};
use hack2heart_core::{
    ChatMessage, CodeId, CoreError, DEFAULT_API_URL, DEFAULT_WS_URL, Gender, NewProfile, ReactionType,
    SnippetKey,
    host::{InboundMessage, OutboundMessage},
    pinned::{DropTarget, PinnedBoard},
    view::View,
};
use tokio::sync::mpsc;
use tracing::{debug, error};

#[derive(Parser, Debug)]
#[command(name = "hack2heart", about = "Terminal client for the hack2heart service")]
struct Cli {
    #[arg(long, env = "H2H_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,
    #[arg(long, env = "H2H_WS_URL", default_value = DEFAULT_WS_URL)]
    ws_url: String,
    /// Directory holding the session file.
    #[arg(long, env = "H2H_DATA_DIR")]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Exchange a GitHub identity for a service session.
    Login {
        #[arg(long)]
        github_id: String,
        #[arg(long)]
        github_name: String,
        #[arg(long, env = "H2H_GITHUB_TOKEN", hide_env_values = true)]
        github_token: String,
        #[arg(long)]
        email: Option<String>,
    },
    Logout,
    Whoami,
    /// Create the profile for a new account, or replace the current one.
    Profile {
        #[arg(long)]
        name: String,
        /// male, female or other.
        #[arg(long)]
        gender: Gender,
        /// YYYY-MM-DD.
        #[arg(long)]
        birth_date: NaiveDate,
        #[arg(long)]
        language: String,
        #[arg(long)]
        package: String,
        #[arg(long)]
        avatar_id: Option<i64>,
        #[arg(long)]
        love: bool,
        #[arg(long)]
        friend: bool,
        #[arg(long)]
        coworker: bool,
        /// Repeat for each fact.
        #[arg(long = "tmi")]
        tmis: Vec<String>,
    },
    /// Show the pinned board: slots, then the pool.
    Codes {
        /// Only fetch pinned (true) or unpinned (false) snippets.
        #[arg(long)]
        pinned: Option<bool>,
    },
    /// Pin a snippet into slot N (1-based), adding slots as needed.
    Pin { code_id: CodeId, slot: usize },
    Unpin { code_id: CodeId },
    RemoveSlot { slot: usize },
    Delete { code_id: CodeId },
    Upload {
        file: PathBuf,
        #[arg(long)]
        analyze: bool,
    },
    /// Show the current recommendation.
    Explore,
    React { reaction: ReactionType },
    Chat {
        room: String,
        #[arg(long)]
        send: Option<String>,
        /// Keep printing new messages until the socket closes.
        #[arg(long)]
        follow: bool,
    },
    /// Resolve a view identifier the way the host router does.
    View { identifier: String },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("not signed in with a registered profile; run `hack2heart login` first")]
    NotSignedIn,
    #[error("{0}")]
    Usage(String),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = ClientConfig {
        api_url: cli.api_url,
        ws_url: cli.ws_url,
        data_dir: cli.data_dir.unwrap_or_else(default_data_dir),
    };
    config.validate()?;

    let session_path = config.session_path();
    let session = load_session_from_path(&session_path)?;
    let (mut app, mut host_rx) = App::new(config, session.clone());
    app.handle_host_message(InboundMessage::SessionInfo { session });

    let result = dispatch(&mut app, cli.command).await;
    flush_host_messages(&mut host_rx);
    result
}

async fn dispatch(app: &mut App, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login {
            github_id,
            github_name,
            github_token,
            email,
        } => {
            let identity = GithubIdentity {
                id: github_id,
                label: github_name,
                email,
                access_token: github_token,
            };
            let outcome = app.authenticate(identity).await?;
            if let Some(session) = app.session().current() {
                save_session_to_path(&app.config().session_path(), &session)?;
            }
            match outcome {
                AuthOutcome::Registered { .. } => println!("signed in"),
                AuthOutcome::ProfileRequired => {
                    println!("signed in; create a profile to finish registration")
                }
            }
        }
        Command::Logout => {
            clear_session_file(&app.config().session_path())?;
            app.handle_host_message(InboundMessage::SessionInfo { session: None });
            println!("signed out");
        }
        Command::Profile {
            name,
            gender,
            birth_date,
            language,
            package,
            avatar_id,
            love,
            friend,
            coworker,
            tmis,
        } => {
            if app.session().current().is_none() {
                return Err(CliError::NotSignedIn);
            }
            let profile = NewProfile {
                name,
                gender,
                birth_date,
                avatar_id,
                most_preferred_language: language,
                most_preferred_package: package,
                looking_for_love: love,
                looking_for_friend: friend,
                looking_for_coworker: coworker,
                tmis,
            };
            let user = app.complete_profile(&profile).await?;
            if let Some(session) = app.session().current() {
                save_session_to_path(&app.config().session_path(), &session)?;
            }
            println!("profile saved for {} (#{})", user.name, user.id);
        }
        Command::Whoami => {
            let Some(session) = app.session().current() else {
                println!("not signed in");
                return Ok(());
            };
            if !session.is_registered() {
                println!(
                    "{} (profile not created)",
                    session.github_name.as_deref().unwrap_or("unknown")
                );
                return Ok(());
            }
            let me = app.api().me().await?;
            let age = me.age_on(Utc::now().date_naive());
            println!("{} (#{}), {age}", me.name, me.id);
            println!("  {} / {}", me.most_preferred_language, me.most_preferred_package);
        }
        Command::Codes { pinned } => {
            require_registered(app)?;
            let mut screen = app.my_code_screen();
            screen.load(pinned).await?;
            print_board(screen.board());
        }
        Command::Pin { code_id, slot } => {
            require_registered(app)?;
            let mut screen = app.my_code_screen();
            screen.load(None).await?;
            let max = screen.board().max_slots();
            if slot == 0 || slot > max {
                return Err(CliError::Usage(format!("slot must be between 1 and {max}")));
            }
            while screen.board().slots().len() < slot && screen.add_slot() {}
            let target = screen.board().slots()[slot - 1].id;
            let key = SnippetKey::new(code_id);
            if screen.board().snippet(key).is_none() {
                return Err(CliError::Usage(format!("no snippet {key}")));
            }
            screen.move_snippet(key, DropTarget::Slot(target)).await?;
            print_board(screen.board());
        }
        Command::Unpin { code_id } => {
            require_registered(app)?;
            let mut screen = app.my_code_screen();
            screen.load(None).await?;
            let key = SnippetKey::new(code_id);
            if !screen.move_snippet(key, DropTarget::Pool).await? {
                println!("{key} is not pinned");
            }
            print_board(screen.board());
        }
        Command::RemoveSlot { slot } => {
            require_registered(app)?;
            let mut screen = app.my_code_screen();
            screen.load(None).await?;
            let Some(target) = slot
                .checked_sub(1)
                .and_then(|index| screen.board().slots().get(index))
                .map(|slot| slot.id)
            else {
                return Err(CliError::Usage(format!("no slot {slot}")));
            };
            screen.remove_slot(target).await?;
            print_board(screen.board());
        }
        Command::Delete { code_id } => {
            require_registered(app)?;
            let mut screen = app.my_code_screen();
            screen.load(None).await?;
            let key = SnippetKey::new(code_id);
            match screen.delete(key).await {
                Some(_) => println!("deleted {key}"),
                None => println!("no snippet {key}"),
            }
        }
        Command::Upload { file, analyze } => {
            require_registered(app)?;
            let content = std::fs::read_to_string(&file).map_err(|source| CliError::ReadFile {
                path: file.clone(),
                source,
            })?;
            let mut screen = app.upload_screen();
            screen.set_draft(content);
            if analyze {
                println!("{}", screen.analyze().await?);
            }
            let receipt = screen.upload().await?;
            match (receipt.created, receipt.code) {
                (true, Some(code)) => println!("uploaded {}", code.key()),
                (true, None) => println!("uploaded"),
                (false, _) => println!("upload accepted without creating a snippet"),
            }
        }
        Command::Explore => {
            require_registered(app)?;
            let mut screen = app.explore_screen();
            screen.load().await?;
            let Some(candidate) = screen.current() else {
                println!("no recommendations");
                return Ok(());
            };
            let user = &candidate.user;
            println!(
                "{} (#{}), {}",
                user.name,
                user.id,
                user.age_on(Utc::now().date_naive())
            );
            println!("  {} / {}", user.most_preferred_language, user.most_preferred_package);
            for tmi in &user.tmis {
                println!("  - {}", tmi.name);
            }
            for code in screen.candidate_codes().await? {
                let card = code.card();
                println!("  {}  {} ({} chars)", card.key, card.title, card.length);
            }
        }
        Command::React { reaction } => {
            require_registered(app)?;
            let mut screen = app.explore_screen();
            screen.load().await?;
            match screen.react(reaction).await {
                Some(user_id) => println!("{} #{user_id}", reaction.as_str()),
                None => println!("no recommendations"),
            }
            if let Some(next) = screen.current() {
                println!("next: {} (#{})", next.user.name, next.user.id);
            }
        }
        Command::Chat { room, send, follow } => {
            require_registered(app)?;
            app.open(View::Chat, Some(serde_json::json!({ "chatroom_id": room })));
            let mut screen = app.chat_screen(&room);
            screen.load().await?;

            let mut channel = if follow {
                let channel = app.connect_realtime().await?;
                screen.attach(&channel);
                Some(channel)
            } else {
                None
            };

            if let Some(draft) = send {
                screen.send(&draft).await?;
            }
            for message in screen.messages() {
                print_message(message);
            }

            if let Some(channel) = channel.as_mut() {
                while let Some(message) = screen.next_incoming().await {
                    print_message(message);
                }
                channel.close().await;
            }
        }
        Command::View { identifier } => {
            app.handle_host_message(InboundMessage::UpdateContent {
                content_type: identifier,
                options: None,
            });
            let view = app.current_view();
            app.open(view, None);
            println!("{} ({:?}): {}", view.identifier(), view.surface(), view.title());
        }
    }
    Ok(())
}

fn require_registered(app: &App) -> Result<(), CliError> {
    if app.session().bearer_token().is_none() {
        return Err(CliError::NotSignedIn);
    }
    Ok(())
}

fn print_board(board: &PinnedBoard) {
    for (position, slot) in board.slots().iter().enumerate() {
        match slot.assigned.and_then(|key| board.card(key)) {
            Some(card) => println!(
                "{}. {}  {}  {} ({} chars)",
                position + 1,
                slot.id,
                card.key,
                card.title,
                card.length
            ),
            None => println!("{}. {}  (empty)", position + 1, slot.id),
        }
    }
    for key in board.pool() {
        if let Some(card) = board.card(*key) {
            println!("-  {}  {} ({} chars)", card.key, card.title, card.length);
        }
    }
}

fn print_message(message: &ChatMessage) {
    println!(
        "[{}] #{}: {}",
        message.created_at.format("%Y-%m-%d %H:%M"),
        message.user_id,
        message.content
    );
}

fn flush_host_messages(host_rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) {
    while let Ok(message) = host_rx.try_recv() {
        match message {
            OutboundMessage::Alert { text } => println!("{text}"),
            other => debug!(?other, "host message"),
        }
    }
}
