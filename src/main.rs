use std::{error::Error, path::Path, process, sync::Arc, time::Duration};

use clap::{command, Parser, Subcommand, ValueHint};
use log::{debug, error, info, warn, LevelFilter};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{mpsc, oneshot},
};

use plexer::{
    account::Account,
    config::Config,
    events::Event,
    http,
    output::RodioOutput,
    player::{Command, Player, Status},
    protocol::{
        account::Resource,
        library::{Item, Track},
    },
    resolver::{self, Resolved, Resolver},
    server::{MediaServer, Page},
    shuffle::Source,
    store::{FileStore, Store},
    token::AuthToken,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Secrets file
    ///
    /// Holds the access token after `login`. Keep this file private: anyone
    /// with the token has full access to your Plex account.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, env = "PLEXER_SECRETS_FILE", default_value_t = String::from("secrets.toml"))]
    secrets_file: String,

    /// State file
    ///
    /// Remembers which address of each server worked last time, so that
    /// connecting is quick.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, env = "PLEXER_STATE_FILE", default_value_t = String::from("state.toml"))]
    state_file: String,

    /// Player's name
    ///
    /// Set the player's name as it appears in your Plex account.
    ///
    /// [default: system hostname]
    #[arg(short, long, value_hint = ValueHint::Hostname)]
    name: Option<String>,

    /// Server to use, by name or identifier
    ///
    /// [default: the first server of the account]
    #[arg(short = 'S', long, env = "PLEXER_SERVER")]
    server: Option<String>,

    /// Seconds to wait for a server address to answer
    #[arg(long, value_name = "SECS", default_value_t = Config::PROBE_TIMEOUT.as_secs())]
    probe_timeout: u64,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    command: Action,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
enum Action {
    /// Pair this player with a Plex account
    Login,

    /// Forget the access token
    Logout {
        /// Also forget the remembered server addresses
        #[arg(long, default_value_t = false)]
        forget_servers: bool,
    },

    /// List the servers of the account
    Servers,

    /// List the libraries of a server, or the artists of one of them
    Libraries {
        /// Library section to list artists of
        section: Option<String>,

        /// List the albums of this artist instead
        #[arg(short, long, value_name = "KEY", requires = "section")]
        artist: Option<String>,

        /// Only list artists whose name contains this
        #[arg(short, long)]
        filter: Option<String>,

        /// Page to list, starting at 1
        #[arg(short, long, default_value_t = 1)]
        page: usize,
    },

    /// Search a server for artists, albums and tracks
    Search { query: String },

    /// Play the best match for a search
    ///
    /// An artist plays all of their tracks, an album plays in track order
    /// and a track plays along with the other matching tracks.
    Play { query: String },

    /// Play random tracks from a music library, without end
    Shuffle {
        /// Library section to shuffle
        ///
        /// [default: the first music library]
        section: Option<String>,
    },
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            // Quiet and verbose are mutually exclusive, so this is quiet mode.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Loads the access token, pointing at `login` if there is none.
fn load_token(secrets_file: &str) -> plexer::error::Result<AuthToken> {
    let token = AuthToken::from_file(secrets_file);

    if let Err(ref e) = token {
        if e.kind == plexer::error::ErrorKind::NotFound {
            info!("no access token in {secrets_file}; run `login` first");
        }
    }

    token
}

/// Everything needed to talk to one server.
struct Context {
    http_client: Arc<http::Client>,
    server: Arc<MediaServer>,
    resolved: Resolved,
}

impl Context {
    async fn connect(args: &Args, config: &Config) -> Result<Self, Box<dyn Error>> {
        let token = load_token(&args.secrets_file)?;
        let http_client = Arc::new(http::Client::new(config)?);
        let account = Account::new(Arc::clone(&http_client))?;

        let servers = account.servers(&token).await?;
        let resource = pick_server(&servers, args.server.as_deref())?;

        let store: Arc<dyn Store> = Arc::new(FileStore::open(&args.state_file)?);
        let server = Arc::new(MediaServer::new(Arc::clone(&http_client)));
        let resolver = Resolver::new(Arc::clone(&server), store, config.probe_timeout);

        let resolved = resolver.resolve(resource, &token).await?;
        info!("connected to {}", resolved.connection);

        Ok(Self {
            http_client,
            server,
            resolved,
        })
    }

    /// The music section with key `section`, or the first one.
    fn music_section(&self, section: Option<&str>) -> Result<String, Box<dyn Error>> {
        let mut music = self.resolved.sections.iter().filter(|s| s.is_music());
        let found = match section {
            Some(key) => music.find(|s| s.key == key || s.title == key),
            None => music.next(),
        };
        found
            .map(|s| s.key.clone())
            .ok_or_else(|| "no such music library".into())
    }
}

fn pick_server<'a>(
    servers: &'a [Resource],
    wanted: Option<&str>,
) -> Result<&'a Resource, Box<dyn Error>> {
    let found = match wanted {
        Some(wanted) => servers
            .iter()
            .find(|s| s.name == wanted || s.client_identifier == wanted),
        None => servers.first(),
    };
    found.ok_or_else(|| match wanted {
        Some(wanted) => format!("no server named {wanted}").into(),
        None => "the account has no servers".into(),
    })
}

async fn login(args: &Args, config: &Config) -> Result<(), Box<dyn Error>> {
    let http_client = Arc::new(http::Client::new(config)?);
    let account = Account::new(http_client)?;

    let pin = account.create_pin().await?;
    println!("To pair {}, go to https://plex.tv/link and enter: {}", config.device_name, pin.code);

    let token = account.wait_for_token(&pin).await?;
    token.to_file(&args.secrets_file)?;
    info!("access token saved to {}", args.secrets_file);
    Ok(())
}

fn logout(args: &Args, forget_servers: bool) -> Result<(), Box<dyn Error>> {
    AuthToken::remove_file(&args.secrets_file)?;
    if forget_servers && Path::new(&args.state_file).exists() {
        std::fs::remove_file(&args.state_file)?;
    }
    info!("signed out");
    Ok(())
}

async fn servers(args: &Args, config: &Config) -> Result<(), Box<dyn Error>> {
    let token = load_token(&args.secrets_file)?;
    let http_client = Arc::new(http::Client::new(config)?);
    let account = Account::new(http_client)?;
    let store = FileStore::open(&args.state_file)?;

    for server in account.servers(&token).await? {
        let secure = server.connections.iter().filter(|c| c.is_secure()).count();
        let last = store
            .get(&resolver::cache_key(&server.client_identifier))?
            .unwrap_or_else(|| String::from("-"));
        println!(
            "{}\t{}\t{secure}/{} secure\tlast used: {last}",
            server.client_identifier,
            server.name,
            server.connections.len(),
        );
    }
    Ok(())
}

async fn libraries(
    context: &Context,
    section: Option<&str>,
    filter: Option<&str>,
    page: Page,
) -> Result<(), Box<dyn Error>> {
    let Some(section) = section else {
        for section in &context.resolved.sections {
            println!("{}\t{}\t{}", section.key, section.typ, section.title);
        }
        return Ok(());
    };

    let artists = context
        .server
        .artists(&context.resolved.connection, section, page, filter)
        .await?;
    for artist in artists {
        println!("{}\t{}", artist.rating_key, artist.title);
    }
    Ok(())
}

async fn albums(
    context: &Context,
    section: &str,
    artist: &str,
    page: Page,
) -> Result<(), Box<dyn Error>> {
    let albums = context
        .server
        .artist_albums(&context.resolved.connection, section, artist, page)
        .await?;
    for album in albums {
        let year = album.year.map(|year| year.to_string()).unwrap_or_default();
        println!("{}\t{year}\t{}", album.rating_key, album.title);
    }
    Ok(())
}

async fn search(context: &Context, query: &str) -> Result<(), Box<dyn Error>> {
    for item in context
        .server
        .search(&context.resolved.connection, query)
        .await?
    {
        match item {
            Item::Artist(artist) => println!("artist\t{}", artist.title),
            Item::Album(album) => println!(
                "album\t{} - {}",
                album.parent_title.as_deref().unwrap_or("Unknown"),
                album.title
            ),
            Item::Track(track) => println!("track\t{track}"),
            Item::Other => {}
        }
    }
    Ok(())
}

/// The tracks to play for the best match of `query`.
async fn tracks_for(
    context: &Context,
    query: &str,
) -> Result<(Vec<Track>, Option<u64>), Box<dyn Error>> {
    let connection = &context.resolved.connection;
    let items = context.server.search(connection, query).await?;

    let best = items
        .iter()
        .find(|item| !matches!(item, Item::Other))
        .cloned();

    match best {
        Some(Item::Artist(artist)) => {
            info!("playing artist {}", artist.title);
            let tracks = context
                .server
                .artist_tracks(connection, &artist.rating_key)
                .await?;
            Ok((tracks, artist.library_section_id))
        }
        Some(Item::Album(album)) => {
            info!("playing album {}", album.title);
            let section = album
                .library_section_id
                .ok_or("album is not in a library")?
                .to_string();
            let tracks = context
                .server
                .album_tracks(connection, &section, &album.rating_key)
                .await?;
            Ok((tracks, album.library_section_id))
        }
        Some(Item::Track(first)) => {
            info!("playing {first} and other matching tracks");
            let section = first.library_section_id;
            let tracks = items
                .into_iter()
                .filter_map(|item| match item {
                    Item::Track(track) => Some(track),
                    _ => None,
                })
                .collect();
            Ok((tracks, section))
        }
        Some(Item::Other) | None => Err(format!("nothing found for {query}").into()),
    }
}

/// Parses one line of player input into commands for the player.
///
/// Queue positions are 1-based for the user and checked against the queue
/// before they reach the player.
async fn control(
    line: &str,
    command_tx: &mpsc::UnboundedSender<Command>,
) -> Result<bool, Box<dyn Error + Send + Sync>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(true);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb, args.as_slice()) {
        ("q" | "quit", []) => return Ok(false),
        ("p" | "toggle", []) => Command::TogglePlay,
        ("play", []) => Command::Play,
        ("pause", []) => Command::Pause,
        ("n" | "next", []) => Command::Next,
        ("b" | "prev", []) => Command::Previous,
        ("clear", []) => Command::Clear,
        ("shuffle", ["off"]) => Command::DisableShuffle,
        ("shuffle", []) => Command::ShuffleAll,
        ("disconnect", []) => Command::Disconnect {
            retain_queue: false,
        },
        ("disconnect", ["keep"]) => Command::Disconnect { retain_queue: true },
        ("seek", [secs]) => Command::Seek(Duration::from_secs(secs.parse()?)),
        ("status" | "s", []) => {
            print_status(&status(command_tx).await?);
            return Ok(true);
        }
        ("jump", [n]) => Command::JumpTo(position(n, command_tx).await?),
        ("rm", [n]) => Command::Remove(position(n, command_tx).await?),
        ("mv", [from, to]) => Command::Reorder {
            from: position(from, command_tx).await?,
            to: position(to, command_tx).await?,
        },
        _ => {
            println!(
                "commands: p(toggle) play pause n(ext) b(prev) jump N rm N mv A B clear \
                 seek SECS shuffle [off] s(tatus) disconnect [keep] q(uit)"
            );
            return Ok(true);
        }
    };

    command_tx.send(command)?;
    Ok(true)
}

async fn status(
    command_tx: &mpsc::UnboundedSender<Command>,
) -> Result<Status, Box<dyn Error + Send + Sync>> {
    let (reply_tx, reply_rx) = oneshot::channel();
    command_tx.send(Command::Status(reply_tx))?;
    Ok(reply_rx.await?)
}

/// Converts a 1-based queue position as typed into an index.
async fn position(
    word: &str,
    command_tx: &mpsc::UnboundedSender<Command>,
) -> Result<usize, Box<dyn Error + Send + Sync>> {
    let len = status(command_tx).await?.queue.len();
    match word.parse::<usize>()? {
        n @ 1.. if n <= len => Ok(n - 1),
        n => Err(format!("{n} is not a position in the queue of {len}").into()),
    }
}

fn print_status(status: &Status) {
    let cursor = status.queue.cursor();
    for (index, item) in status.queue.items().iter().enumerate() {
        let marker = if Some(index) == cursor { '>' } else { ' ' };
        println!("{marker}{:>3} {}", index + 1, item.track);
    }

    let state = if status.playing { "playing" } else { "paused" };
    match status.duration {
        Some(duration) => println!(
            "{state} ({:?}) {}s of {}s, shuffle {}",
            status.state,
            status.elapsed.as_secs(),
            duration.as_secs(),
            if status.shuffle { "on" } else { "off" },
        ),
        None => println!("{state} ({:?}), shuffle {}", status.state, status.shuffle),
    }

    if let Some(art) = status
        .queue
        .current()
        .and_then(|item| item.track.artwork().map(|path| (item, path)))
        .and_then(|(item, path)| MediaServer::transcode_url(&item.connection, path, 300, 300).ok())
    {
        debug!("artwork: {art}");
    }
}

/// Reads player input until the user quits or input ends.
async fn read_input(command_tx: mpsc::UnboundedSender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match control(&line, &command_tx).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => warn!("{e}"),
            },
            Ok(None) => break,
            Err(e) => {
                error!("failed reading input: {e}");
                break;
            }
        }
    }
}

/// Runs a player on `source` until the user quits or interrupts.
async fn play(
    context: &Context,
    source: Source,
    first: Command,
) -> Result<(), Box<dyn Error>> {
    let output = RodioOutput::new(&context.http_client)?;
    let mut player = Player::new(output, Arc::clone(&context.server));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    player.register(event_tx);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                Event::PlaybackFailed => warn!("track could not be played"),
                event => debug!("{event:?}"),
            }
        }
    });

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    command_tx.send(Command::Connect(source))?;
    command_tx.send(first)?;
    tokio::spawn(read_input(command_tx));

    tokio::select! {
        // Prioritize shutdown signals.
        biased;

        _ = tokio::signal::ctrl_c() => info!("shutting down gracefully"),

        () = player.run(command_rx) => {}
    }

    Ok(())
}

/// Main application flow.
///
/// # Errors
///
/// This function returns an error when the chosen action fails, for example
/// because there is no access token or no address of the server answered.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut config = Config::new();
    config.device_name = args
        .name
        .clone()
        .or_else(sysinfo::System::host_name)
        .unwrap_or_else(|| config.app_name.clone());
    config.probe_timeout = Duration::from_secs(args.probe_timeout);

    match &args.command {
        Action::Login => login(&args, &config).await,
        Action::Logout { forget_servers } => logout(&args, *forget_servers),
        Action::Servers => servers(&args, &config).await,
        Action::Libraries {
            section,
            artist,
            filter,
            page,
        } => {
            let context = Context::connect(&args, &config).await?;
            let page = Page::new(page.saturating_sub(1) * Page::DEFAULT_SIZE, Page::DEFAULT_SIZE);
            match (section, artist) {
                (Some(section), Some(artist)) => {
                    albums(&context, section, artist, page).await
                }
                _ => libraries(&context, section.as_deref(), filter.as_deref(), page).await,
            }
        }
        Action::Search { query } => {
            let context = Context::connect(&args, &config).await?;
            search(&context, query).await
        }
        Action::Play { query } => {
            let context = Context::connect(&args, &config).await?;
            let (tracks, section) = tracks_for(&context, query).await?;
            let section = match section {
                Some(section) => section.to_string(),
                None => context.music_section(None)?,
            };
            let source = Source {
                connection: context.resolved.connection.clone(),
                section,
            };
            play(&context, source, Command::PlayTracks { tracks, start: 0 }).await
        }
        Action::Shuffle { section } => {
            let context = Context::connect(&args, &config).await?;
            let source = Source {
                connection: context.resolved.connection.clone(),
                section: context.music_section(section.as_deref())?,
            };
            play(&context, source, Command::ShuffleAll).await
        }
    }
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and runs the chosen action.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
