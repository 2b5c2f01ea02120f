use std::{process, time::Duration};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, LevelFilter};
use url::Url;

use vrcosc_spotify::{
    config::Config,
    dealer,
    error::{ErrorKind, Result},
    http,
    signal,
    token::AccessToken,
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
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Secrets file
    ///
    /// TOML file with an `access_token` entry. Keep this file private: the
    /// token grants access to your Spotify account. The file is read again
    /// on every reconnect and on SIGHUP, so that an external tool can
    /// refresh the token.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("secrets.toml"))]
    secrets_file: String,

    /// Access token
    ///
    /// Takes precedence over the secrets file.
    #[arg(long, env = "SPOTIFY_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<AccessToken>,

    /// Dealer websocket URL
    ///
    /// [default: wss://dealer.spotify.com/]
    #[arg(long, value_hint = ValueHint::Url)]
    dealer_url: Option<Url>,

    /// Web API base URL
    ///
    /// [default: https://api.spotify.com]
    #[arg(long, value_hint = ValueHint::Url)]
    api_url: Option<Url>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
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

/// Builds the configuration from the arguments and the secrets file.
fn load_config(args: &Args) -> Result<Config> {
    let token = match &args.token {
        Some(token) => token.clone(),
        None => AccessToken::from_file(&args.secrets_file).inspect_err(|e| {
            if e.kind == ErrorKind::NotFound {
                info!(
                    "pass --token or set access_token in {}",
                    args.secrets_file
                );
            }
        })?,
    };

    let mut config = Config::with_token(token)?;
    if let Some(dealer_url) = &args.dealer_url {
        config.dealer_url = dealer_url.clone();
    }
    if let Some(api_url) = &args.api_url {
        config.api_url = api_url.clone();
    }

    Ok(config)
}

/// Creates a dealer client and relays its events to the log.
fn new_client(config: &Config) -> Result<dealer::Client> {
    let http_client = http::Client::new(config)?;
    let mut client = dealer::Client::new(config, http_client);

    if let Some(mut events) = client.events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                info!("{event}");
                debug!("trigger {}", event.trigger_name());
            }
        });
    }

    Ok(client)
}

/// Runs one connection until it ends.
async fn connect(client: &mut dealer::Client) -> Result<()> {
    client.start().await?;
    client.join().await;
    Ok(())
}

/// Main application loop.
///
/// # Errors
///
/// Returns an error when the first configuration cannot be loaded or the
/// signal handlers cannot be registered.
async fn run(args: Args) -> Result<()> {
    let mut signals = signal::Handler::new()?;
    let mut client = new_client(&load_config(&args)?)?;

    // Restart after sleeping some duration to prevent accidental denial of
    // service attacks on the Spotify infrastructure. The initial connection
    // happens immediately.
    let restart_timer = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(restart_timer);

    // Main application loop. This restarts the dealer client when it gets
    // disconnected for whatever reason: a network failure on either end,
    // or an expired token. The secrets file is read again before each
    // restart.
    loop {
        tokio::select! {
            // Prioritize shutdown signals.
            biased;

            signal = signals.recv() => {
                info!("received {signal}");
                client.stop().await;

                if signal.is_shutdown() {
                    info!("shutting down gracefully");
                    break Ok(());
                }

                match load_config(&args).and_then(|config| new_client(&config)) {
                    Ok(reloaded) => client = reloaded,
                    Err(e) => error!("{e}"),
                }
                restart_timer.as_mut().reset(tokio::time::Instant::now());
            }

            result = connect(&mut client), if restart_timer.is_elapsed() => {
                if let Err(e) = result {
                    error!("{e}");
                }

                match load_config(&args).and_then(|config| new_client(&config)) {
                    Ok(reloaded) => client = reloaded,
                    Err(e) => error!("{e}"),
                }

                // Sleep with jitter to prevent thundering herds. Subsecond
                // precision further prevents that by spreading requests
                // when users are launching this from some crontab.
                let duration = Duration::from_millis(fastrand::u64(5_000..6_000));
                info!("restarting in {:.1}s", duration.as_secs_f32());
                restart_timer.as_mut().reset(tokio::time::Instant::now() + duration);
            }

            () = &mut restart_timer, if !restart_timer.is_elapsed() => {}
        }
    }
}

/// Main entry point of the application.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more. The token is
    // redacted.
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
