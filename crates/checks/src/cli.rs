//! Argument groups shared by the check binaries.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser};
use matrix_client::{MatrixClient, MatrixError};
use probe::Severity;

/// Parse the command line, exiting UNKNOWN on usage errors.
///
/// clap's own exit code for bad arguments is 2, which Icinga would read as
/// CRITICAL. Help and version output still exit 0.
pub fn parse_or_unknown<T: Parser>() -> T {
    match T::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(Severity::Unknown.code())
        }
    }
}

/// Parse a non-negative number of seconds, e.g. `90` or `2.5`.
pub fn parse_seconds(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("`{value}`: {e}"))
}

/// Parse `true`/`false` exactly, as Icinga passes booleans as strings.
pub fn parse_bool_flag(value: &str) -> Result<bool, String> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("expected `true` or `false`, got `{other}`")),
    }
}

/// Icinga may pass a repeated list as one space-separated string. Split a
/// single entry on whitespace; leave real lists alone.
pub fn split_single(values: Vec<String>) -> Vec<String> {
    if values.len() == 1 {
        values[0].split_whitespace().map(str::to_string).collect()
    } else {
        values
    }
}

#[derive(Debug, Clone, Args)]
pub struct Verbosity {
    /// Log debug output to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Verbosity {
    pub fn init_logging(&self) {
        probe::logging::init(self.verbose);
    }
}

/// Request timeout, default 90 seconds.
#[derive(Debug, Clone, Args)]
pub struct TimeoutArg {
    /// Request timeout limit in seconds
    #[arg(long, default_value = "90", value_parser = parse_seconds)]
    pub timeout: Duration,
}

/// Login details for one bot account.
#[derive(Debug, Clone, Args)]
pub struct BotArgs {
    /// User ID for the bot
    #[arg(long)]
    pub user: String,

    /// Password for the bot
    #[arg(long, env = "MATRIX_BOT_PW", hide_env_values = true)]
    pub pw: String,

    /// Homeserver of the bot
    #[arg(long)]
    pub hs: String,

    /// File to cache the bot's login details to
    #[arg(long)]
    pub auth_file: Option<PathBuf>,
}

impl BotArgs {
    pub async fn login(&self, timeout: Option<Duration>) -> Result<MatrixClient, MatrixError> {
        login(&self.hs, &self.user, &self.pw, self.auth_file.as_deref(), timeout).await
    }
}

/// Log in, going through the credential cache when one is given. With a
/// `timeout`, every later homeserver call of the session is bounded by it.
pub async fn login(
    homeserver: &str,
    user: &str,
    password: &str,
    auth_file: Option<&std::path::Path>,
    timeout: Option<Duration>,
) -> Result<MatrixClient, MatrixError> {
    let client = match auth_file {
        Some(path) => MatrixClient::login_cached(homeserver, user, password, path).await?,
        None => MatrixClient::login(homeserver, user, password).await?,
    };
    match timeout {
        Some(timeout) => client.with_request_timeout(timeout),
        None => Ok(client),
    }
}
