use std::fmt;
use std::path::PathBuf;

use clap::Parser;

use language101::config::{
    DEFAULT_CONFIG_FILE, DEFAULT_COOKIES_FILE, DEFAULT_OUTPUT_DIR, DEFAULT_USER_AGENT_FILE,
};
use language101::pipeline::pacing::{DEFAULT_MAX_DELAY_SECS, DEFAULT_MIN_DELAY_SECS};

/// Scrape full language courses by Innovative Language.
#[derive(Parser)]
#[command(name = "language101", version, about)]
pub struct Args {
    /// URL of the first lesson of the course (must carry `?lp=<id>`)
    #[arg(long)]
    pub url: Option<String>,

    /// Username (email)
    #[arg(short, long, env = "LANGUAGE101_USERNAME")]
    pub username: Option<String>,

    /// Password for the course site
    #[arg(short, long, env = "LANGUAGE101_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Where credentials are stored between runs
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Netscape cookie file reused across runs
    #[arg(long, default_value = DEFAULT_COOKIES_FILE)]
    pub cookies: PathBuf,

    /// File holding your browser's User-Agent string
    #[arg(long, default_value = DEFAULT_USER_AGENT_FILE)]
    pub user_agent_file: PathBuf,

    /// Root directory for downloaded courses
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Minimum pause between lessons in seconds
    #[arg(long, default_value_t = DEFAULT_MIN_DELAY_SECS)]
    pub min_delay: u64,

    /// Maximum pause between lessons in seconds
    #[arg(long, default_value_t = DEFAULT_MAX_DELAY_SECS)]
    pub max_delay: u64,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("config", &self.config)
            .field("cookies", &self.cookies)
            .field("user_agent_file", &self.user_agent_file)
            .field("output", &self.output)
            .field("min_delay", &self.min_delay)
            .field("max_delay", &self.max_delay)
            .field("verbose", &self.verbose)
            .field("quiet", &self.quiet)
            .finish()
    }
}

impl Args {
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
