mod cli;

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use language101::config::{self, LocalFiles, RunConfig};
use language101::{RandomPacing, RunSummary, run_course};
use tracing::{debug, error, info};

use cli::Args;

const URL_PROMPT: &str = "Please insert first lesson URL of the desired course, for example:\n\
    * https://www.japanesepod101.com/lesson/lower-beginner-1-a-formal-japanese-introduction/?lp=116\n\
    * https://www.spanishpod101.com/lesson/basic-bootcamp-1-a-pleasure-to-meet-you/?lp=425\n\
    * https://www.chineseclass101.com/lesson/absolute-beginner-1-meeting-whats-your-name/?lp=208\n";

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(summary) => {
            info!(
                lessons = summary.lessons_total,
                processed = summary.processed,
                skipped = summary.skipped,
                "Yatta! Finished downloading the course~"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            if e
                .downcast_ref::<language101::PipelineError>()
                .is_some_and(language101::PipelineError::is_captcha)
            {
                error!("Lessons unavailable, the site wants a captcha. Wait a while and rerun.");
            }
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<RunSummary> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    let credentials = config::resolve_credentials(
        args.username,
        args.password,
        &args.config,
        &mut input,
        &mut output,
    )
    .context("reading credentials")?;

    let course_url = match args.url {
        Some(url) => url,
        None => config::prompt(&mut input, &mut output, URL_PROMPT).context("reading course URL")?,
    };
    drop(input);

    let files = LocalFiles {
        cookies: args.cookies,
        user_agent: args.user_agent_file,
        output_root: args.output,
    };
    let run_config = RunConfig::new(credentials, &course_url, files)?;
    info!(
        origin = %run_config.origin,
        course = %run_config.course_id,
        dir = %run_config.course_dir().display(),
        "Establishing a new session"
    );

    let pacing = RandomPacing::new(args.min_delay, args.max_delay);
    Ok(run_course(&run_config, Box::new(pacing)).await?)
}
