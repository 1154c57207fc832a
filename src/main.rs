use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use course_video_fetcher::{run_job, Config, RunInputs, TracingSink};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("Course Video Fetcher")
        .version("0.1.0")
        .author("TigreRoll")
        .about("Downloads recorded lesson videos listed in a course catalog")
        .arg(
            Arg::new("catalog")
                .short('c')
                .long("catalog")
                .value_name("CSV")
                .help("Course catalog exported from the console")
                .required(true)
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Directory the videos are saved to")
                .default_value("./downloads")
        )
        .arg(
            Arg::new("cookie")
                .long("cookie")
                .value_name("STR")
                .help("Cookie header copied from a logged-in browser session")
                .conflicts_with("cookie-file")
        )
        .arg(
            Arg::new("cookie-file")
                .long("cookie-file")
                .value_name("FILE")
                .help("File containing the cookie header")
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("NUM")
                .help("Number of courses processed at once")
                .value_parser(clap::value_parser!(usize))
        )
        .arg(
            Arg::new("headless")
                .long("headless")
                .help("Run the browser without a window")
                .action(ArgAction::SetTrue)
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
        )
        .arg(
            Arg::new("report")
                .long("report")
                .value_name("FILE")
                .help("Write a JSON run report to FILE")
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue)
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    let default_filter = if verbose {
        "course_video_fetcher=debug,warn"
    } else {
        "course_video_fetcher=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(&PathBuf::from(path))?,
        None => Config::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {:#}", e);
            Config::default()
        }),
    };
    if let Some(workers) = matches.get_one::<usize>("workers") {
        config.pipeline.max_workers = *workers;
    }
    if matches.get_flag("headless") {
        config.browser.headless = true;
    }
    config.validate()?;

    let cookie = match (
        matches.get_one::<String>("cookie"),
        matches.get_one::<String>("cookie-file"),
    ) {
        (Some(cookie), _) => cookie.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading cookie file {}", path))?
            .trim()
            .to_string(),
        (None, None) => std::env::var("COURSE_FETCHER_COOKIE").map_err(|_| {
            anyhow!("a cookie is required: pass --cookie, --cookie-file or set COURSE_FETCHER_COOKIE")
        })?,
    };

    let inputs = RunInputs::new(
        matches.get_one::<String>("catalog").cloned().unwrap_or_default(),
        cookie,
        matches.get_one::<String>("output").cloned().unwrap_or_default(),
    );

    info!("🚀 Course Video Fetcher starting...");
    info!("📄 Catalog: {}", inputs.catalog_path.display());
    info!("📂 Output directory: {}", inputs.destination_dir.display());
    if verbose {
        info!("{}", config.summary());
    }

    let summary = run_job(&inputs, &config, Arc::new(TracingSink)).await?;

    if let Some(report) = matches.get_one::<String>("report") {
        summary.save(&PathBuf::from(report)).await?;
    }

    info!("🎉 Run completed in {:.2}s", summary.total_time.as_secs_f64());
    info!("✅ Downloaded: {}", summary.videos_downloaded);
    info!("❌ Failed: {}", summary.videos_failed);
    if summary.courses_failed > 0 {
        warn!("{} courses could not be read", summary.courses_failed);
    }
    if summary.dispatch_aborted {
        warn!(
            "Only {} of {} courses were started",
            summary.courses_dispatched, summary.courses_total
        );
    }

    Ok(())
}
