//! capsule entry point.
//!
//! A line-driven Gemini and Gopher client. Each tab keeps its own history;
//! tabs are saved on exit and restored on the next start. Type `g help://`
//! for the command list. `--debug <url>` fetches a single URL, prints the
//! response header to stderr and the body to stdout, then exits.

mod app_state;
mod commands;
mod render;

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

use app_state::AppState;
use capsule_browser::{Bookmark, Browser, BrowserConfig, Pages, SystemOpener};
use capsule_net::{ClientIdentity, FetchRequest, Fetcher, GeminiClient, NetFetcher};
use capsule_types::Response;
use commands::Flow;

#[derive(Debug, Parser)]
#[command(name = "capsule", about = "Gemini and Gopher client")]
struct Cli {
    /// Config file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `data_dir` from the config.
    #[arg(long = "cache-dir")]
    cache_dir: Option<PathBuf>,

    /// Fetch one URL, dump it and exit.
    #[arg(long)]
    debug: Option<String>,

    /// Re-pin the server certificate when using `--debug`.
    #[arg(long)]
    force: bool,

    /// URLs to open in new tabs.
    urls: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(BrowserConfig::default_path);
    let mut config = BrowserConfig::load(&config_path)?;
    if let Some(dir) = &cli.cache_dir {
        config.data_dir = dir.clone();
    }
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;

    let mut client = GeminiClient::open(&config.certs_path())?;
    if let Some((cert, key)) = config.client_identity_paths() {
        client = client.with_client_identity(ClientIdentity::from_pem_files(cert, key)?);
        log::info!("Using client certificate {}", cert.display());
    }
    log::info!(
        "Loaded {} pinned certificates from {}",
        client.cert_store().len(),
        config.certs_path().display()
    );
    let fetcher = Arc::new(NetFetcher::new(client));

    if let Some(url) = &cli.debug {
        return debug_url(fetcher.as_ref(), url, cli.force, &config).await;
    }

    let pages = Pages::new(config.builtin_links.clone(), Arc::new(Vec::<Bookmark>::new()));
    let mut browser = Browser::new(
        fetcher,
        Arc::new(SystemOpener),
        Arc::new(pages),
        config.tab_settings(),
        &config.home_url,
    );
    let history_path = config.history_path();
    browser.restore_from(&history_path);
    for url in &cli.urls {
        browser.open_tab(url);
    }

    let mut state = AppState::new(browser, history_path);
    if !cli.urls.is_empty() {
        state.active = state.browser.tabs().last().map_or(state.active, |t| t.id());
    }
    shell(&mut state).await?;

    state.browser.save_session(&state.history_path)?;
    log::info!("Saved session to {}", state.history_path.display());
    Ok(())
}

/// Read commands from stdin until EOF or the last tab is closed.
///
/// Fetch results are applied as they arrive, so a slow page never blocks
/// the prompt.
async fn shell(state: &mut AppState) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    state.browser.apply_pending();
    redraw(state)?;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                if commands::process_line(state, &line) == Flow::Quit {
                    return Ok(());
                }
            },
            Some(event) = state.browser.next_event() => state.browser.update(event),
        }
        state.browser.apply_pending();
        redraw(state)?;
    }
}

fn redraw(state: &mut AppState) -> Result<()> {
    print!("{}> ", render::draw(state));
    std::io::stdout().flush()?;
    Ok(())
}

async fn debug_url(fetcher: &NetFetcher, url: &str, force: bool, config: &BrowserConfig) -> Result<()> {
    let url = Url::parse(url).with_context(|| format!("parsing {url}"))?;
    let request = FetchRequest {
        url,
        force_repin: force,
    };
    let timeout = config.tab_settings().fetch_timeout;
    let response = tokio::time::timeout(timeout, fetcher.fetch(&request))
        .await
        .context("request timed out")??;

    match &response {
        Response::Gemini(r) => eprintln!("{} {}", r.header.code(), r.header.meta),
        Response::Gopher(r) => eprintln!("gopher {} ({})", r.url, r.item_type.media_type()),
    }
    std::io::stdout().write_all(response.data())?;
    Ok(())
}
