use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use scraper::Html;
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use portal_mapper::config::Settings;
use portal_mapper::fetch::{self, Fetcher};
use portal_mapper::portal;
use portal_mapper::{map_document, ContentModel, MapOptions};

#[derive(Parser)]
#[command(name = "portal_mapper", about = "Map legacy registrar portal pages to structured JSON")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Map saved pages to content models
    Map {
        /// Saved HTML pages
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// URL the pages were saved from (routing hint and link base)
        #[arg(long)]
        url: Option<String>,
        /// Charset to try before the fallback chain
        #[arg(long)]
        encoding: Option<String>,
    },
    /// Print the portal side menu as sections of links
    Menu {
        file: PathBuf,
        /// URL of the portal home page
        #[arg(long)]
        url: String,
    },
    /// Print the student profile
    Profile {
        file: PathBuf,
        /// Base for announcement links (default: the file itself)
        #[arg(long)]
        url: Option<String>,
    },
    /// Print the class timetable and student info
    Timetable { file: PathBuf },
    /// Fetch a live page through the throttled fetcher and map it
    Fetch {
        url: String,
        /// Print the sanitized HTML instead of the model
        #[arg(long)]
        raw: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_level.as_str().into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Map {
            files,
            url,
            encoding,
        } => {
            let base = url.as_deref().map(Url::parse).transpose().context("parsing --url")?;
            let models = map_files(&files, base.as_ref(), encoding.as_deref())?;
            if files.len() == 1 {
                match models.into_iter().next() {
                    Some(model) => print_json(&model),
                    None => bail!("could not map {}", files[0].display()),
                }
            } else {
                print_json(&models)
            }
        }
        Commands::Menu { file, url } => {
            let page_url = Url::parse(&url).context("parsing --url")?;
            let doc = read_document(&file, None)?;
            print_json(&portal::scrape_menu(&doc, &page_url))
        }
        Commands::Profile { file, url } => {
            let base = match url {
                Some(url) => Url::parse(&url).context("parsing --url")?,
                None => file_url(&file)?,
            };
            let doc = read_document(&file, None)?;
            print_json(&portal::scrape_profile(&doc, &base))
        }
        Commands::Timetable { file } => {
            let doc = read_document(&file, None)?;
            match portal::scrape_timetable(&doc) {
                Some(timetable) => print_json(&timetable),
                None => bail!("no class timetable found in {}", file.display()),
            }
        }
        Commands::Fetch { url, raw } => {
            let fetcher = Fetcher::new(&settings)?;
            let page = fetcher
                .load(&url)
                .await
                .with_context(|| format!("fetching {url}"))?;
            if raw {
                println!("{}", page.html);
                Ok(())
            } else {
                let model = map_document(&page.document(), &MapOptions::with_url(page.url.clone()));
                print_json(&model)
            }
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        info!("done in {}", format_duration(elapsed));
    }

    result
}

fn read_document(path: &Path, encoding: Option<&str>) -> anyhow::Result<Html> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let decoded = fetch::decode(&bytes, encoding);
    Ok(Html::parse_document(&decoded.text))
}

fn file_url(path: &Path) -> anyhow::Result<Url> {
    let absolute = std::fs::canonicalize(path)
        .with_context(|| format!("resolving {}", path.display()))?;
    match Url::from_file_path(&absolute) {
        Ok(url) => Ok(url),
        Err(()) => bail!("{} has no file URL", absolute.display()),
    }
}

/// Maps each file on the rayon pool. Unreadable files are logged and skipped.
fn map_files(
    files: &[PathBuf],
    base: Option<&Url>,
    encoding: Option<&str>,
) -> anyhow::Result<Vec<ContentModel>> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let options = base
        .map(|u| MapOptions::with_url(u.as_str()))
        .unwrap_or_default();
    let mut models = Vec::with_capacity(files.len());

    for chunk in files.chunks(64) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|path| map_file(path, base, encoding, &options))
            .collect();

        for (path, result) in chunk.iter().zip(results) {
            match result {
                Ok(model) => models.push(model),
                Err(e) => warn!("{}: {:#}", path.display(), e),
            }
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    info!("mapped {}/{} pages", models.len(), files.len());
    Ok(models)
}

fn map_file(
    path: &Path,
    base: Option<&Url>,
    encoding: Option<&str>,
    options: &MapOptions,
) -> anyhow::Result<ContentModel> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let decoded = fetch::decode(&bytes, encoding);
    let html = match base {
        Some(base) => fetch::sanitize(&decoded.text, base).html,
        None => decoded.text,
    };
    Ok(map_document(&Html::parse_document(&html), options))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
