use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use xrefmark_config::Config;
use xrefmark_engine::views::{DiffFile, blob_view, split_diff_view};
use xrefmark_engine::{
    AnnotationSession, Document, Envelope, HttpResolver, ReceiveOutcome, ResolveRequest,
    Resolver, page::classify_link,
};

#[derive(Parser, Debug)]
#[command(name = "xrefmark")]
#[command(about = "Annotate source views with cross-reference links")]
#[command(version)]
struct Cli {
    /// Resolver endpoint, overriding the config file
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Read the resolver response body from a file instead of the network
    #[arg(long, global = true)]
    response: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Annotate a local copy of one file at a commit and print the view
    Blob {
        #[arg(long)]
        slug: String,
        #[arg(long)]
        commit: String,
        /// Path of the file inside the repository
        #[arg(long)]
        path: String,
        /// Local copy of the file
        file: PathBuf,
    },
    /// Annotate a split diff of one file in a pull request and print the view
    Pr {
        #[arg(long)]
        slug: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        base: String,
        #[arg(long)]
        old: String,
        #[arg(long)]
        new: String,
        /// Path of the file inside the repository
        #[arg(long)]
        path: String,
        /// Local copy of the old version
        #[arg(long)]
        old_file: PathBuf,
        /// Local copy of the new version
        #[arg(long)]
        new_file: PathBuf,
    },
    /// Answer a raw request message and print the response envelope
    Resolve {
        /// JSON message, e.g. {"type":"commit","slug":"o/r","commit":"abc"}
        message: String,
    },
    /// Show which request a page link maps to
    Classify { link: String },
    /// Show or change the stored configuration
    Config {
        #[arg(long)]
        set_endpoint: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Blob {
            ref slug,
            ref commit,
            ref path,
            ref file,
        } => {
            let text = read(file)?;
            let mut doc = blob_view(&text);
            let request = ResolveRequest::Blob {
                slug: slug.clone(),
                commit: commit.clone(),
                path: path.clone(),
            };
            annotate(&cli, &mut doc, request)?;
            println!("{}", doc.to_html(doc.root()));
        }
        Command::Pr {
            ref slug,
            ref id,
            ref base,
            ref old,
            ref new,
            ref path,
            ref old_file,
            ref new_file,
        } => {
            let mut doc = split_diff_view(&[DiffFile::new(
                path.clone(),
                read(old_file)?,
                read(new_file)?,
            )]);
            let request = ResolveRequest::Pr {
                slug: slug.clone(),
                id: id.clone(),
                base: base.clone(),
                old: old.clone(),
                new: new.clone(),
            };
            annotate(&cli, &mut doc, request)?;
            println!("{}", doc.to_html(doc.root()));
        }
        Command::Resolve { ref message } => {
            let message: serde_json::Value =
                serde_json::from_str(message).context("Request message is not valid JSON")?;
            let resolver = HttpResolver::new(endpoint(&cli)?)?;
            let envelope = resolver.handle_message(&message);
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        Command::Classify { ref link } => match classify_link(link) {
            Some(request) => println!("{}", serde_json::to_string_pretty(&request)?),
            None => println!("Not applicable: {link}"),
        },
        Command::Config { ref set_endpoint } => {
            let mut config = Config::load_or_default()?;
            if let Some(endpoint) = set_endpoint {
                config.set_endpoint(endpoint);
                config.save()?;
                log::info!("Saved config to {}", Config::config_path().display());
            }
            println!("config: {}", Config::config_path().display());
            println!("endpoint: {}", config.endpoint);
        }
    }

    Ok(())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn endpoint(cli: &Cli) -> Result<String> {
    match &cli.endpoint {
        Some(endpoint) => Ok(xrefmark_config::normalize_endpoint(endpoint.clone())),
        None => Ok(Config::load_or_default()?.endpoint),
    }
}

/// Run one request through a fresh session, draining any diff batch
fn annotate(cli: &Cli, doc: &mut Document, request: ResolveRequest) -> Result<()> {
    let mut session = AnnotationSession::new();
    let outcome = match &cli.response {
        Some(file) => {
            let body = read(file)?;
            let resolver = |request: &ResolveRequest| match request.decode_result(&body) {
                Ok(result) => Envelope::ok(result),
                Err(err) => Envelope::err(format!("invalid response body: {err}")),
            };
            session.resolve_and_receive(doc, &resolver, request)
        }
        None => {
            let resolver = HttpResolver::new(endpoint(cli)?)?;
            session.resolve_and_receive(doc, &resolver, request)
        }
    };

    match outcome {
        ReceiveOutcome::Applied(report) => {
            log::info!(
                "Annotated {} symbols, skipped {}",
                report.annotated,
                report.skipped
            );
        }
        ReceiveOutcome::Scheduled { units } => {
            let ticks = session.run_to_idle(doc);
            log::info!("Drained {units} units in {ticks} slices");
        }
        ReceiveOutcome::Failed(message) => anyhow::bail!("Resolver error: {message}"),
        ReceiveOutcome::Invalid => anyhow::bail!("Resolver returned neither a result nor an error"),
        ReceiveOutcome::Stale => {}
    }
    Ok(())
}
