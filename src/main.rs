use std::{
    io::{BufRead, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::{Parser, Subcommand, ValueEnum};
use kurzlink::{
    BaseAddress, FileStorage, Registry, RegistryConfig, ShortCode, SqliteStorage, Storage, address, registry, render::Renderer,
};
use shadow_rs::shadow;
use tracing_subscriber::EnvFilter;

shadow!(build);

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Sqlite,
    File,
}

#[derive(Parser, Debug)]
#[command(version = build::VERSION, long_version = build::CLAP_LONG_VERSION, about = "Shorten links into #fragment codes")]
struct Args {
    #[arg(long, env = "KURZLINK_BASE_URL", default_value = "http://localhost/")]
    base_url: String,
    #[arg(long, value_enum, default_value_t = Backend::Sqlite)]
    storage: Backend,
    #[arg(long, env = "KURZLINK_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,
    #[arg(long, default_value = registry::DEFAULT_STORAGE_KEY)]
    storage_key: String,
    #[arg(long, default_value_t = registry::DEFAULT_MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Shorten a URL
    Shorten { url: String },
    /// Resolve a code, #fragment or short link and print where it goes
    Open { link: String },
    /// Show the most recent links
    List {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show a link without counting a visit
    Show { link: String },
    /// Delete a link
    Delete {
        link: String,
        #[arg(long, short)]
        yes: bool,
    },
}

fn open_storage(args: &Args) -> Result<Box<dyn Storage>, Box<dyn std::error::Error>> {
    let storage: Box<dyn Storage> = match args.storage {
        Backend::Sqlite => {
            std::fs::create_dir_all(&args.data_dir)?;
            let db_path = args.data_dir.join("kurzlink.db");
            tracing::info!("sqlitedb: {}", db_path.display());
            Box::new(SqliteStorage::open(&db_path)?)
        }
        Backend::File => {
            tracing::info!("data dir: {}", args.data_dir.display());
            Box::new(FileStorage::new(&args.data_dir)?)
        }
    };
    Ok(storage)
}

fn confirm(prompt: &str) -> std::io::Result<bool> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{prompt} [y/N] ")?;
    stdout.flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Deletes `code` after `confirm` agrees. Unknown codes are reported without
/// asking.
fn delete_link<S: Storage>(
    registry: &mut Registry<S>,
    code: &ShortCode,
    confirm: impl FnOnce(&str) -> std::io::Result<bool>,
) -> Result<String, Box<dyn std::error::Error>> {
    if registry.get(code.as_str()).is_none() {
        return Ok(format!("no link #{code}"));
    }
    if !confirm(&format!("Delete #{code}?"))? {
        return Ok(format!("kept #{code}"));
    }
    if registry.delete(code.as_str())? {
        Ok(format!("deleted #{code}"))
    } else {
        Ok(format!("no link #{code}"))
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let base = BaseAddress::parse(&args.base_url)?;
    let config = RegistryConfig {
        base: base.clone(),
        storage_key: args.storage_key.clone(),
        max_attempts: args.max_attempts,
    };
    let storage = open_storage(&args)?;
    let mut registry = Registry::with_config(storage, config);
    let renderer = Renderer::new(base)?;

    match args.command {
        Command::Shorten { url } => {
            let link = registry.allocate(&url)?;
            print!("{}", renderer.created(&link)?);
        }
        Command::Open { link } => {
            let code = address::extract_code(&link)?;
            let link = registry.resolve(code.as_str())?;
            println!("{}", link.original_url);
        }
        Command::List { limit } => {
            print!("{}", renderer.recent(registry.list(limit))?);
        }
        Command::Show { link } => {
            let code = address::extract_code(&link)?;
            let link = registry
                .get(code.as_str())
                .ok_or_else(|| kurzlink::RegistryError::NotFound(code.to_string()))?;
            print!("{}", renderer.detail(link)?);
        }
        Command::Delete { link, yes } => {
            let code = address::extract_code(&link)?;
            let outcome = delete_link(&mut registry, &code, |prompt| if yes { Ok(true) } else { confirm(prompt) })?;
            println!("{outcome}");
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    // construct a subscriber that prints formatted traces to stderr
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    // use that subscriber to process traces emitted after this point
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install tracing subscriber: {e}");
    }

    let args = Args::parse();
    tracing::debug!("{:?}", &args);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
