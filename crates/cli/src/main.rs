mod logging;

use anyhow::Result;
use birthname_core::{
    apply_plan, generate_plan, undo_last, AppConfig, AppPaths, ApplyOptions, HashMethod,
    RenameOptions, RenameReport, UndoError,
};
use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// `rename --dir undo` runs an undo instead of a rename.
const UNDO_SENTINEL: &str = "undo";

#[derive(Debug, Parser)]
#[command(name = "birthname-cli")]
#[command(about = "Renames media files to <timestamp>-<hash> names and can undo the last run")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Undo log location (defaults to the platform config directory)
    #[arg(long, global = true)]
    history: Option<PathBuf>,
    /// Log file location (defaults to the platform data directory)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Rename(RenameArgs),
    Undo,
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    /// Writes the built-in defaults to the config file
    Init {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Debug, Args)]
struct RenameArgs {
    #[arg(long)]
    dir: String,
    /// Required unless --dir is `undo`; a leading dot is implied, so `png`
    /// matches `*.png` but not `x.apng`
    #[arg(long)]
    ext: Option<String>,
    #[arg(long, value_enum)]
    hash: Option<HashArg>,
    /// Replaces the configured marker list; may be repeated
    #[arg(long = "marker")]
    markers: Vec<String>,
    /// 0 uses one worker per CPU
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum HashArg {
    Sha256,
    Sha1,
    Md5,
    Imagehash,
}

impl From<HashArg> for HashMethod {
    fn from(value: HashArg) -> Self {
        match value {
            HashArg::Sha256 => HashMethod::Sha256,
            HashArg::Sha1 => HashMethod::Sha1,
            HashArg::Md5 => HashMethod::Md5,
            HashArg::Imagehash => HashMethod::ImageHash,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

/// What a parsed command line asks for once `--dir undo` and the
/// conditional `--ext` requirement have been resolved.
#[derive(Debug)]
enum Action {
    Rename { args: RenameArgs, ext: String },
    Undo,
    ConfigShow,
    ConfigInit { force: bool },
}

fn resolve_action(command: Commands) -> Result<Action, clap::Error> {
    match command {
        Commands::Rename(args) if args.dir == UNDO_SENTINEL => Ok(Action::Undo),
        Commands::Rename(mut args) => match args.ext.take() {
            Some(ext) => Ok(Action::Rename { args, ext }),
            None => Err(Cli::command().error(
                ErrorKind::MissingRequiredArgument,
                "--ext is required unless --dir is `undo`",
            )),
        },
        Commands::Undo => Ok(Action::Undo),
        Commands::Config(config_args) => Ok(match config_args.action {
            ConfigAction::Show => Action::ConfigShow,
            ConfigAction::Init { force } => Action::ConfigInit { force },
        }),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = AppPaths::discover()?;
    let history_path = cli.history.unwrap_or_else(|| paths.history_path.clone());
    let log_path = cli.log_file.unwrap_or_else(|| paths.log_path.clone());
    logging::init_file_logging(&log_path, cli.verbose)?;

    let action = resolve_action(cli.command).unwrap_or_else(|err| err.exit());
    run(action, &paths, &history_path).inspect_err(|err| error!("{err:#}"))
}

/// Only `rename` and `config show` read the config file;
/// `undo` works with a broken one.
fn run(action: Action, paths: &AppPaths, history_path: &Path) -> Result<()> {
    match action {
        Action::Rename { args, ext } => {
            let config = AppConfig::load_from(&paths.config_path)?;
            cmd_rename(args, ext, &config, history_path)
        }
        Action::Undo => cmd_undo(history_path),
        Action::ConfigShow => {
            let config = AppConfig::load_from(&paths.config_path)?;
            cmd_config_show(&config, paths, history_path)
        }
        Action::ConfigInit { force } => cmd_config_init(paths, force),
    }
}

fn cmd_rename(
    args: RenameArgs,
    ext: String,
    config: &AppConfig,
    history_path: &Path,
) -> Result<()> {
    let mut options = RenameOptions::from_config(&args.dir, ext, config);
    if let Some(hash) = args.hash {
        options.hash_method = hash.into();
    }
    if !args.markers.is_empty() {
        options.markers = args.markers;
    }
    if let Some(workers) = args.workers {
        options.workers = workers;
    }
    info!(
        "rename run: dir={} ext={} hash={} workers={} dry_run={}",
        options.root.display(),
        options.extension,
        options.hash_method,
        options.workers,
        args.dry_run
    );

    let plan = generate_plan(&options)?;
    let report = if args.dry_run {
        RenameReport::planned(plan)
    } else {
        let result = apply_plan(
            &plan,
            &ApplyOptions {
                history_path: history_path.to_path_buf(),
                workers: options.workers,
            },
        )?;
        RenameReport::applied(plan, result)
    };

    let stats = report.stats();
    info!(
        "rename finished: renamed={} unchanged={} failed={}",
        stats.renamed, stats.unchanged, stats.failed
    );
    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print!("{}", render_table(&report)),
    }
    Ok(())
}

fn cmd_undo(history_path: &Path) -> Result<()> {
    match undo_last(history_path) {
        Ok(result) => {
            println!(
                "undo complete: {} restored, {} failed, {} batches remain",
                result.restored,
                result.failures.len(),
                result.remaining_batches
            );
            for failure in &result.failures {
                eprintln!(
                    "  failed: {} -> {} ({})",
                    failure.renamed.display(),
                    failure.original.display(),
                    failure.reason
                );
            }
            Ok(())
        }
        Err(err) if err.downcast_ref::<UndoError>().is_some() => {
            warn!("{err}");
            eprintln!("{err}");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn cmd_config_show(config: &AppConfig, paths: &AppPaths, history_path: &Path) -> Result<()> {
    println!("config file: {}", paths.config_path.display());
    println!("undo log: {}", history_path.display());
    println!("log file: {}", paths.log_path.display());
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn cmd_config_init(paths: &AppPaths, force: bool) -> Result<()> {
    if paths.config_path.exists() && !force {
        anyhow::bail!(
            "config file already exists: {} (use --force to overwrite)",
            paths.config_path.display()
        );
    }
    AppConfig::default().save_to(&paths.config_path)?;
    info!("wrote default config to {}", paths.config_path.display());
    println!("wrote {}", paths.config_path.display());
    Ok(())
}

fn render_table(report: &RenameReport) -> String {
    let mut out = String::from("original -> new\n");
    for candidate in &report.plan.candidates {
        if candidate.changed {
            let _ = writeln!(
                out,
                "{} -> {}",
                candidate.original_path.display(),
                candidate.target_path.display()
            );
        } else {
            let _ = writeln!(out, "{} (unchanged)", candidate.original_path.display());
        }
    }

    let mut failures = report.failures().peekable();
    if failures.peek().is_some() {
        out.push_str("\nfailures:\n");
        for failure in failures {
            let _ = writeln!(out, "{} ({})", failure.path.display(), failure.reason);
        }
    }

    let stats = report.stats();
    let _ = writeln!(
        out,
        "\nsummary: scanned={} matched={} planned={} unchanged={} renamed={} failed={}",
        stats.scanned_files,
        stats.matched_files,
        stats.planned,
        stats.unchanged,
        stats.renamed,
        stats.failed
    );
    if report.dry_run {
        out.push_str("dry run: no files were renamed\n");
    }
    out
}
