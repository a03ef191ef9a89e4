// src/main.rs

use anyhow::{Context, Result, anyhow};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use rezpip::{
    Config, FetchOptions, Fetcher, FilesystemRepository, HookRegistry, Interpreter, Pipeline,
    ResolveRequest, RunOptions,
};
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rezpip")]
#[command(author, version, about = "Convert pip-resolved Python packages into rez packages", long_about = None)]
struct Cli {
    /// Packages to install, in pip requirement syntax
    #[arg(value_name = "PACKAGES")]
    packages: Vec<String>,

    /// Install from the given requirements file
    #[arg(short = 'r', long = "requirement", value_name = "FILE")]
    requirement: Vec<PathBuf>,

    /// Constrain versions using the given constraints file
    #[arg(short = 'c', long = "constraint", value_name = "FILE")]
    constraint: Vec<PathBuf>,

    /// Install packages into this repository
    #[arg(short, long, value_name = "PREFIX")]
    prefix: Option<PathBuf>,

    /// Install into the release packages path
    #[arg(long)]
    release: bool,

    /// Python interpreter to resolve for (repeatable)
    #[arg(long, value_name = "PATH", default_value = "python3")]
    python: Vec<PathBuf>,

    /// Path to the pip.pyz to resolve with
    #[arg(long, value_name = "PATH", value_parser = parse_pyz)]
    pip: Option<PathBuf>,

    /// Configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    log_level: String,

    /// Keep the work area after the run
    #[arg(long)]
    keep_tmp_dirs: bool,

    /// List registered hooks and exit
    #[arg(long)]
    list_hooks: bool,

    /// Print version, host and interpreter details for bug reports and exit
    #[arg(long)]
    debug_info: bool,

    /// Extra arguments passed to pip
    #[arg(last = true, value_name = "PIP_ARGS")]
    pip_args: Vec<String>,
}

/// `--pip` must name an existing `.pyz`
fn parse_pyz(s: &str) -> std::result::Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.extension().is_none_or(|ext| ext != "pyz") {
        return Err(format!("{} is not a .pyz file", s));
    }
    if !path.is_file() {
        return Err(format!("{} does not exist", s));
    }
    Ok(path)
}

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn list_hooks(hooks: &HookRegistry) {
    if hooks.is_empty() {
        println!("No hooks registered");
        return;
    }
    for hook in hooks.hooks() {
        println!("{:<12} {}", hook.name(), hook.description());
    }
}

fn debug_info(out: &mut impl Write, cli: &Cli, config: &Config, hooks: &HookRegistry) -> std::io::Result<()> {
    let host = config.host_system();
    writeln!(out, "rezpip version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "host: platform-{} arch-{} os-{}", host.platform, host.arch, host.os)?;

    match cli.pip.as_ref().or(config.pip.executable.as_ref()) {
        Some(pip) => writeln!(out, "pip: {}", pip.display())?,
        None => writeln!(out, "pip: not configured")?,
    }

    writeln!(out, "interpreters:")?;
    for executable in &cli.python {
        match Interpreter::query(executable) {
            Ok(interpreter) => writeln!(out, "  {}: {}", executable.display(), interpreter.version)?,
            Err(e) => writeln!(out, "  {}: {}", executable.display(), e)?,
        }
    }

    let names: Vec<&str> = hooks.hooks().iter().map(|h| h.name()).collect();
    writeln!(out, "hooks: {}", names.join(", "))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = Config::discover(cli.config.as_deref())?;
    let mut hooks = HookRegistry::with_builtins();
    hooks.disable(&config.disabled_hooks);

    if cli.list_hooks {
        list_hooks(&hooks);
        return Ok(());
    }

    if cli.debug_info {
        debug_info(&mut std::io::stdout().lock(), &cli, &config, &hooks)?;
        return Ok(());
    }

    if cli.packages.is_empty() && cli.requirement.is_empty() {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "at least one package or requirements file (-r) is required",
            )
            .exit();
    }

    let pip = cli
        .pip
        .or_else(|| config.pip.executable.clone())
        .ok_or_else(|| anyhow!("No pip.pyz given: pass --pip or set pip.executable in the configuration"))?;
    let repository = config.repository_path(cli.prefix.as_deref(), cli.release)?;

    let mut extra_args = config.pip.extra_args.clone();
    extra_args.extend(cli.pip_args);

    let options = RunOptions {
        request: ResolveRequest {
            packages: cli.packages,
            requirement_files: cli.requirement,
            constraint_files: cli.constraint,
            extra_args,
        },
        interpreters: cli.python,
        pip,
        keep_tmp_dirs: cli.keep_tmp_dirs,
    };

    let fetch_options: FetchOptions = config.fetch_options(std::io::stderr().is_terminal());
    let fetcher = Fetcher::new(fetch_options).context("Failed to set up downloads")?;
    let pipeline = Pipeline::new(
        hooks,
        config.host_system(),
        fetcher,
        Box::new(FilesystemRepository::new(&repository)),
    );

    info!("Installing into {}", repository.display());
    let summary = pipeline.run(&options)?;

    for package in &summary.packages {
        let status = if package.report.installed.is_empty() {
            "skipped (already installed)"
        } else {
            "installed"
        };
        println!(
            "{}-{} [python {}]: {}",
            package.name, package.version, package.python, status
        );
    }
    if let Some(work_dir) = &summary.work_dir {
        println!("Work area kept at {}", work_dir.display());
    }

    Ok(())
}
