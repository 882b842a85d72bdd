// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use automatorr::{
    collect::{AnswersFile, Collected, Collector, InteractivePrompt},
    engine::{Engine, Outcome},
    path::default_catalog_path,
    render::{COMPOSE_FILE, GUIDE_FILE},
    Catalog,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    path::{absolute, PathBuf},
    process::exit,
    time::Duration,
};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  automatorr [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Setup(opts) => run_setup(opts),
            Command::Generate(opts) => run_generate(opts),
            Command::Services(opts) => run_services(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Interactively pick services and generate compose setup.
    #[command(override_usage = "automatorr setup [options]")]
    Setup(SetupOptions),

    /// Generate compose setup from answers file without prompting.
    #[command(override_usage = "automatorr generate [options] <answers_file>")]
    Generate(GenerateOptions),

    /// List services of catalog by category.
    #[command(override_usage = "automatorr services [options]")]
    Services(ServicesOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SetupOptions {
    /// Path to catalog to use instead of the built-in one.
    #[arg(short, long, value_name = "path")]
    pub catalog: Option<PathBuf>,

    /// Directory to write generated files to.
    #[arg(short, long, value_name = "dir")]
    pub output: Option<PathBuf>,

    /// Do not create docker and media directories.
    #[arg(short, long)]
    pub skip_directories: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct GenerateOptions {
    /// Path to answers file.
    #[arg(required = true, value_name = "answers_file")]
    pub answers: PathBuf,

    /// Path to catalog to use instead of the built-in one.
    #[arg(short, long, value_name = "path")]
    pub catalog: Option<PathBuf>,

    /// Directory to write generated files to.
    #[arg(short, long, value_name = "dir")]
    pub output: Option<PathBuf>,

    /// Do not create docker and media directories.
    #[arg(short, long)]
    pub skip_directories: bool,

    /// Print compose file instead of writing anything.
    #[arg(short, long)]
    pub dry_run: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ServicesOptions {
    /// Path to catalog to use instead of the built-in one.
    #[arg(short, long, value_name = "path")]
    pub catalog: Option<PathBuf>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = Cli::parse().run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run_setup(opts: SetupOptions) -> Result<()> {
    let catalog = load_catalog(opts.catalog)?;
    let collected = InteractivePrompt::new().collect(&catalog)?;
    let engine = Engine::new(&catalog).create_directories(!opts.skip_directories);
    let outcome = generate(&engine, collected, opts.output)?;
    report(&outcome);

    Ok(())
}

fn run_generate(opts: GenerateOptions) -> Result<()> {
    let catalog = load_catalog(opts.catalog)?;
    let collected = AnswersFile::new(opts.answers).collect(&catalog)?;
    let engine = Engine::new(&catalog)
        .create_directories(!opts.skip_directories)
        .dry_run(opts.dry_run);
    let outcome = generate(&engine, collected, opts.output)?;

    if opts.dry_run {
        print!("{}", outcome.prepared.bundle().compose());
    } else {
        report(&outcome);
    }

    Ok(())
}

fn run_services(opts: ServicesOptions) -> Result<()> {
    let catalog = load_catalog(opts.catalog)?;
    for (category, services) in catalog.by_category() {
        println!("{}", category.heading());
        for service in services {
            let marker = match (service.always, service.recommended) {
                (true, _) => "  (always)",
                (false, true) => "  (recommended)",
                (false, false) => "",
            };
            println!("  {:<16}{}{marker}", service.id, service.description);
        }
        println!();
    }

    Ok(())
}

fn load_catalog(path: Option<PathBuf>) -> Result<Catalog> {
    if let Some(path) = path {
        return Ok(Catalog::load(path)?);
    }

    match default_catalog_path() {
        Ok(path) if path.is_file() => {
            info!("use catalog {:?}", path.display());
            Ok(Catalog::load(path)?)
        }
        Ok(_) => Ok(Catalog::builtin()?),
        Err(error) => {
            debug!("{error}, use built-in catalog");
            Ok(Catalog::builtin()?)
        }
    }
}

fn generate(engine: &Engine<'_>, mut collected: Collected, output: Option<PathBuf>) -> Result<Outcome> {
    if let Some(output) = output {
        collected.context = collected.context.compose_dir(absolute(output)?);
    }

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    bar.set_message("generating compose setup");
    bar.enable_steady_tick(Duration::from_millis(100));

    let outcome = engine.generate(collected);
    bar.finish_and_clear();

    Ok(outcome?)
}

fn report(outcome: &Outcome) {
    for directory in &outcome.created {
        debug!("created {:?}", directory.display());
    }
    info!(
        "created {} directories, wrote {} files",
        outcome.created.len(),
        outcome.written.len()
    );

    let compose_dir = outcome.context.compose_dir().display();
    println!("\nNext steps:");
    println!("  1. Review {compose_dir}/{COMPOSE_FILE}");
    println!("  2. Start services with `cd {compose_dir} && docker compose up -d`");
    println!("  3. Follow {compose_dir}/{GUIDE_FILE} to configure each service");
}
