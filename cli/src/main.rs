//! `kilnc`: validate, build and watch material documents from the command line.

mod watch;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kiln_materials::document::{DocumentLoader, validate_document};
use kiln_materials::{FileSystemSource, LoadFailure, MaterialSystem, MaterialSystemConfig};

/// Kiln material compiler.
#[derive(Parser, Debug)]
#[command(name = "kilnc", version, about = "Kiln material compiler")]
struct Cli {
    /// Directory document and shader paths are relative to.
    #[arg(long, global = true, default_value = ".")]
    assets: PathBuf,

    /// Material system config file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Shader directory inside the assets directory; overrides the config.
    #[arg(long, global = true)]
    shader_root: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate a root document.
    Validate {
        /// Root document, relative to the assets directory.
        root: String,
    },
    /// Build every material pass against its render pass.
    Build {
        /// Root document, relative to the assets directory.
        root: String,
    },
    /// Build, then rebuild affected materials whenever files change.
    Watch {
        /// Root document, relative to the assets directory.
        root: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
    kiln_core::init();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let ok = match &cli.command {
        Command::Validate { root } => validate(&cli.assets, root, config),
        Command::Build { root } => build(&cli.assets, root, config),
        Command::Watch { root } => watch::run(&cli.assets, root, config),
    };
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn load_config(cli: &Cli) -> kiln_materials::Result<MaterialSystemConfig> {
    let mut config = match &cli.config {
        Some(path) => MaterialSystemConfig::from_file(path)?,
        None => MaterialSystemConfig::default(),
    };
    if let Some(shader_root) = &cli.shader_root {
        config.shader_root = shader_root.clone();
    }
    Ok(config)
}

pub(crate) fn load_system(
    source: Arc<FileSystemSource>,
    root: &str,
    config: MaterialSystemConfig,
) -> Result<MaterialSystem, LoadFailure> {
    MaterialSystem::builder(source).with_config(config).load(root)
}

pub(crate) fn report(failure: &LoadFailure) {
    for error in &failure.errors {
        let tier = if error.is_fatal() { "fatal" } else { "error" };
        println!("  {tier}: {error}");
    }
}

fn validate(assets: &Path, root: &str, config: MaterialSystemConfig) -> bool {
    let source = Arc::new(FileSystemSource::new(assets));

    let document = match DocumentLoader::new(source.as_ref()).load(root) {
        Ok(document) => document,
        Err(failure) => {
            println!("{root}: failed to load");
            report(&failure);
            return false;
        }
    };

    let validation = validate_document(&document);
    for error in &validation.errors {
        println!("  error: {error}");
    }
    for duplicate in &validation.duplicates {
        println!("  warning: duplicate id '{}' in {}", duplicate.id, duplicate.category);
    }

    match load_system(source, root, config) {
        Ok(system) => {
            let stats = system.stats();
            println!(
                "{root}: {} file(s), {} material(s), {} render pass(es), {} state block(s)",
                system.files().len(),
                stats.materials,
                stats.render_passes,
                system.states().len()
            );
            validation.errors.is_empty()
        }
        Err(failure) => {
            println!("{root}: invalid");
            report(&failure);
            false
        }
    }
}

/// Build every pass of every material. Returns the number of failures.
pub(crate) fn build_all(system: &MaterialSystem) -> usize {
    let Some(first_pass) = system.render_passes().first() else {
        log::warn!("No render passes declared; nothing to build");
        return 0;
    };

    let mut failures = 0;
    for (handle, material) in system.materials() {
        for pass in &material.passes {
            let render_pass = pass
                .name
                .as_deref()
                .filter(|name| system.render_pass(name).is_some())
                .unwrap_or(&first_pass.name);
            match system.pipeline_for(handle, pass.name.as_deref(), render_pass) {
                Ok(compiled) => println!(
                    "  {}/{} @ {}: {} ({} binding(s))",
                    material.id,
                    pass.label(),
                    render_pass,
                    compiled.hash,
                    compiled.spec.len()
                ),
                Err(error) => {
                    println!("  {}/{} @ {}: {error}", material.id, pass.label(), render_pass);
                    failures += 1;
                }
            }
        }
    }
    failures
}

pub(crate) fn print_stats(system: &MaterialSystem) {
    let stats = system.stats();
    println!(
        "pipelines: {} cached, {} hit(s), {} miss(es), {} refresh(es)",
        stats.pipelines.entries, stats.pipelines.hits, stats.pipelines.misses, stats.pipelines.refreshes
    );
    println!(
        "reflection: {} entr(ies), {} hit(s), {} miss(es); layouts: {}",
        stats.reflection.entries, stats.reflection.hits, stats.reflection.misses, stats.layouts
    );
}

fn build(assets: &Path, root: &str, config: MaterialSystemConfig) -> bool {
    let source = Arc::new(FileSystemSource::new(assets));
    let system = match load_system(source, root, config) {
        Ok(system) => system,
        Err(failure) => {
            println!("{root}: failed to load");
            report(&failure);
            return false;
        }
    };

    println!("{root}: building with backend '{}'", system.backend().name());
    let failures = build_all(&system);
    print_stats(&system);
    failures == 0
}
