//! Card compiler CLI
//!
//! Usage:
//!   cardc compile <BUNDLE> --card <URL> [--format F]... [--config FILE] [--templates]
//!   cardc transform <TEMPLATE> --bundle <BUNDLE> --card <URL>
//!
//! A bundle is a JSON array of raw cards. Set `RUST_LOG` for diagnostics.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use card_compiler::compiler::Importer;
use card_compiler::{
    parse_template, serialize, to_json, transform, CompileError, Compiler, CompilerConfig, Format,
    MemoryBuilder, ModuleCache, TransformContext,
};

#[derive(Parser)]
#[command(name = "cardc", version)]
#[command(about = "Compile card definitions into field-resolved templates")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a card and print its serialized document
    Compile {
        /// Bundle file: a JSON array of raw cards
        bundle: PathBuf,

        /// Url of the card to compile
        #[arg(long)]
        card: String,

        /// Formats to compile (default: all, or the config file's list)
        #[arg(short, long = "format")]
        formats: Vec<Format>,

        /// Compiler configuration (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the generated format modules instead of the document
        #[arg(long)]
        templates: bool,
    },
    /// Transform one template against a card's fields
    Transform {
        /// Template file
        template: PathBuf,

        /// Bundle file: a JSON array of raw cards
        #[arg(long)]
        bundle: PathBuf,

        /// Url of the card whose fields the template uses
        #[arg(long)]
        card: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.cmd {
        Command::Compile {
            bundle,
            card,
            formats,
            config,
            templates,
        } => cmd_compile(&bundle, &card, formats, config.as_deref(), templates).await,
        Command::Transform {
            template,
            bundle,
            card,
        } => cmd_transform(&template, &bundle, &card).await,
    };

    if let Err(message) = result {
        eprintln!("{}", message);
        std::process::exit(1);
    }
}

fn read(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Error reading file '{}': {}", path.display(), e))
}

fn load_bundle(path: &Path) -> Result<MemoryBuilder, String> {
    MemoryBuilder::from_json(&read(path)?)
        .map_err(|e| format!("Error reading bundle '{}': {}", path.display(), e))
}

/// Compile errors, with an annotated report for template syntax errors
fn describe(err: &CompileError) -> String {
    match err.report() {
        Some(report) => format!("Error: {}\n{}", err, report),
        None => format!("Error: {}", err),
    }
}

async fn cmd_compile(
    bundle: &Path,
    url: &str,
    formats: Vec<Format>,
    config: Option<&Path>,
    templates: bool,
) -> Result<(), String> {
    let builder = load_bundle(bundle)?;
    let mut config = match config {
        Some(path) => CompilerConfig::from_file(path)
            .map_err(|e| format!("Error loading config '{}': {}", path.display(), e))?,
        None => CompilerConfig::default(),
    };
    if !formats.is_empty() {
        config = config.with_formats(formats);
    }
    debug!(?config, "loaded configuration");

    let modules = ModuleCache::new();
    let compiler = Compiler::new(&builder, &modules).with_config(config);
    let compiled = compiler.compile_url(url).await.map_err(|e| describe(&e))?;

    if templates {
        for format in &compiler.config().formats {
            let Some(meta) = compiled.format(*format) else {
                continue;
            };
            let source = modules.get(&meta.module_name).unwrap_or_default();
            println!("// {} ({})\n{}\n", meta.module_name, format, source);
        }
        return Ok(());
    }

    let raw = builder
        .raw_card(url)
        .ok_or_else(|| format!("Error: no card at '{}'", url))?;
    let json = to_json(&serialize(raw, Some(&compiled))).map_err(|e| format!("Error: {}", e))?;
    println!("{}", json);
    Ok(())
}

async fn cmd_transform(template: &Path, bundle: &Path, url: &str) -> Result<(), String> {
    let source = read(template)?;
    let filename = template.display().to_string();
    let parsed = parse_template(&source).map_err(|errors| {
        errors
            .iter()
            .map(|e| e.format(&source, &filename))
            .collect::<Vec<_>>()
            .join("\n")
    })?;

    let builder = load_bundle(bundle)?;
    let modules = ModuleCache::new();
    let config = CompilerConfig::default();
    let compiled = Compiler::new(&builder, &modules)
        .with_config(config.clone())
        .compile_url(url)
        .await
        .map_err(|e| describe(&e))?;

    let mut used_fields = Vec::new();
    let mut importer = Importer::new(config.component_suffix.as_str());
    let transformed = {
        let mut choose = |card: &card_compiler::CompiledCard| importer.name_for(card);
        transform(
            &parsed,
            TransformContext {
                fields: &compiled.fields,
                used_fields: &mut used_fields,
                import_and_choose_name: &mut choose,
            },
        )
        .map_err(|e| format!("Error: {}", e))?
    };

    println!("{}", importer.render_module(&transformed.to_string()));
    debug!(?used_fields, "transformed template");
    Ok(())
}
