#![forbid(unsafe_code)]

//! diagramlift CLI - generate Mermaid from prose and make its SVG host-safe.
//!
//! # Commands
//!
//! - `generate`: Turn a plain-language description into Mermaid source
//! - `probe`: Check that a provider answers with the current settings
//! - `models`: List (and fuzzy-filter) the models OpenRouter offers
//! - `labels`: Print the node labels declared in Mermaid source as JSON
//! - `sanitize`: Rewrite renderer SVG so strict importers accept it

mod settings;

use std::future::Future;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dl_core::{Fidelity, ProviderConfig, ProviderKind, SanitizeConfig};
use dl_llm::{
    CallError, CallOptions, CancelHandle, GENERATION_TIMEOUT, PROBE_TIMEOUT, ReqwestTransport, cancel_pair,
    filter_models, generate, list_openrouter_models, probe,
};
use dl_parser::{extract_labels, first_significant_line};
use dl_svg::{StrictXmlHost, sanitize_for_host, sanitize_minimal_with_config, sanitize_svg_with_config};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::settings::{API_KEY_ENV, ProviderArgs, Settings};

/// diagramlift CLI - generate Mermaid from prose and make its SVG host-safe.
#[derive(Debug, Parser)]
#[command(
    name = "dl",
    version,
    about = "diagramlift - generate Mermaid from prose and make its SVG host-safe",
    long_about = "Asks an LLM provider (OpenAI, OpenRouter, Gemini or any OpenAI-compatible\n\
        endpoint) for Mermaid flowchart or sequence diagram source, and rewrites\n\
        rendered Mermaid SVG into markup strict importers accept."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file (default: ./diagramlift.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (can be repeated for more detail: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate Mermaid source from a description.
    Generate {
        /// Description file path, "-" for stdin, or inline text.
        #[arg(default_value = "-")]
        input: String,

        #[command(flatten)]
        provider: ProviderArgs,

        /// Output file path. If omitted, writes to stdout.
        #[arg(short, long)]
        output: Option<String>,

        /// Print a JSON summary (attempts, timing) to stderr
        #[arg(long)]
        json: bool,
    },

    /// Check that the configured provider is reachable.
    Probe {
        #[command(flatten)]
        provider: ProviderArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List OpenRouter models.
    Models {
        /// Fuzzy filter over model ids and names
        #[arg(long)]
        query: Option<String>,

        #[command(flatten)]
        provider: ProviderArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print node labels declared in Mermaid source as JSON.
    Labels {
        /// Input file path, "-" for stdin, or inline source.
        #[arg(default_value = "-")]
        input: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Sanitize rendered Mermaid SVG for strict importers.
    Sanitize {
        /// SVG file path, "-" for stdin, or inline markup.
        #[arg(default_value = "-")]
        input: String,

        /// Mermaid source the SVG was rendered from (path or inline), used for labels
        #[arg(short, long)]
        source: Option<String>,

        /// Run only the minimal fallback transform
        #[arg(long, conflicts_with = "verify")]
        minimal: bool,

        /// Import the result into a strict XML host, falling back to the minimal transform
        #[arg(long)]
        verify: bool,

        /// Output file path. If omitted, writes to stdout.
        #[arg(short, long)]
        output: Option<String>,

        /// Print a JSON summary (fidelity, timing) to stderr
        #[arg(long)]
        json: bool,
    },
}

/// Result of a generation.
#[derive(Debug, Serialize)]
struct GenerateResult {
    provider: String,
    model: String,
    attempts: u32,
    output_bytes: usize,
    header: Option<String>,
    elapsed_ms: f64,
}

/// Result of a connectivity probe.
#[derive(Debug, Serialize)]
struct ProbeResult {
    provider: String,
    model: String,
    reachable: bool,
    empty_completion: bool,
    elapsed_ms: f64,
}

/// Result of sanitizing a document.
#[derive(Debug, Serialize)]
struct SanitizeResult {
    fidelity: Fidelity,
    input_bytes: usize,
    output_bytes: usize,
    labels_from_source: bool,
    elements: Option<usize>,
    text_elements: Option<usize>,
    total_time_ms: f64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let settings = Settings::discover(cli.config.as_deref())?;

    match cli.command {
        Command::Generate {
            input,
            provider,
            output,
            json,
        } => cmd_generate(&settings, &provider, &input, output.as_deref(), json).await,

        Command::Probe { provider, json } => cmd_probe(&settings, &provider, json).await,

        Command::Models {
            query,
            provider,
            json,
        } => cmd_models(&settings, &provider, query.as_deref(), json).await,

        Command::Labels { input, pretty } => cmd_labels(&input, pretty),

        Command::Sanitize {
            input,
            source,
            minimal,
            verify,
            output,
            json,
        } => cmd_sanitize(
            &settings.sanitize,
            &input,
            source.as_deref(),
            minimal,
            verify,
            output.as_deref(),
            json,
        ),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .try_init();
}

fn load_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        Ok(buffer)
    } else if Path::new(input).exists() {
        std::fs::read_to_string(input).context(format!("Failed to read file: {input}"))
    } else {
        // Treat as inline text
        Ok(input.to_string())
    }
}

fn write_output(output: Option<&str>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content).context(format!("Failed to write to: {path}"))?;
            info!("Wrote output to: {path}");
        }
        None => {
            io::stdout()
                .write_all(content.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

fn with_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Keep the failure code next to the provider's message.
fn call_failure(action: &str, err: CallError) -> anyhow::Error {
    let code = err.kind().as_str();
    anyhow::Error::new(err).context(format!("{action} failed ({code})"))
}

/// Run `work`, cancelling it through `handle` on Ctrl-C.
async fn cancel_on_interrupt<F: Future>(handle: CancelHandle, work: F) -> F::Output {
    tokio::pin!(work);
    tokio::select! {
        output = &mut work => output,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("Interrupted; cancelling the request");
            handle.cancel();
            work.await
        }
    }
}

fn provider_config(settings: &Settings, args: &ProviderArgs) -> ProviderConfig {
    let env_key = std::env::var(API_KEY_ENV).ok();
    let config = settings.provider_config(args, env_key.as_deref());
    if config.base_url.is_some() && !config.provider.requires_base_url() {
        warn!("Base URL is ignored for {}", config.provider.display_name());
    }
    debug!("Provider settings: {config:?}");
    config
}

// =============================================================================
// Command: generate
// =============================================================================

async fn cmd_generate(
    settings: &Settings,
    args: &ProviderArgs,
    input: &str,
    output: Option<&str>,
    json_output: bool,
) -> Result<()> {
    let description = load_input(input)?;
    let config = provider_config(settings, args);

    let (handle, token) = cancel_pair();
    let options = CallOptions::generation()
        .with_timeout(settings.timeout(args, GENERATION_TIMEOUT))
        .with_cancel(token);
    let transport = ReqwestTransport::new();

    let outcome = cancel_on_interrupt(handle, generate(&transport, &config, description.trim(), &options))
        .await
        .map_err(|err| call_failure("Generation", err))?;

    let header = first_significant_line(&outcome.text).map(str::to_string);
    if !header
        .as_deref()
        .is_some_and(|line| ["flowchart", "graph", "sequenceDiagram"].iter().any(|kw| line.starts_with(kw)))
    {
        warn!("Provider output does not start with a flowchart or sequence diagram header");
    }

    if json_output {
        let result = GenerateResult {
            provider: config.provider.as_str().to_string(),
            model: config.effective_model().to_string(),
            attempts: outcome.attempts,
            output_bytes: outcome.text.len(),
            header,
            elapsed_ms: outcome.elapsed.as_secs_f64() * 1000.0,
        };
        eprintln!("{}", serde_json::to_string_pretty(&result)?);
    }

    write_output(output, &with_newline(outcome.text))
}

// =============================================================================
// Command: probe
// =============================================================================

async fn cmd_probe(settings: &Settings, args: &ProviderArgs, json_output: bool) -> Result<()> {
    let config = provider_config(settings, args);

    let (handle, token) = cancel_pair();
    let options = CallOptions::probe()
        .with_timeout(settings.timeout(args, PROBE_TIMEOUT))
        .with_cancel(token);
    let transport = ReqwestTransport::new();

    let report = cancel_on_interrupt(handle, probe(&transport, &config, &options))
        .await
        .map_err(|err| call_failure("Probe", err))?;

    if json_output {
        let result = ProbeResult {
            provider: config.provider.as_str().to_string(),
            model: report.model,
            reachable: true,
            empty_completion: report.empty_completion,
            elapsed_ms: report.elapsed.as_secs_f64() * 1000.0,
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "OK: {} ({}) answered in {}ms",
            config.provider.display_name(),
            report.model,
            report.elapsed.as_millis()
        );
        if report.empty_completion {
            warn!("The provider answered with an empty completion");
        }
    }
    Ok(())
}

// =============================================================================
// Command: models
// =============================================================================

async fn cmd_models(
    settings: &Settings,
    args: &ProviderArgs,
    query: Option<&str>,
    json_output: bool,
) -> Result<()> {
    let config = provider_config(settings, args);
    if config.provider != ProviderKind::OpenRouter {
        warn!(
            "Model listing queries OpenRouter; the configured provider is {}",
            config.provider.display_name()
        );
    }

    let (handle, token) = cancel_pair();
    let options = CallOptions::probe()
        .with_timeout(settings.timeout(args, PROBE_TIMEOUT))
        .with_cancel(token);
    let transport = ReqwestTransport::new();
    let models = cancel_on_interrupt(handle, list_openrouter_models(&transport, &config.api_key, &options))
        .await
        .map_err(|err| call_failure("Model listing", err))?;
    let matches = filter_models(&models, query.unwrap_or_default());
    info!("{} of {} models match", matches.len(), models.len());

    if json_output {
        println!("{}", serde_json::to_string_pretty(&matches)?);
    } else {
        let mut listing = String::new();
        for model in &matches {
            listing.push_str(&model.id);
            if model.name != model.id {
                listing.push('\t');
                listing.push_str(&model.name);
            }
            listing.push('\n');
        }
        write_output(None, &listing)?;
    }
    Ok(())
}

// =============================================================================
// Command: labels
// =============================================================================

fn cmd_labels(input: &str, pretty: bool) -> Result<()> {
    let source = load_input(input)?;
    let labels = extract_labels(&source);
    debug!("Extracted {} labels", labels.len());

    let json = if pretty {
        serde_json::to_string_pretty(&labels)?
    } else {
        serde_json::to_string(&labels)?
    };
    println!("{json}");
    Ok(())
}

// =============================================================================
// Command: sanitize
// =============================================================================

fn cmd_sanitize(
    config: &SanitizeConfig,
    input: &str,
    source: Option<&str>,
    minimal: bool,
    verify: bool,
    output: Option<&str>,
    json_output: bool,
) -> Result<()> {
    let start = Instant::now();
    let raw = load_input(input)?;
    let source = source.map(load_input).transpose()?;

    let (svg, fidelity, summary) = if minimal {
        let svg = sanitize_minimal_with_config(&raw, config).context("Minimal sanitization failed")?;
        (svg, Fidelity::Minimal, None)
    } else if verify {
        let imported = sanitize_for_host(&raw, source.as_deref(), config, &mut StrictXmlHost)
            .context("No sanitized form of the SVG could be imported")?;
        if imported.fidelity == Fidelity::Minimal {
            warn!("Full sanitization was rejected; wrote the minimal fallback");
        }
        (imported.svg, imported.fidelity, Some(imported.node))
    } else {
        let svg = sanitize_svg_with_config(&raw, source.as_deref(), config).context("Sanitization failed")?;
        (svg, Fidelity::Full, None)
    };

    let total_time = start.elapsed();
    if json_output {
        let result = SanitizeResult {
            fidelity,
            input_bytes: raw.len(),
            output_bytes: svg.len(),
            labels_from_source: source.is_some() && fidelity == Fidelity::Full,
            elements: summary.as_ref().map(|s| s.elements),
            text_elements: summary.as_ref().map(|s| s.text_elements),
            total_time_ms: total_time.as_secs_f64() * 1000.0,
        };
        eprintln!("{}", serde_json::to_string_pretty(&result)?);
    }

    write_output(output, &with_newline(svg))?;
    info!(
        "Sanitized {} bytes into {} SVG in {:.2}ms",
        raw.len(),
        fidelity.as_str(),
        total_time.as_secs_f64() * 1000.0
    );
    Ok(())
}
