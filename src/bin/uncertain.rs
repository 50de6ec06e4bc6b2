#![forbid(unsafe_code)]

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use uncertainty_harness::completion::GatewayCompletionClient;
use uncertainty_harness::gateway::{ProviderGateway, TracingUsageSink};
use uncertainty_harness::orchestrator::{Conversation, Orchestrator, OrchestratorError};
use uncertainty_harness::report::{render_failure, render_report_text};
use uncertainty_harness::tool::{measure_uncertainty_schema, parse_arguments};
use uncertainty_harness::uncertainty::{
    measure, MeasureConfig, SamplingRequest, UncertaintyMeasurer, DEFAULT_THRESHOLD,
};

#[derive(Parser)]
#[command(name = "uncertain", version, about = "Measure LLM answer uncertainty from token logprobs")]
struct Cli {
    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one measurement and print the report
    Measure {
        /// Prompt text
        #[arg(long, group = "input")]
        prompt: Option<String>,

        /// Path to a SamplingRequest JSON file
        #[arg(long, group = "input")]
        request: Option<PathBuf>,

        /// `measure_uncertainty` tool-call arguments as a JSON string
        #[arg(long, group = "input")]
        tool_args: Option<String>,

        #[arg(long)]
        num_samples: Option<usize>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        threshold: Option<f64>,

        /// Write the report JSON here
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print JSON instead of the text report
        #[arg(long)]
        json: bool,
    },
    /// Interactive uncertainty-aware chat
    Chat {
        /// Skip the threshold prompt
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        num_samples: Option<usize>,
    },
    /// Print the `measure_uncertainty` tool schema
    Schema,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new(filter)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into())
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match cli.command {
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&measure_uncertainty_schema())?);
        }
        Commands::Measure {
            prompt,
            request,
            tool_args,
            num_samples,
            temperature,
            max_tokens,
            threshold,
            out,
            json,
        } => {
            let mut req = match (prompt, request, tool_args) {
                (Some(prompt), _, _) => SamplingRequest::new(prompt),
                (_, Some(path), _) => read_json(&path)?,
                (_, _, Some(args)) => parse_arguments(&args, threshold)?,
                _ => return Err("measure requires --prompt, --request or --tool-args".into()),
            };
            if let Some(n) = num_samples {
                req = req.num_samples(n);
            }
            if let Some(t) = temperature {
                req = req.temperature(t);
            }
            if let Some(max) = max_tokens {
                req = req.max_tokens(max);
            }
            if let Some(threshold) = threshold {
                req = req.threshold(threshold);
            }

            // Reject bad input before an API key is needed.
            if let Err(err) = req.validate() {
                eprint!("{}", render_failure(&err));
                return Err(err.into());
            }

            let config = MeasureConfig::from_env();
            let client = build_client(&config)?;

            let report = match measure(&client, &config, &req).await {
                Ok(report) => report,
                Err(err) => {
                    eprint!("{}", render_failure(&err));
                    return Err(err.into());
                }
            };

            if let Some(path) = out {
                write_json(&path, &report)?;
                eprintln!("report written to {}", path.display());
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render_report_text(&report));
            }
        }
        Commands::Chat {
            threshold,
            num_samples,
        } => {
            let threshold = match threshold {
                Some(t) => t,
                None => prompt_threshold()?,
            };
            if !threshold.is_finite() || threshold <= 0.0 {
                return Err(format!("threshold must be a positive number, got {threshold}").into());
            }

            let config = MeasureConfig::from_env();
            let gateway = Arc::new(ProviderGateway::from_env(Arc::new(TracingUsageSink))?);
            let client = GatewayCompletionClient::new(gateway.clone(), config.model.clone());
            let model = config.model.clone();
            let measurer = UncertaintyMeasurer::new(Arc::new(client), config);

            let mut orchestrator = Orchestrator::new(measurer, gateway, model).threshold(threshold);
            if let Some(n) = num_samples {
                orchestrator = orchestrator.num_samples(n);
            }

            run_chat(&orchestrator).await?;
        }
    }

    Ok(())
}

fn build_client(config: &MeasureConfig) -> Result<GatewayCompletionClient, Box<dyn std::error::Error>> {
    let gateway = ProviderGateway::from_env(Arc::new(TracingUsageSink))?;
    Ok(GatewayCompletionClient::new(
        Arc::new(gateway),
        config.model.clone(),
    ))
}

fn prompt_threshold() -> Result<f64, io::Error> {
    println!("Uncertainty threshold: a certainty ratio above it is treated as UNCERTAIN.");
    println!("Typical values: 0.8 to 1.2.");
    print!("Enter threshold (or press Enter for {DEFAULT_THRESHOLD}): ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim();
    if line.is_empty() {
        return Ok(DEFAULT_THRESHOLD);
    }
    match line.parse::<f64>() {
        Ok(t) if t.is_finite() && t > 0.0 => Ok(t),
        _ => {
            println!("Invalid threshold {line:?}; using {DEFAULT_THRESHOLD}");
            Ok(DEFAULT_THRESHOLD)
        }
    }
}

async fn run_chat(orchestrator: &Orchestrator) -> Result<(), Box<dyn std::error::Error>> {
    println!("Using uncertainty threshold {}", orchestrator.current_threshold());
    println!("Commands: 'reset' clears the conversation, 'quit' or 'exit' leaves.");

    let mut conversation = Conversation::new();
    let stdin = io::stdin();
    loop {
        print!("\nYou: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input.to_lowercase().as_str() {
            "quit" | "exit" => break,
            "reset" => {
                conversation.reset();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        match orchestrator.respond(&mut conversation, input).await {
            Ok(outcome) => {
                print!("{}", render_report_text(&outcome.report));
                println!("\nAssistant: {}", outcome.assistant_response);
            }
            Err(OrchestratorError::Measure(err)) => {
                eprint!("{}", render_failure(&err));
                eprintln!("No answer was given for this message.");
            }
            Err(err) => eprintln!("error: {err}"),
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    std::fs::write(path, json)
}
