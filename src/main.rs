use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Arg, ArgMatches, Command};
use fest_planner::catalog::load_catalog;
use fest_planner::classifier::HttpClassifier;
use fest_planner::config::Config;
use fest_planner::models::{selection_output, ErrorResponse};
use fest_planner::prepare::prepare;
use fest_planner::{EventSelector, LlmBackend, PlannerError, SelectionRequest, SelectionResponse};
use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "fest-planner.toml";

fn cli() -> Command {
    Command::new("fest-planner")
        .version("0.1.0")
        .about("Selects college fest events within a budget from review-derived engagement")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value(DEFAULT_CONFIG)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("select")
                .about("Pick events for a budget request and print the JSON response")
                .arg(
                    Arg::new("request")
                        .value_name("JSON")
                        .help("Request object, e.g. {\"budget\": 50000}; read from stdin when omitted"),
                )
                .arg(
                    Arg::new("catalog")
                        .long("catalog")
                        .value_name("CSV")
                        .help("Aggregated event catalog (overrides catalog_path)"),
                ),
        )
        .subcommand(
            Command::new("prepare")
                .about("Match reviews to events, classify sentiment and write the aggregated catalog")
                .arg(Arg::new("reviews").long("reviews").value_name("CSV").help("Review comments table"))
                .arg(Arg::new("events").long("events").value_name("CSV").help("Raw events table"))
                .arg(Arg::new("output").long("output").value_name("CSV").help("Aggregated catalog output")),
        )
        .subcommand(Command::new("init-config").about("Write the default configuration file"))
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries the JSON response, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let matches = match cli().try_get_matches() {
        Ok(matches) => matches,
        Err(e) if is_informational(&e) => e.exit(),
        Err(e) => return emit(Err(usage_error_json(&e))),
    };
    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG);

    match matches.subcommand() {
        Some(("select", sub)) => run_select(config_file, sub).await,
        Some(("prepare", sub)) => report(run_prepare(config_file, sub).await),
        Some(("init-config", _)) => report(init_config(config_file)),
        _ => ExitCode::FAILURE,
    }
}

fn report(outcome: Result<()>) -> ExitCode {
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(config_file: &str) -> Result<Config> {
    if Path::new(config_file).exists() {
        debug!(path = config_file, "loading configuration");
        Config::load_from_file(config_file).with_context(|| format!("Failed to load configuration: {}", config_file))
    } else {
        debug!(path = config_file, "configuration file not found, using defaults");
        Ok(Config::default())
    }
}

async fn run_select(config_file: &str, matches: &ArgMatches) -> ExitCode {
    let outcome = select(config_file, matches).await.map_err(|e| format!("{:#}", e));
    emit(selection_output(outcome))
}

fn emit(output: std::result::Result<String, String>) -> ExitCode {
    match output {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(json) => {
            println!("{}", json);
            ExitCode::FAILURE
        }
    }
}

fn is_informational(e: &clap::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
    )
}

// Usage errors follow the same stdout contract as request errors
fn usage_error_json(e: &clap::Error) -> String {
    ErrorResponse::new(e.to_string().trim()).to_json()
}

async fn select(config_file: &str, matches: &ArgMatches) -> Result<SelectionResponse> {
    let raw_request = match matches.get_one::<String>("request") {
        Some(json) => json.clone(),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read request from stdin")?;
            buf
        }
    };
    // Validate input before touching the catalog or network
    let request = SelectionRequest::from_json(&raw_request)?;
    let config = load_config(config_file)?;

    let catalog_path = matches
        .get_one::<String>("catalog")
        .cloned()
        .unwrap_or_else(|| config.catalog_path.clone());
    let catalog = load_catalog(&catalog_path)?;
    info!(path = %catalog_path, events = catalog.len(), "catalog loaded");

    let backend = LlmBackend::from_config(config.llm.as_ref());
    info!(backend = backend.name(), "generator configured");

    let selector = EventSelector::new(&backend, config.call_timeout());
    Ok(selector.respond(&catalog, &request).await)
}

async fn run_prepare(config_file: &str, matches: &ArgMatches) -> Result<()> {
    let config = load_config(config_file)?;
    let pick = |name: &str, fallback: &String| matches.get_one::<String>(name).unwrap_or(fallback).clone();
    let reviews = pick("reviews", &config.reviews_path);
    let events = pick("events", &config.events_path);
    let output = pick("output", &config.output_path);

    let classifier_config = config
        .classifier
        .as_ref()
        .ok_or_else(|| PlannerError::Config("[classifier] section is required for prepare".to_string()))?;
    let classifier = HttpClassifier::new(classifier_config, config.call_timeout());

    let summary = prepare(&reviews, &events, &output, &classifier, config.batch_size).await?;
    info!(
        reviews = summary.reviews,
        matched = summary.matched,
        classified = summary.classified,
        events = summary.events,
        output = %output,
        "prepare finished"
    );
    Ok(())
}

fn init_config(config_file: &str) -> Result<()> {
    if Path::new(config_file).exists() {
        anyhow::bail!("{} already exists", config_file);
    }
    Config::default().save_to_file(config_file)?;
    info!(path = config_file, "default configuration written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_flag_renders_json_error() {
        let err = cli()
            .try_get_matches_from(["fest-planner", "select", "--bogus"])
            .unwrap_err();
        assert!(!is_informational(&err));

        let value: serde_json::Value = serde_json::from_str(&usage_error_json(&err)).unwrap();
        assert!(value["error"].as_str().unwrap().contains("--bogus"));
    }

    #[test]
    fn help_is_not_an_error_payload() {
        let err = cli().try_get_matches_from(["fest-planner", "--help"]).unwrap_err();
        assert!(is_informational(&err));
    }

    #[test]
    fn select_accepts_inline_request_and_catalog() {
        let matches = cli()
            .try_get_matches_from(["fest-planner", "-c", "x.toml", "select", r#"{"budget": 10}"#, "--catalog", "c.csv"])
            .unwrap();
        assert_eq!(matches.get_one::<String>("config").unwrap(), "x.toml");
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "select");
        assert_eq!(sub.get_one::<String>("catalog").unwrap(), "c.csv");
    }
}
