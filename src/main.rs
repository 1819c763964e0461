//! CLI entry point for the third-api tool.

use anyhow::{Context, Result};
use clap::Parser;
use third_api_core::config::ThirdApiConfig;
use third_api_core::third_api::{
    DispatchOptions, ResolveInput, RoutingPolicy, build_default_dispatcher,
};
use third_api_core::{Extraction, ThirdApiError};
use tracing::{debug, info};

mod app_config;
mod cli;

use app_config::{FileConfig, load_default_file_config};
use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout carries the JSON result only
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = load_default_file_config()?;
    if let Some(path) = loaded.path.as_deref()
        && loaded.config.is_some()
    {
        debug!(path = %path.display(), "Loaded config file");
    }
    let config = build_config(&args, loaded.config.unwrap_or_default());

    let mut dispatcher =
        build_default_dispatcher(&config).context("Failed to set up providers")?;
    if args.strict {
        let mut options = DispatchOptions::from_config(&config);
        options.policy = RoutingPolicy::Strict;
        dispatcher = dispatcher.with_options(options);
    }
    info!(providers = ?dispatcher.provider_names(), "Providers ready");

    let inputs: Vec<ResolveInput> = args.inputs.iter().map(|raw| ResolveInput::parse(raw)).collect();
    let api = args.api.as_deref();

    let extraction = match inputs.as_slice() {
        [single] => dispatcher.extract(single, api).await,
        many => dispatcher
            .extract_all(many, api)
            .await
            .map(Extraction::Playlist),
    }
    .map_err(describe_failure)?;

    let json = serde_json::to_string_pretty(&extraction).context("Failed to encode result")?;
    println!("{json}");
    Ok(())
}

/// Merges CLI flags over file configuration; flags win.
fn build_config(args: &Args, file: FileConfig) -> ThirdApiConfig {
    let defaults = ThirdApiConfig::default();

    let mut rapidapi_keys = args.rapidapi_keys.clone();
    rapidapi_keys.extend(file.rapidapi_keys);
    let mut hikerapi_keys = args.hikerapi_keys.clone();
    hikerapi_keys.extend(file.hikerapi_key);

    ThirdApiConfig {
        rapidapi_keys,
        hikerapi_keys,
        disable_third_api: args.disable_third_api || file.disable_third_api.unwrap_or(false),
        media_filter: if args.media_filter.is_empty() {
            file.media_filter
        } else {
            args.media_filter.clone()
        },
        prefer_rapidapi: args.prefer_rapidapi
            || (!args.only_rapidapi && file.prefer_rapidapi.unwrap_or(false)),
        only_rapidapi: args.only_rapidapi
            || (!args.prefer_rapidapi && file.only_rapidapi.unwrap_or(false)),
        external_ie: args.external_ie.clone().or(file.external_ie),
        guard_path: args.guard_file.clone().or(file.guard_file),
        guard_namespace: file.guard_namespace.unwrap_or(defaults.guard_namespace),
    }
}

/// Attaches a category so guard denials read differently from provider failures.
fn describe_failure(error: ThirdApiError) -> anyhow::Error {
    let category = if error.is_guard_denial() {
        "Blocked by local rate limiting"
    } else {
        "Resolution failed"
    };
    anyhow::Error::new(error).context(category)
}
