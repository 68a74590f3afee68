//! CellScope - Main CLI Entry Point

use anyhow::{bail, Result};
use cellscope::api::{Api, Request, Response};
use cellscope::bridge::InferenceBridge;
use cellscope::cli::{Args, Commands};
use cellscope::config::Config;
use cellscope::diagnostics::Doctor;
use cellscope::locator::TerminalPicker;
use cellscope::logging::init_tracing;
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbosity().log_directive());

    let config = Config::load(args.config.clone())?;
    let config_path = args.config.clone().or_else(Config::default_path);

    match &args.command {
        Commands::Doctor => return run_doctor(config).await,
        Commands::Config => return show_config(&config, config_path.as_deref()),
        _ => {}
    }

    let bridge = Arc::new(InferenceBridge::from_config(&config));
    let api = Api::new(bridge.clone(), Arc::new(TerminalPicker::new())).with_config(config, config_path);

    let outcome = tokio::select! {
        result = run_command(&args, &api) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n{}", "Interrupted".yellow());
            Ok(())
        }
    };

    // The server must not outlive the CLI, whatever the command's outcome
    bridge.shutdown().await;
    if args.verbosity().show_summary() {
        bridge.telemetry().display_summary();
    }

    outcome
}

async fn run_command(args: &Args, api: &Api) -> Result<()> {
    match &args.command {
        Commands::Analyze { image, model } => {
            let load = with_spinner(args, "Loading model...", api.dispatch(Request::LoadModel { path: model.clone() })).await;
            if !args.json {
                print_load(data(&load)?);
            }

            let response = with_spinner(args, "Analyzing image...", api.dispatch(Request::Analyze { image: image.clone() })).await;
            if args.json {
                return print_json(&response);
            }
            print_prediction(data(&response)?);
            Ok(())
        }
        command => {
            let Some(request) = command.request() else {
                return Ok(());
            };
            let response = with_spinner(args, "Working...", api.dispatch(request)).await;
            if args.json {
                return print_json(&response);
            }

            let payload = data(&response)?;
            match command {
                Commands::Locate => print_locate(payload),
                Commands::Browse => print_browse(payload),
                Commands::Validate { .. } => print_validation(payload),
                Commands::Load { .. } => {
                    print_load(payload);
                    if payload["outcome"] == "error" {
                        bail!("model could not be loaded");
                    }
                }
                Commands::Env => print_environment(payload),
                _ => {}
            }
            Ok(())
        }
    }
}

async fn with_spinner<F: Future>(args: &Args, message: &str, future: F) -> F::Output {
    if args.json || !args.verbosity().show_progress() {
        return future.await;
    }

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));

    let output = future.await;
    spinner.finish_and_clear();
    output
}

fn data(response: &Response) -> Result<&Value> {
    match (&response.data, &response.error) {
        (Some(data), _) if response.ok => Ok(data),
        (_, Some(error)) => bail!("{}", error),
        _ => bail!("empty response"),
    }
}

fn print_json(response: &Response) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    if response.ok {
        Ok(())
    } else {
        bail!("request failed")
    }
}

fn text(value: &Value) -> String {
    value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string())
}

fn print_locate(payload: &Value) {
    if payload.is_null() {
        println!("{} model.h5 not found in any search location", "✗".red());
    } else {
        println!(
            "{} {} ({})",
            "✓".green(),
            text(&payload["path"]),
            text(&payload["source"]).replace('_', " ").dimmed()
        );
    }
}

fn print_browse(payload: &Value) {
    if payload.is_null() {
        println!("{}", "No file selected".yellow());
    } else {
        println!("{} {}", "Selected".green(), text(payload));
    }
}

fn print_validation(payload: &Value) {
    let path = text(&payload["path"]);
    match payload.get("error") {
        Some(error) => println!("{} {}: {}", "✗".red(), path, text(error)),
        None => println!(
            "{} {} ({}, {} bytes)",
            "✓".green(),
            path,
            text(&payload["format"]),
            payload["sizeBytes"]
        ),
    }
}

fn print_load(payload: &Value) {
    match payload["outcome"].as_str() {
        Some("loaded") => println!("{} Model loaded: {}", "✓".green(), text(&payload["artifact"]["path"])),
        Some("fallback") => {
            println!(
                "{} Using simulated predictions for {}",
                "!".yellow(),
                text(&payload["artifact"]["path"])
            );
            println!("  {}", text(&payload["reason"]).dimmed());
        }
        Some("error") => println!("{} {}", "✗".red(), text(&payload["message"])),
        _ => println!("{}", "Load superseded by a newer request".dimmed()),
    }
}

fn print_prediction(payload: &Value) {
    let confidence = payload["confidence"].as_f64().unwrap_or(0.0) * 100.0;
    let line = format!("{} ({:.1}%)", text(&payload["cellType"]), confidence);

    if payload["simulated"].as_bool().unwrap_or(true) {
        println!("{} {}", line.bold(), "[simulated]".yellow());
    } else {
        println!("{}", line.bold().green());
    }
}

fn print_environment(payload: &Value) {
    if payload["status"] != "available" {
        println!("{} {}", "Environment unavailable:".yellow(), text(&payload["reason"]));
        return;
    }

    println!(
        "Python {} on {} (via {})",
        text(&payload["runtimeVersion"]),
        text(&payload["platform"]),
        text(&payload["source"])
    );
    if let Some(modules) = payload["modules"].as_object() {
        for (name, status) in modules {
            let marker = if status["installed"].as_bool().unwrap_or(false) {
                "✓".green()
            } else {
                "✗".red()
            };
            let version = status["version"].as_str().unwrap_or("-");
            println!("  {} {:<12} {}", marker, name, version.dimmed());
        }
    }
}

async fn run_doctor(config: Config) -> Result<()> {
    let doctor = Doctor::new(config);
    let checks = doctor.run_diagnostics().await;
    Doctor::display_results(&checks);

    std::process::exit(if Doctor::overall_status(&checks) { 0 } else { 1 });
}

fn show_config(config: &Config, path: Option<&Path>) -> Result<()> {
    println!("\n{}\n", "CellScope Configuration".bold());

    if let Some(path) = path {
        let state = if path.exists() { "" } else { " (not created, using defaults)" };
        println!("File: {}{}\n", path.display(), state.dimmed());
    }

    println!("{}", toml::to_string_pretty(config)?);
    println!("Server URL:    {}", config.server_url());
    println!("Server script: {}", config.script_path().display());
    Ok(())
}
