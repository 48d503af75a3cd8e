use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::fs;
use std::path::Path;

use mclock::cli::{Cli, Commands};
use mclock::config::Config;
use mclock::conflict::has_internal_conflict;
use mclock::json_output::JsonOutput;
use mclock::lock_service::LockService;
use mclock::request::LockRequest;
use mclock::script::{self, ScriptOutcome};
use mclock::validator;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    env_logger::Builder::new()
        .filter_level(config.log_filter())
        .parse_default_env()
        .init();

    let result = match &cli.command {
        Commands::Replay { script, audit } => cmd_replay(&config, script, *audit, cli.json),
        Commands::Check { request } => cmd_check(request, cli.json),
        Commands::ShowConfig => {
            println!("{}", config.to_json());
            Ok(())
        }
    };

    if let Err(e) = &result {
        if cli.json {
            println!("{}", JsonOutput::error(&format!("{:#}", e), 1));
        }
    }
    result
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::named_preset(&cli.preset).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown preset '{}', expected production, development or testing",
                cli.preset
            )
        }),
    }
}

fn cmd_replay(config: &Config, script_path: &Path, audit: bool, json: bool) -> Result<()> {
    let contents = fs::read_to_string(script_path)
        .with_context(|| format!("Failed to read script {:?}", script_path))?;
    let ops = script::parse_script(&contents)
        .with_context(|| format!("Failed to parse script {:?}", script_path))?;

    log::info!("Replaying {} operation(s) from {:?}", ops.len(), script_path);

    let service = LockService::with_config(config);
    let outcomes = script::run_script(&service, &ops);

    if json {
        let results: Vec<_> = outcomes.iter().map(JsonOutput::outcome).collect();
        println!(
            "{}",
            json!({
                "results": results,
                "stats": JsonOutput::stats(&service.stats()),
                "audit": service.audit_stats(),
            })
        );
    } else {
        for (index, outcome) in outcomes.iter().enumerate() {
            println!("[{}] {}", index, describe(outcome));
        }
        let stats = service.stats();
        println!();
        println!(
            "{} transaction(s), {} lock(s) held, next transaction id {}",
            stats.transactions, stats.requests, stats.next_transaction_id
        );
        if let Some(audit_stats) = service.audit_stats() {
            println!("Audit: {}", audit_stats);
        }
    }

    if audit {
        if service.audit_stats().is_none() {
            log::warn!("Audit log is disabled in this configuration");
        } else if json {
            println!("{}", service.export_audit_jsonl());
        } else {
            println!();
            println!("{}", service.export_audit_text());
        }
    }

    Ok(())
}

fn describe(outcome: &ScriptOutcome) -> String {
    match outcome {
        ScriptOutcome::Acquire(result) => format!("acquire: {}", result),
        ScriptOutcome::Release(result) => format!("release: {}", result),
        ScriptOutcome::ReleaseSession(ids) => format!("release session: {:?}", ids),
        ScriptOutcome::List(locks) => {
            let mut out = format!("list: {} transaction(s)", locks.len());
            for (id, requests) in locks {
                for request in requests {
                    out.push_str(&format!(
                        "\n    {} {} {:#018x} {} segment(s) owner {}",
                        id,
                        request.lock_type,
                        request.resource_id,
                        request.segments.len(),
                        request.owner()
                    ));
                }
            }
            out
        }
    }
}

fn cmd_check(request_path: &Path, json: bool) -> Result<()> {
    let contents = fs::read_to_string(request_path)
        .with_context(|| format!("Failed to read requests {:?}", request_path))?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&contents)
        .with_context(|| format!("Expected a JSON array of lock requests in {:?}", request_path))?;

    let mut valid: Vec<LockRequest> = Vec::new();
    let mut reports = Vec::new();

    for (index, value) in values.iter().enumerate() {
        let verdict = script::decode_requests(std::slice::from_ref(value))
            .and_then(|mut decoded| {
                let request = decoded.remove(0);
                validator::validate(&request).map(|()| request)
            });

        match verdict {
            Ok(request) => {
                reports.push(json!({ "index": index, "valid": true }));
                valid.push(request);
            }
            Err(reason) => reports.push(json!({ "index": index, "valid": false, "reason": reason.to_string() })),
        }
    }

    let self_conflict = has_internal_conflict(&valid);

    if json {
        println!("{}", json!({ "requests": reports, "self_conflict": self_conflict }));
    } else {
        for report in &reports {
            match report["reason"].as_str() {
                Some(reason) => println!("[{}] invalid: {}", report["index"], reason),
                None => println!("[{}] valid", report["index"]),
            }
        }
        if self_conflict {
            println!("Batch conflicts with itself");
        } else {
            println!("No conflicts within the batch");
        }
    }

    Ok(())
}
