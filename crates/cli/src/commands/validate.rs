//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{BusBlueprint, ErrorStrategy};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    max_listeners: usize,
    batching: bool,
    publisher_max_retries: u32,
    subscriber_id: String,
    error_strategy: ErrorStrategy,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    max_listeners: blueprint.bus.max_listeners,
                    batching: blueprint.publisher.enable_batching,
                    publisher_max_retries: blueprint.publisher.max_retries,
                    subscriber_id: blueprint.subscriber.id.clone(),
                    error_strategy: blueprint.subscriber.error_strategy,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &BusBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    let publisher = &blueprint.publisher;
    if publisher.enable_batching && publisher.batch_size == 1 {
        warnings.push("publisher.batch_size is 1 - every batched publish flushes alone".to_string());
    }
    if publisher.max_retries == 0 {
        warnings.push("publisher.max_retries is 0 - retry: true publishes never retry".to_string());
    }

    let subscriber = &blueprint.subscriber;
    if subscriber.error_strategy == ErrorStrategy::Retry && subscriber.max_retries == 0 {
        warnings.push(
            "subscriber.error_strategy is retry but max_retries is 0 - failures dead-letter at once"
                .to_string(),
        );
    }
    if subscriber.error_strategy == ErrorStrategy::Ignore {
        warnings.push("subscriber.error_strategy is ignore - failed events are dropped".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Max listeners: {}", summary.max_listeners);
            println!("  Batching: {}", summary.batching);
            println!("  Publisher retries: {}", summary.publisher_max_retries);
            println!(
                "  Subscriber: {} ({:?})",
                summary.subscriber_id, summary.error_strategy
            );
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
