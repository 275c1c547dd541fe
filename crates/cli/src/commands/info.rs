//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::BusBlueprint;
use tracing::info;

use crate::cli::InfoArgs;

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let json = config_loader::ConfigLoader::to_json(&blueprint)
            .context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint);
    }

    Ok(())
}

fn print_config_info(blueprint: &BusBlueprint) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  Event Bus Configuration                     ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📡 Bus");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   └─ Max listeners per event: {}", blueprint.bus.max_listeners);

    let publisher = &blueprint.publisher;
    println!("\n📤 Publisher");
    if publisher.enable_batching {
        println!(
            "   ├─ Batching: {} items / {} ms",
            publisher.batch_size, publisher.batch_timeout_ms
        );
    } else {
        println!("   ├─ Batching: disabled");
    }
    println!(
        "   ├─ Retries: {} (base {} ms)",
        publisher.max_retries, publisher.retry_base_delay_ms
    );
    println!("   └─ Ack timeout: {} ms", publisher.ack_timeout_ms);

    let subscriber = &blueprint.subscriber;
    println!("\n📥 Subscriber");
    println!("   ├─ Id: {}", subscriber.id);
    println!("   ├─ Error strategy: {:?}", subscriber.error_strategy);
    println!(
        "   ├─ Retries: {} (base {} ms)",
        subscriber.max_retries, subscriber.retry_base_delay_ms
    );
    println!("   └─ Dead-letter event: {}", subscriber.dead_letter_event);

    println!();
}
