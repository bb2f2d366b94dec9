//! # Classifier Entry Point
//!
//! Builds the classification service with offline collaborators, starts the
//! evidence sweep and classifies each variant given on the command line.
//!
//! ```text
//! classifier-server [--config path.json] <variant>...
//! ```

use classifier::{ClassifierConfig, ClassifierService, ClassifyOptions};
use log::{error, info};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::util::SubscriberInitExt;

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging()?;

    let mut args = std::env::args().skip(1).peekable();
    let mut config = match args.peek().map(String::as_str) {
        Some("--config") => {
            args.next();
            let path = args.next().ok_or("--config requires a path")?;
            ClassifierConfig::from_json_file(path)?
        }
        _ => ClassifierConfig::default(),
    };
    config.apply_env();
    config.validate()?;
    let variants: Vec<String> = args.collect();

    println!("=================================================");
    println!("  ACMG/AMP Variant Classifier                    ");
    println!("=================================================");
    println!();

    let service = ClassifierService::offline(&config)?;

    println!("Rule Registry:");
    for rule in service.engine().registry().iter() {
        println!(
            "  - {:<5} {:<11} {:<12} {}",
            rule.code, rule.category, rule.strength, rule.name
        );
    }
    println!();

    println!("Caches:");
    println!(
        "  - Tool results:  enabled={}, ttl={}s",
        config.tool_cache.enabled, config.tool_cache.default_ttl_secs
    );
    println!(
        "  - Resources:     enabled={}, ttl={}s",
        config.resource_cache.enabled, config.resource_cache.default_ttl_secs
    );
    println!(
        "  - Evidence:      enabled={}, max age={}s, sweep every {}s",
        config.evidence_cache.enabled,
        config.evidence_cache.max_age_secs,
        config.evidence_cache.sweep.interval_secs
    );
    println!(
        "  - Transcripts:   max concurrency={}",
        service.resolver().max_concurrency()
    );
    match &config.distributed {
        Some(d) => println!("  - Shared tier:   {}", d.sqlite_path.display()),
        None => println!("  - Shared tier:   disabled"),
    }
    println!();

    let sweeper = service.start_sweeper();
    service
        .preload_resources(&config.resource_cache.preload_uris)
        .await;

    let token = CancellationToken::new();
    let options = ClassifyOptions::default();
    let mut failures = 0usize;
    for variant in &variants {
        match service
            .classify_variant_cached(variant, &options, &token)
            .await
        {
            Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
            Err(e) => {
                failures += 1;
                error!("Classification of {} failed: {}", variant, e);
            }
        }
    }
    if variants.is_empty() {
        info!("No variants given; usage: classifier-server [--config path.json] <variant>...");
    }

    if let Some(handle) = sweeper {
        handle.stop().await;
    }

    println!("=================================================");
    println!(
        "  Classified {} of {} variants",
        variants.len() - failures,
        variants.len()
    );
    println!("=================================================");

    Ok(())
}
