use profile_resolver::{ResolutionOperations, ResolutionPhase, ResolverConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "profile_resolver=info,profile_lookup=info".into());

    // JSON lines when LOG_FORMAT=json, human-readable otherwise
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let inputs: Vec<String> = std::env::args().skip(1).collect();
    if inputs.is_empty() {
        eprintln!("usage: profile-lookup <name-or-address>...");
        std::process::exit(2);
    }

    let config = ResolverConfig::from_env();
    info!(
        naming = %config.naming_service_url,
        timeout_ms = config.resolve_timeout.as_millis() as u64,
        "Starting profile-lookup"
    );

    let ops = ResolutionOperations::from_config(&config);
    let mut failures = 0;

    for input in &inputs {
        ops.resolve(input).await;
        let state = ops.store().snapshot();
        if state.phase == ResolutionPhase::Failed {
            failures += 1;
        }

        match serde_json::to_string_pretty(&state) {
            Ok(json) => println!("{json}"),
            Err(e) => error!(input = %input, error = %e, "Failed to serialize state"),
        }
    }

    let stats = ops.cache().stats().await;
    info!(
        entries = stats.entries,
        hits = stats.hits,
        misses = stats.misses,
        "Done"
    );

    if failures > 0 {
        std::process::exit(1);
    }
}
