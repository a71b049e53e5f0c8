//! `chorus ask`: dispatch one prompt in-process and print the answers

use std::sync::Arc;

use chorus_config::Config;
use chorus_dispatch::{Engine, HttpRelay, InProcessRelay, Outcome, RelayTransport, Settlement, TargetConfig};
use chorus_llm::{Registry, Relay};

use crate::args::AskArgs;

pub async fn run(config: Config, args: AskArgs) -> anyhow::Result<()> {
    let registry = Registry::new();
    chorus_server::check_providers(&config, &registry)?;

    let targets = targets(&config, &args, &registry)?;
    let prompt = args.prompt.join(" ");

    let transport: Arc<dyn RelayTransport> = match args.relay {
        Some(url) => Arc::new(HttpRelay::new(url)),
        None => Arc::new(InProcessRelay::new(Relay::new(registry.clone()))),
    };

    let engine = Engine::builder(transport)
        .registry(registry)
        .credentials(config.providers)
        .settings(config.dispatch)
        .build();

    let mut batch = engine.dispatch(&prompt, targets)?;

    let interrupt = {
        let engine = engine.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted, cancelling all targets");
                engine.cancel_all();
            }
        })
    };

    let mut failures = 0;
    while let Some(settlement) = batch.next_settled().await {
        if matches!(settlement.outcome, Outcome::Error(_)) {
            failures += 1;
        }
        print_settlement(&settlement);
    }
    interrupt.abort();

    if failures > 0 {
        tracing::warn!(failures, "some targets failed");
    }

    Ok(())
}

/// Ad-hoc `--target` entries win over configured `[[targets]]`
fn targets(config: &Config, args: &AskArgs, registry: &Registry) -> anyhow::Result<Vec<TargetConfig>> {
    if args.targets.is_empty() {
        if config.targets.is_empty() {
            anyhow::bail!("no targets: pass --target provider:model or add [[targets]] to the config");
        }
        return Ok(config.targets.iter().map(TargetConfig::from).collect());
    }

    args.targets
        .iter()
        .map(|spec| {
            if registry.lookup(&spec.provider).is_none() {
                anyhow::bail!("unknown provider '{}'", spec.provider);
            }

            let mut target = TargetConfig::new(
                format!("{}:{}", spec.provider, spec.model),
                spec.provider.as_str(),
                spec.model.as_str(),
            );
            target.system_prompt.clone_from(&args.system);
            if args.thinking {
                target = target.with_thinking(true);
            }
            Ok(target)
        })
        .collect()
}

fn print_settlement(settlement: &Settlement) {
    let turn = &settlement.turn;

    println!("== {} [{}]", settlement.target, settlement.outcome.label());

    if !turn.reasoning.is_empty() {
        println!("-- reasoning");
        println!("{}", turn.reasoning.trim_end());
        println!("--");
    }

    println!("{}", turn.text.trim_end());

    if let Some(usage) = turn.usage {
        println!(
            "(tokens: {} prompt, {} completion, {} total)",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        );
    }

    for suggestion in &turn.suggestions {
        println!("> {suggestion}");
    }

    println!();
}
