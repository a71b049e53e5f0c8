use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use url::Url;

/// Chorus: one prompt, many models
#[derive(Debug, Parser)]
#[command(name = "chorus", about = "Fan one prompt out to several LLM providers and compare the answers")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "chorus.toml", env = "CHORUS_CONFIG", global = true)]
    pub config: PathBuf,

    /// Log filter directive, e.g. `info` or `chorus_dispatch=debug`
    #[arg(long, default_value = "info", env = "CHORUS_LOG", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the relay server
    Serve {
        /// Override the listen address
        #[arg(long, env = "CHORUS_LISTEN")]
        listen: Option<SocketAddr>,
    },
    /// Send a prompt to every target and print each answer as it settles
    Ask(AskArgs),
}

#[derive(Debug, clap::Args)]
pub struct AskArgs {
    /// Ad-hoc target as `provider:model`; replaces the configured targets
    #[arg(short, long = "target")]
    pub targets: Vec<TargetSpec>,

    /// Ask ad-hoc targets to stream their reasoning
    #[arg(long)]
    pub thinking: bool,

    /// System prompt for ad-hoc targets
    #[arg(long)]
    pub system: Option<String>,

    /// Dispatch through a running relay instead of in-process
    #[arg(long, env = "CHORUS_RELAY_URL")]
    pub relay: Option<Url>,

    /// Prompt text
    #[arg(required = true, trailing_var_arg = true)]
    pub prompt: Vec<String>,
}

/// `provider:model` pair given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub provider: String,
    pub model: String,
}

impl FromStr for TargetSpec {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (provider, model) = raw
            .split_once(':')
            .ok_or_else(|| format!("expected provider:model, got '{raw}'"))?;

        if provider.is_empty() || model.is_empty() {
            return Err(format!("expected provider:model, got '{raw}'"));
        }

        Ok(Self {
            provider: provider.to_owned(),
            model: model.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_spec_splits_on_first_colon() {
        let spec: TargetSpec = "openrouter:meta-llama/llama-3:free".parse().unwrap();
        assert_eq!(spec.provider, "openrouter");
        assert_eq!(spec.model, "meta-llama/llama-3:free");

        assert!("openai".parse::<TargetSpec>().is_err());
        assert!(":gpt-4o".parse::<TargetSpec>().is_err());
    }

    #[test]
    fn ask_collects_targets_and_prompt() {
        let args = Args::try_parse_from([
            "chorus", "ask", "-t", "openai:gpt-4o", "--target", "gemini:gemini-2.5-flash", "why", "is", "the", "sky",
            "blue",
        ])
        .unwrap();

        let Command::Ask(ask) = args.command else {
            panic!("expected ask");
        };
        assert_eq!(ask.targets.len(), 2);
        assert_eq!(ask.prompt.join(" "), "why is the sky blue");
    }
}
