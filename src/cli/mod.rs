//! Operator CLI: provision test fixtures, probe a running gateway, apply
//! standard quotas, clean up.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "llm-gateway", version, about = "AI API gateway")]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway server (default)
    Serve,

    /// Provision a test user, credential, provider, model and pricing
    Setup(SetupArgs),

    /// Send one chat completion through a running gateway
    Test(TestArgs),

    /// Delete the data created by setup
    Cleanup,

    /// Apply the standard quota set to a credential
    Quotas(QuotasArgs),
}

#[derive(Parser)]
pub struct SetupArgs {
    /// Username for the provisioned account
    #[arg(long, default_value = "gateway-test")]
    pub username: String,

    /// Starting balance
    #[arg(long, default_value = "100.00")]
    pub balance: String,

    /// Upstream base URL for the seeded provider
    #[arg(long, default_value = "https://api.openai.com")]
    pub base_url: String,

    /// Upstream credential for the seeded provider
    #[arg(long, default_value = "sk-upstream-placeholder")]
    pub upstream_key: String,

    /// Logical model slug to seed
    #[arg(long, default_value = "gpt-4")]
    pub model: String,
}

#[derive(Parser)]
pub struct TestArgs {
    /// Credential secret to call with
    #[arg(long)]
    pub key: String,

    /// Gateway endpoint
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub endpoint: String,

    /// Model slug to request
    #[arg(long, default_value = "gpt-4")]
    pub model: String,

    /// Prompt to send
    #[arg(long, default_value = "Say hello in one short sentence.")]
    pub prompt: String,
}

#[derive(Parser)]
pub struct QuotasArgs {
    /// Credential secret (or its visible prefix) to attach quotas to
    #[arg(long)]
    pub key: String,
}
