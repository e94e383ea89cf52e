#![forbid(unsafe_code)]

use std::env;
use std::io::{self, IsTerminal, Read};

use leadline_contracts::provider_secrets::ProviderSecretId;
use leadline_engines::secret_vault::SecretVault;
use leadline_os::submission::{SubmissionClient, UreqSubmissionTransport};
use leadline_tools::submit_cli::{execute_submit_command, parse_submit_args, SUBMIT_USAGE};
use leadline_tools::vault_cli::{execute_vault_command, VaultCommand, VAULT_USAGE};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let output = match args.first().map(String::as_str) {
        Some("vault") => run_vault(&args[1..])?,
        Some("submit") => run_submit(&args[1..])?,
        _ => return Err(format!("{VAULT_USAGE}\n{SUBMIT_USAGE}")),
    };
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn run_vault(args: &[String]) -> Result<String, String> {
    let subcommand = args.first().ok_or_else(|| VAULT_USAGE.to_string())?;
    let command = VaultCommand::parse(subcommand, args.get(1).map(String::as_str))?;
    let value = match command {
        VaultCommand::Set(key) => Some(read_secret_value(key)?),
        _ => None,
    };
    execute_vault_command(&SecretVault::default_local(), command, value.as_deref())
}

fn run_submit(args: &[String]) -> Result<String, String> {
    let state = parse_submit_args(args)?;
    let mut transport = UreqSubmissionTransport::from_env_var_map(|key| env::var(key).ok());
    if transport.anon_key.is_none() {
        transport.anon_key = SecretVault::default_local()
            .resolve_secret(ProviderSecretId::SubmitAnonKey)
            .map_err(|e| format!("failed to read submit key from vault: {e}"))?;
    }
    execute_submit_command(&SubmissionClient::new(transport), &state)
}

fn read_secret_value(key: ProviderSecretId) -> Result<String, String> {
    let value = if io::stdin().is_terminal() {
        rpassword::prompt_password(format!("Enter value for {}:", key.as_str()))
            .map_err(|e| e.to_string())?
    } else {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| e.to_string())?;
        input
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("secret value must not be empty".to_string());
    }
    Ok(trimmed.to_string())
}
