//! Config subcommand handlers.

use std::io::BufRead;

use serde_json::json;
use tether_config::KEYRING_SERVICE;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&tether_config::config_path().display().to_string());
            Ok(())
        }

        ConfigCommand::Show => {
            let active = super::active_profile(global)?;
            let token_source = token_source(global, &active);
            let s = &active.settings;

            let data = json!({
                "profile": active.name,
                "config_path": tether_config::config_path(),
                "api_url": s.api_base.as_str(),
                "api_version": s.api_version,
                "timeout_secs": s.transport.timeout.as_secs(),
                "intents": s.gateway.intents,
                "heartbeat_timeout_secs": s.gateway.heartbeat_timeout.as_secs(),
                "max_consecutive_errors": s.session.max_consecutive_errors,
                "shutdown_grace_secs": s.session.shutdown_grace.as_secs(),
                "reconnect_initial_ms": duration_ms(s.session.reconnect.initial_delay),
                "reconnect_max_ms": duration_ms(s.session.reconnect.max_delay),
                "token": token_source,
            });

            let rendered = output::render_single(global.output, &data, |_| {
                let max_errors = s
                    .session
                    .max_consecutive_errors
                    .map_or_else(|| "unlimited".to_owned(), |n| n.to_string());
                [
                    format!("profile        {}", active.name),
                    format!("api            {} (v{})", s.api_base, s.api_version),
                    format!("timeout        {}s", s.transport.timeout.as_secs()),
                    format!("intents        {}", s.gateway.intents),
                    format!("heartbeat      {}s", s.gateway.heartbeat_timeout.as_secs()),
                    format!("max errors     {max_errors}"),
                    format!("shutdown grace {}s", s.session.shutdown_grace.as_secs()),
                    format!("token          {token_source}"),
                ]
                .join("\n")
            })?;
            output::print_output(&rendered);
            Ok(())
        }

        ConfigCommand::SetToken => {
            let config = tether_config::load_config()?;
            let (name, _) = config.profile(global.profile.as_deref())?;

            let token = match global.token {
                Some(ref token) => token.clone(),
                None => read_token_line()?,
            };
            if token.is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "token cannot be empty".into(),
                });
            }

            let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{name}/token"))?;
            entry.set_password(&token)?;
            eprintln!("Token for profile '{name}' stored in the system keyring");
            Ok(())
        }
    }
}

/// Where the token would come from, never the token itself.
fn token_source(global: &GlobalOpts, active: &super::ActiveProfile) -> &'static str {
    if global.token.is_some() {
        "flag/env"
    } else if tether_config::resolve_token(&active.profile, &active.name).is_ok() {
        "profile"
    } else {
        "missing"
    }
}

fn read_token_line() -> Result<String, CliError> {
    eprintln!("Paste the bot token and press Enter:");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_owned())
}

fn duration_ms(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
