//! `tether run`: keep a gateway session alive and print selected events.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tether_api::{GatewayConnector, RestClient};
use tether_core::{CoreError, Event, EventArgs, Handler, HandlerError, SessionController};

use crate::cli::{GlobalOpts, OutputFormat, RunArgs};
use crate::error::CliError;
use crate::output;

/// Printed when no `--event` is given.
const DEFAULT_EVENTS: [&str; 3] = ["ready", "guild_create", "message_create"];

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut active = super::active_profile(global)?;
    let token = super::resolve_token(global, &active)?;

    if let Some(intents) = args.intents {
        active.settings.gateway.intents = intents;
    }
    if args.max_errors.is_some() {
        active.settings.session.max_consecutive_errors = args.max_errors;
    }
    let settings = &active.settings;

    let rest = RestClient::new(
        settings.api_base.clone(),
        settings.api_version,
        &settings.transport,
    )
    .map_err(CoreError::from)?;
    let connector = GatewayConnector::new(
        SecretString::from(token.expose_secret().to_owned()),
        settings.gateway.clone(),
    );
    let session = SessionController::new(Arc::new(rest), connector, settings.session.clone());

    let events: Vec<String> = if args.events.is_empty() {
        DEFAULT_EVENTS.iter().map(|&e| e.to_owned()).collect()
    } else {
        args.events
    };
    for name in &events {
        session.listener(Some(name.as_str()), printer(global.output))?;
    }
    session.event(Some("connect"), Handler::new(|_| async {
        tracing::info!("gateway connected");
        Ok(())
    }))?;
    session.event(Some("error"), Handler::new(|event: Arc<Event>| async move {
        if let EventArgs::Error(ctx) = &event.args {
            tracing::warn!(origin = %ctx.origin, error = %ctx.error, "session error");
        }
        Ok(())
    }))?;

    tracing::info!(profile = %active.name, events = ?events, "starting session");
    session
        .start_until(&token, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "could not listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
        .map_err(|e| CliError::from(e).for_profile(&active.name))
}

fn printer(format: OutputFormat) -> Handler {
    Handler::new(move |event: Arc<Event>| async move {
        let rendered = output::render_event(format, &event).map_err(HandlerError::from)?;
        output::print_output(&rendered);
        Ok(())
    })
}
