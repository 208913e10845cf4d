//! Output formatting: text, JSON, compact JSON.
//!
//! Renders entities and events in the format selected by `--output`.

use std::io::{self, Write};

use serde_json::json;
use tether_core::{Entity, Event};

use crate::cli::OutputFormat;

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a single serde-serializable item in the chosen format.
///
/// Text rendering uses `detail_fn`, structured formats serialize `data`.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
) -> Result<String, serde_json::Error>
where
    T: serde::Serialize + ?Sized,
{
    match format {
        OutputFormat::Text => Ok(detail_fn(data)),
        OutputFormat::Json => serde_json::to_string_pretty(data),
        OutputFormat::JsonCompact => serde_json::to_string(data),
    }
}

/// Print the rendered output to stdout.
pub fn print_output(output: &str) {
    if output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Entities ─────────────────────────────────────────────────────────

pub fn render_entity(format: OutputFormat, entity: &Entity) -> Result<String, serde_json::Error> {
    let data = match entity {
        Entity::User(user) => json!({ "type": "user", "data": user }),
        Entity::Guild(guild) => json!({ "type": "guild", "data": guild }),
        Entity::Channel(channel) => json!({ "type": "channel", "data": channel }),
    };
    render_single(format, &data, |_| entity_detail(entity))
}

fn entity_detail(entity: &Entity) -> String {
    match entity {
        Entity::User(user) => {
            let mut lines = vec![
                format!("user     {}", user.id),
                format!("tag      {}", user.tag()),
                format!("name     {}", user.display_name()),
            ];
            if user.bot {
                lines.push("bot      yes".into());
            }
            if let Some(created) = user.created_at() {
                lines.push(format!("created  {}", created.to_rfc3339()));
            }
            lines.join("\n")
        }
        Entity::Guild(guild) => {
            let mut lines = vec![
                format!("guild    {}", guild.id),
                format!("name     {}", guild.name),
            ];
            if let Some(count) = guild.member_count {
                lines.push(format!("members  {count}"));
            }
            if !guild.features.is_empty() {
                lines.push(format!("features {}", guild.features.join(", ")));
            }
            lines.join("\n")
        }
        Entity::Channel(channel) => {
            let mut lines = vec![
                format!("channel  {}", channel.id),
                format!("kind     {:?}", channel.kind),
            ];
            if let Some(ref name) = channel.name {
                lines.push(format!("name     #{name}"));
            }
            if let Some(guild) = channel.guild_id {
                lines.push(format!("guild    {guild}"));
            }
            lines.join("\n")
        }
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// One line (or block, for pretty JSON) per received event.
pub fn render_event(format: OutputFormat, event: &Event) -> Result<String, serde_json::Error> {
    let payload = event.payload().cloned().unwrap_or(serde_json::Value::Null);
    match format {
        OutputFormat::Text => Ok(format!("{} {}", event.name, serde_json::to_string(&payload)?)),
        OutputFormat::Json => {
            serde_json::to_string_pretty(&json!({ "event": event.name, "data": payload }))
        }
        OutputFormat::JsonCompact => {
            serde_json::to_string(&json!({ "event": event.name, "data": payload }))
        }
    }
}
