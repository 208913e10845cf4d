//! `tether resolve <kind> <id>`: log in over REST and look one entity up.

use std::sync::Arc;

use tether_api::RestClient;
use tether_core::{CoreError, EntityKind, ObjectCache, ObjectResolver, Snowflake};

use crate::cli::{GlobalOpts, ResolveArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: ResolveArgs, global: &GlobalOpts) -> Result<(), CliError> {
    // Bad kinds fail before any network access.
    let kind = EntityKind::from_tag(&args.kind).ok_or_else(|| {
        CliError::from(CoreError::InvalidType {
            tag: args.kind.clone(),
        })
    })?;

    let active = super::active_profile(global)?;
    let token = super::resolve_token(global, &active)?;
    let settings = &active.settings;

    let rest = Arc::new(
        RestClient::new(
            settings.api_base.clone(),
            settings.api_version,
            &settings.transport,
        )
        .map_err(CoreError::from)?,
    );
    rest.login(token)
        .await
        .map_err(|e| CliError::from(CoreError::from(e)).for_profile(&active.name))?;

    let resolver = ObjectResolver::new(Arc::clone(&rest), Arc::new(ObjectCache::new()));
    let result = resolver.resolve(Snowflake::new(args.id), kind).await;
    rest.close();

    let entity = result?;
    let rendered = output::render_entity(global.output, &entity)?;
    output::print_output(&rendered);
    Ok(())
}
