//! Request/response side of the remote service.

use std::future::Future;

use secrecy::SecretString;

use crate::error::Error;
use crate::models::{EndpointRef, UserData};
use crate::snowflake::Snowflake;

/// Everything the session needs from the request/response API.
///
/// Entity fetches return raw JSON; typing happens in the caller so that
/// one fetch path serves every entity kind.
pub trait Origin: Send + Sync + 'static {
    /// Validate `token` and return the authenticated user's raw record.
    fn authenticate(&self, token: &SecretString)
    -> impl Future<Output = Result<UserData, Error>> + Send;

    /// Discover where to open the real-time connection.
    fn resolve_endpoint(&self) -> impl Future<Output = Result<EndpointRef, Error>> + Send;

    fn fetch_channel(
        &self,
        id: Snowflake,
    ) -> impl Future<Output = Result<serde_json::Value, Error>> + Send;

    fn fetch_guild(
        &self,
        id: Snowflake,
    ) -> impl Future<Output = Result<serde_json::Value, Error>> + Send;

    fn fetch_user(
        &self,
        id: Snowflake,
    ) -> impl Future<Output = Result<serde_json::Value, Error>> + Send;

    /// Release the transport. Later calls fail with [`Error::Closed`].
    fn close(&self) -> impl Future<Output = ()> + Send;
}
