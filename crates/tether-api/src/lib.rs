// tether-api: Async REST and gateway transport for a persistent real-time chat service

pub mod connection;
pub mod error;
pub mod gateway;
pub mod models;
pub mod origin;
pub mod rest;
pub mod snowflake;
pub mod transport;

pub use connection::{
    Connection, ConnectionLink, Connector, EventSink, ReconnectReceiver, ReconnectRequester,
    RunOutcome, reconnect_signal,
};
pub use error::Error;
pub use gateway::{GatewayConfig, GatewayConnection, GatewayConnector};
pub use models::{ChannelData, EndpointRef, GuildData, UserData};
pub use origin::Origin;
pub use rest::{DEFAULT_API_BASE, DEFAULT_API_VERSION, RestClient};
pub use snowflake::Snowflake;
pub use transport::{TlsMode, TransportConfig};
