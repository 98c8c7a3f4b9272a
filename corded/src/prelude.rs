//! Commonly used types, importable in one line.

pub use crate::client::CordedClient;
pub use corded_gateway::{
    Cluster, ClusterConfig, Direction, GatewayError, GatewayEvent, MiddlewareAction,
};
pub use corded_http::{File, HttpClient, HttpError, RequestOptions, ResponseFormat, Route};
pub use corded_model::{Intents, Snowflake};
