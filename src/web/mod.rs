//! HTTP gateway
//!
//! Maps `POST /[db/[collection/]]_action/` requests with a JSON array body
//! onto driver calls.
//!
//! Per request: method check, body validation, route, credentials,
//! connection, target resolution, invocation, normalization. A deadline task
//! races the whole pipeline and at most one of them answers.
//!
//! Connections come from the [`StoreConnector`] registered for the store
//! URI's scheme.

pub mod actions;
pub mod connector;
pub mod credentials;
pub mod error;
pub mod guard;
pub mod normalize;
pub mod provider;
pub mod router;
pub mod target;

pub use actions::ActionTarget;
pub use connector::{ConnectorFactory, ConnectorRegistry, DocstoreConnector, StoreConnection, StoreConnector};
pub use credentials::Credential;
pub use error::{GatewayError, Result};
pub use provider::{ConnectionLease, ConnectionProvider};
pub use router::{GatewayState, gateway_router};
pub use target::{DispatchTarget, RequestContext, RoutePlan};
