//! Path-driven target resolution
//!
//! `/<db>/<collection>/_<action>/` selects the collection level,
//! `/<db>/_<action>/` the database level and `/_<action>/` the client itself.

use super::actions::ActionTarget;
use super::connector::StoreConnection;
use super::credentials::Credential;
use super::provider::ConnectionLease;
use crate::core::Result;
use crate::result::RawValue;
use percent_encoding::percent_decode_str;
use serde_json::Value;

/// Prefix that marks the action segment of a path
pub const ACTION_MARKER: char = '_';

/// Database, collection and action named by a request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    pub database: Option<String>,
    pub collection: Option<String>,
    pub action: String,
}

impl RoutePlan {
    /// Returns `None` when the path matches none of the three route shapes.
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<String> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
            .collect();

        let (action, scope) = segments.split_last()?;
        let action = action_name(action)?;
        if scope.len() > 2 || scope.iter().any(|segment| action_name(segment).is_some()) {
            return None;
        }

        Some(Self {
            database: scope.first().cloned(),
            collection: scope.get(1).cloned(),
            action: action.to_string(),
        })
    }
}

fn action_name(segment: &str) -> Option<&str> {
    segment
        .strip_prefix(ACTION_MARKER)
        .filter(|name| !name.is_empty())
}

/// Everything a request carries into dispatch. Built once, then only read.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: u64,
    pub database: Option<String>,
    pub collection: Option<String>,
    pub action: String,
    pub args: Vec<Value>,
    pub credential: Option<Credential>,
}

impl RequestContext {
    pub fn new(request_id: u64, plan: RoutePlan, args: Vec<Value>, credential: Option<Credential>) -> Self {
        Self {
            request_id,
            database: plan.database,
            collection: plan.collection,
            action: plan.action,
            args,
            credential,
        }
    }
}

/// The object an action is invoked on
pub enum DispatchTarget<'a> {
    Client(&'a dyn StoreConnection),
    Database(Box<dyn ActionTarget>),
    Collection(Box<dyn ActionTarget>),
}

impl DispatchTarget<'_> {
    pub fn level(&self) -> &'static str {
        match self {
            Self::Client(_) => "client",
            Self::Database(_) => "database",
            Self::Collection(_) => "collection",
        }
    }

    pub async fn invoke(&self, action: &str, args: &[Value]) -> Result<RawValue> {
        match self {
            Self::Client(connection) => connection.invoke(action, args).await,
            Self::Database(target) | Self::Collection(target) => target.invoke(action, args).await,
        }
    }
}

/// Walks client -> database -> collection as far as the path goes
pub fn resolve<'a>(lease: &'a ConnectionLease, context: &RequestContext) -> DispatchTarget<'a> {
    let connection = lease.connection();
    match (&context.database, &context.collection) {
        (None, _) => DispatchTarget::Client(connection),
        (Some(db), None) => DispatchTarget::Database(connection.database(db)),
        (Some(db), Some(collection)) => DispatchTarget::Collection(connection.collection(db, collection)),
    }
}
