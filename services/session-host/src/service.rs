//! The session manager: entry point for clients starting sessions.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pairwise_id::{SessionId, SessionIdAllocator};
use pairwise_message::{Details, Envelope, MessageType, SessionInfo, SessionStatus};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::actors::{Actor, ActorContext, HandlerFuture, HandlerTable};
use crate::config::HostConfig;
use crate::error::ActorError;
use crate::path::ActorPath;
use crate::session::{MemberFactory, SessionRoot};

/// Reply of `start_session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStarted {
    /// Location the caller takes in the session.
    pub location: String,
    /// Path of the session root.
    pub base: ActorPath,
    pub id: SessionId,
}

#[derive(Debug, Deserialize)]
struct StartSessionArgs {
    from_location: String,
    #[serde(default)]
    session_id: Option<SessionId>,
    #[serde(default)]
    details: Option<Details>,
}

#[derive(Debug, Clone)]
struct SessionEntry {
    base: ActorPath,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    from_location: String,
    details: Details,
}

/// Creates one [`SessionRoot`] per client request and tracks the live ones.
pub struct SessionManager {
    location: String,
    factory: MemberFactory,
    sessions: BTreeMap<SessionId, SessionEntry>,
    ids: SessionIdAllocator,
    pairing_timeout: Option<Duration>,
}

impl SessionManager {
    /// A manager whose sessions host their `location` member through `factory`.
    pub fn new(location: impl Into<String>, factory: MemberFactory) -> Self {
        Self {
            location: location.into(),
            factory,
            sessions: BTreeMap::new(),
            ids: SessionIdAllocator::new(),
            pairing_timeout: None,
        }
    }

    pub fn from_config(config: &HostConfig, factory: MemberFactory) -> Self {
        Self::new(config.system_name.clone(), factory).with_pairing_timeout(config.pairing_timeout())
    }

    pub fn with_pairing_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pairing_timeout = timeout;
        self
    }

    async fn start_session(
        &mut self,
        args: Value,
        ctx: &mut ActorContext,
    ) -> Result<Value, ActorError> {
        let args: StartSessionArgs =
            serde_json::from_value(args).map_err(ActorError::invalid_args)?;
        if args.from_location == self.location {
            return Err(ActorError::invalid_args(format!(
                "location {:?} is hosted by this service",
                args.from_location
            )));
        }

        if let Some(id) = args.session_id {
            if let Some(entry) = self.sessions.get(&id) {
                debug!(uri = %ctx.path(), session_id = %id, "Session already started");
                return Ok(json!(SessionStarted {
                    location: args.from_location,
                    base: entry.base.clone(),
                    id,
                }));
            }
        }

        let id = self.ids.next_id();
        let base = ctx.path().child(&id.to_string())?.as_base();
        let locations = vec![args.from_location.clone(), self.location.clone()];
        let root = SessionRoot::new(id, locations, self.location.clone(), self.factory.clone())
            .with_pairing_timeout(self.pairing_timeout);
        let node = ctx.node().derive().with_session_id(id);
        ctx.spawn_child(base.clone(), Box::new(root), node)?;

        info!(
            uri = %ctx.path(),
            session_id = %id,
            from_location = %args.from_location,
            "Session started"
        );
        self.sessions.insert(
            id,
            SessionEntry {
                base: base.clone(),
                status: SessionStatus::Created,
                started_at: Utc::now(),
                from_location: args.from_location.clone(),
                details: args.details.unwrap_or_default(),
            },
        );
        Ok(json!(SessionStarted {
            location: args.from_location,
            base,
            id,
        }))
    }

    fn list_sessions(&self) -> Value {
        json!(self
            .sessions
            .iter()
            .map(|(id, entry)| json!({
                "id": id,
                "base": entry.base,
                "status": entry.status,
                "started_at": entry.started_at.to_rfc3339(),
                "from_location": entry.from_location,
                "details": entry.details,
            }))
            .collect::<Vec<_>>())
    }

    fn on_session_info<'a>(
        &'a mut self,
        envelope: Envelope,
        ctx: &'a mut ActorContext,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let info: SessionInfo = envelope.payload()?;
            let source = ActorPath::parse(&envelope.source.uri)?;
            let id = SessionId::parse(source.name())?;
            if info.status == SessionStatus::Stopped {
                if self.sessions.remove(&id).is_some() {
                    info!(uri = %ctx.path(), session_id = %id, "Session ended");
                }
                return Ok(());
            }
            match self.sessions.get_mut(&id) {
                Some(entry) => entry.status = info.status,
                None => warn!(uri = %ctx.path(), session_id = %id, "Status of unknown session"),
            }
            Ok(())
        })
    }
}

#[async_trait]
impl Actor for SessionManager {
    fn type_name(&self) -> &str {
        "SessionManager"
    }

    fn handlers() -> HandlerTable<Self> {
        HandlerTable::new().on(MessageType::SessionInfo, Self::on_session_info)
    }

    async fn on_bind(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        info!(uri = %ctx.path(), location = %self.location, "Session manager started");
        Ok(())
    }

    async fn call(
        &mut self,
        method: &str,
        args: Value,
        ctx: &mut ActorContext,
    ) -> Result<Value, ActorError> {
        match method {
            "start_session" => self.start_session(args, ctx).await,
            "sessions" => Ok(self.list_sessions()),
            _ => Err(ActorError::UnknownMethod {
                uri: ctx.path().to_string(),
                method: method.to_string(),
            }),
        }
    }

    fn describe(&self) -> Value {
        json!({
            "location": self.location,
            "sessions": self.sessions.len(),
            "last_session_id": self.sessions.keys().next_back(),
        })
    }
}
