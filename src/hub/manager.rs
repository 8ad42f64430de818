//! Broadcast hub - connection lifecycle and message fan-out

use super::connection::{ClientId, CloseReason, ConnState, Connection, SessionBinding};
use super::error::HubError;
use super::registry::Registry;
use crate::protocol::{event_type, Notice};
use crate::recorder::Recorder;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use uuid::Uuid;

/// How much a slow consumer may hold up a send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendPolicy {
    /// Frames buffered per connection before sends start waiting
    pub queue_capacity: usize,

    /// How long a send waits for queue space before the connection is dropped
    pub send_timeout: Duration,
}

impl Default for SendPolicy {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            send_timeout: Duration::from_secs(1),
        }
    }
}

/// Tracks live connections and relays messages between them.
///
/// Built once at startup and shared by handle with every connection task.
pub struct Hub {
    registry: Registry,
    policy: SendPolicy,
    recorder: Option<Recorder>,

    /// Session wrap-ups running in the background
    wrap_ups: Mutex<JoinSet<()>>,
}

impl Hub {
    /// A hub that relays without recording anything
    pub fn new(policy: SendPolicy) -> Self {
        Self {
            registry: Registry::new(),
            policy,
            recorder: None,
            wrap_ups: Mutex::new(JoinSet::new()),
        }
    }

    /// Record sessions and events through `recorder`
    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Register a client whose handshake has completed.
    ///
    /// Returns the connection and the receiving end of its outbound queue,
    /// which the transport drains into the socket. When `resume` names an
    /// existing session, events are recorded against it instead of a new one.
    ///
    /// If the connection is dropped while its session is being opened, the
    /// session is wrapped up and the join fails with `JoinAborted`.
    pub async fn join(
        &self,
        client_id: ClientId,
        resume: Option<Uuid>,
    ) -> Result<(Arc<Connection>, mpsc::Receiver<String>), HubError> {
        let (tx, rx) = mpsc::channel(self.policy.queue_capacity.max(1));
        let connection = Arc::new(Connection::new(client_id, tx));

        self.registry.add(Arc::clone(&connection)).await?;
        connection.mark_connected();
        tracing::info!(client_id = %connection.client_id(), "Client joined");

        if let (Some(recorder), Some(binding)) =
            (&self.recorder, self.open_session(&connection, resume).await)
        {
            let payload = json!({ "client_id": connection.client_id().as_str() });
            record(recorder, binding, connection.client_id(), event_type::JOIN, payload).await;

            // Bound only after the join event, so a leave never records first
            connection.bind_session(binding);
        }

        if connection.is_closed() {
            tracing::info!(client_id = %connection.client_id(), "Client dropped while joining");
            self.spawn_wrap_up(&connection).await;
            return Err(HubError::JoinAborted(connection.client_id().clone()));
        }

        Ok((connection, rx))
    }

    /// Remove a connection and tell everyone else it left.
    ///
    /// Idempotent: only the call that actually removes the connection sends
    /// the departure notice. Returns whether this call removed it.
    pub async fn leave(&self, connection: &Arc<Connection>, reason: CloseReason) -> bool {
        let (removed, mut pending) = self.evict(connection, reason).await;

        // Departure notices can fail too; those connections leave in turn
        while let Some(next) = pending.pop() {
            let (_, failed) = self.evict(&next, CloseReason::Server).await;
            pending.extend(failed);
        }

        removed
    }

    /// Best-effort send to one connection. A failed send drops the connection.
    pub async fn send_to(&self, connection: &Arc<Connection>, text: impl Into<String>) -> bool {
        match connection.send(text.into(), self.policy.send_timeout).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(client_id = %connection.client_id(), error = %e, "Send failed, dropping client");
                self.leave(connection, CloseReason::Server).await;
                false
            }
        }
    }

    /// Send to the live connection registered under `client_id`, if any
    pub async fn send_to_client(&self, client_id: &ClientId, text: impl Into<String>) -> bool {
        match self.registry.get(client_id).await {
            Some(connection) => self.send_to(&connection, text).await,
            None => false,
        }
    }

    /// Send `text` to every live connection except `excluding`.
    ///
    /// Returns how many connections accepted it. Connections that fail are
    /// dropped without affecting delivery to the rest.
    pub async fn broadcast(&self, text: &str, excluding: Option<&Connection>) -> usize {
        let (delivered, failed) = self.deliver(text, excluding).await;
        for connection in failed {
            self.leave(&connection, CloseReason::Server).await;
        }
        delivered
    }

    /// Drive one connection until it closes.
    ///
    /// Each inbound text is echoed to the sender, recorded, then relayed to
    /// every other live connection, in that order. The stream ending is a
    /// peer close; an item error is a read error. Returns the final state.
    pub async fn receive_loop<S, E>(&self, connection: Arc<Connection>, mut inbound: S) -> ConnState
    where
        S: Stream<Item = Result<String, E>> + Unpin,
        E: fmt::Display,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = connection.closed() => break,
                next = inbound.next() => next,
            };

            match next {
                Some(Ok(text)) => self.relay(&connection, text).await,
                Some(Err(e)) => {
                    tracing::warn!(client_id = %connection.client_id(), error = %e, "Read failed");
                    self.leave(&connection, CloseReason::Error).await;
                    break;
                }
                None => {
                    tracing::debug!(client_id = %connection.client_id(), "Peer closed");
                    self.leave(&connection, CloseReason::Peer).await;
                    break;
                }
            }
        }

        connection.state()
    }

    /// Wait for every session wrap-up started so far
    pub async fn flush_recording(&self) {
        let mut pending = std::mem::take(&mut *self.wrap_ups.lock().await);
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Session wrap-up task failed");
            }
        }
    }

    async fn relay(&self, connection: &Arc<Connection>, text: String) {
        tracing::debug!(client_id = %connection.client_id(), len = text.len(), "Message received");

        if !self.send_to(connection, Notice::echo(text.as_str())).await {
            return;
        }
        connection.count_relayed();

        if let (Some(recorder), Some(binding)) = (&self.recorder, connection.session()) {
            let payload = Value::String(text.clone());
            record(recorder, binding, connection.client_id(), event_type::MESSAGE, payload).await;
        }

        let relayed = Notice::relay(connection.client_id().as_str(), text).to_string();
        self.broadcast(&relayed, Some(connection.as_ref())).await;
    }

    /// Snapshot the registry and send to each target concurrently.
    /// Returns the delivered count and the connections whose send failed.
    async fn deliver(&self, text: &str, excluding: Option<&Connection>) -> (usize, Vec<Arc<Connection>>) {
        let timeout = self.policy.send_timeout;
        let targets = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter(|c| excluding.map_or(true, |ex| ex.serial() != c.serial()));

        let sends = targets.map(|connection| async move {
            let result = connection.send(text.to_string(), timeout).await;
            (connection, result)
        });

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (connection, result) in futures::future::join_all(sends).await {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(client_id = %connection.client_id(), error = %e, "Broadcast send failed");
                    failed.push(connection);
                }
            }
        }
        (delivered, failed)
    }

    /// Close and unregister one connection, notify the rest, start its
    /// session wrap-up. Returns whether it was removed and who failed the
    /// notice.
    async fn evict(&self, connection: &Arc<Connection>, reason: CloseReason) -> (bool, Vec<Arc<Connection>>) {
        connection.close(reason);
        if !self.registry.remove(connection).await {
            return (false, Vec::new());
        }

        tracing::info!(
            client_id = %connection.client_id(),
            state = ?connection.state(),
            "Client left"
        );

        let notice = Notice::departure(connection.client_id().as_str()).to_string();
        let (_, failed) = self.deliver(&notice, Some(connection.as_ref())).await;

        self.spawn_wrap_up(connection).await;
        (true, failed)
    }

    /// Record the leave and close the session in the background, so store
    /// latency never holds up the task that dropped the connection
    async fn spawn_wrap_up(&self, connection: &Arc<Connection>) {
        let Some(recorder) = self.recorder.clone() else {
            return;
        };
        if connection.session().is_none() || !connection.claim_wrap_up() {
            return;
        }

        let connection = Arc::clone(connection);
        let mut wrap_ups = self.wrap_ups.lock().await;
        while wrap_ups.try_join_next().is_some() {}
        wrap_ups.spawn(async move { wrap_up_session(&recorder, &connection).await });
    }

    async fn open_session(&self, connection: &Connection, resume: Option<Uuid>) -> Option<SessionBinding> {
        let recorder = self.recorder.as_ref()?;

        if let Some(session_id) = resume {
            match recorder.get_session(session_id).await {
                Ok(Some(_)) => {
                    tracing::info!(client_id = %connection.client_id(), %session_id, "Resumed session");
                    return Some(SessionBinding {
                        session_id,
                        owned: false,
                    });
                }
                Ok(None) => {
                    tracing::warn!(client_id = %connection.client_id(), %session_id, "Unknown session, starting a new one");
                }
                Err(e) => {
                    tracing::warn!(client_id = %connection.client_id(), error = %e, "Failed to look up session");
                    return None;
                }
            }
        }

        match recorder.start_session(connection.client_id().as_str()).await {
            Ok(session) => {
                tracing::debug!(client_id = %connection.client_id(), session_id = %session.session_id, "Session opened");
                Some(SessionBinding {
                    session_id: session.session_id,
                    owned: true,
                })
            }
            Err(e) => {
                tracing::warn!(client_id = %connection.client_id(), error = %e, "Failed to open session");
                None
            }
        }
    }
}

/// Record the leave and, for a session the hub opened, stamp its end
async fn wrap_up_session(recorder: &Recorder, connection: &Connection) {
    let Some(binding) = connection.session() else {
        return;
    };

    let payload = json!({
        "client_id": connection.client_id().as_str(),
        "reason": format!("{:?}", connection.state()),
    });
    record(recorder, binding, connection.client_id(), event_type::LEAVE, payload).await;

    if binding.owned {
        let summary = format!("{} messages relayed", connection.relayed());
        if let Err(e) = recorder.close_session(binding.session_id, Some(summary)).await {
            tracing::warn!(session_id = %binding.session_id, error = %e, "Failed to close session");
        }
    }
}

/// Append an event to a session; failures are logged only
async fn record(
    recorder: &Recorder,
    binding: SessionBinding,
    client_id: &ClientId,
    kind: &str,
    payload: Value,
) {
    if let Err(e) = recorder.record_event(binding.session_id, kind, payload).await {
        tracing::warn!(
            %client_id,
            session_id = %binding.session_id,
            event_type = kind,
            error = %e,
            "Failed to record event"
        );
    }
}
