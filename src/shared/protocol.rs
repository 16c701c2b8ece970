//! Request correlation and message dispatch.
//!
//! One [`Protocol`] instance exists per logical connection (the client holds
//! one; the server holds one per session for its reverse requests). It
//! allocates monotonically increasing outbound ids, pairs responses with
//! their waiting callers, and fans notifications out to subscribers.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::error::{Error, Result, TransportError};
use crate::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};

/// Callback invoked for every inbound notification.
pub type NotificationHandler = Arc<dyn Fn(JsonRpcNotification) + Send + Sync>;

/// Handler for inbound requests on a bidirectional connection.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produce the response for one inbound request.
    async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse;
}

/// Correlation and dispatch state for one connection.
pub struct Protocol {
    next_id: AtomicI64,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>,
    subscribers: RwLock<Vec<NotificationHandler>>,
    request_handler: RwLock<Option<Arc<dyn RequestHandler>>>,
    closed: AtomicBool,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol {
    /// Create an empty protocol instance.
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
            subscribers: RwLock::new(Vec::new()),
            request_handler: RwLock::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Allocate the next outbound request id.
    pub fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register an in-flight outbound request and return the receiver its
    /// response will be delivered on.
    pub fn register(&self, id: RequestId) -> Result<oneshot::Receiver<JsonRpcResponse>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed.into());
        }
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        Ok(rx)
    }

    /// Deliver a response to its waiting caller.
    ///
    /// Returns false (and logs) when no matching request is pending; the
    /// response is dropped.
    pub fn complete(&self, response: JsonRpcResponse) -> bool {
        let sender = self.pending.lock().remove(&response.id);
        match sender {
            Some(tx) => {
                // The caller may have given up (timeout); that is not an error.
                let _ = tx.send(response);
                true
            },
            None => {
                tracing::debug!(
                    target: "mcpio::dispatch",
                    id = %response.id,
                    "dropping response for unknown request id"
                );
                false
            },
        }
    }

    /// Forget an in-flight request (caller timed out or was cancelled).
    pub fn cancel(&self, id: &RequestId) {
        self.pending.lock().remove(id);
    }

    /// Number of in-flight outbound requests.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Fail every in-flight request; subsequent registrations are rejected.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let pending = std::mem::take(&mut *self.pending.lock());
        // Dropping the senders wakes every waiter with a RecvError, which the
        // callers surface as a closed-connection failure.
        drop(pending);
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Add a notification subscriber.
    pub fn subscribe_notifications(&self, handler: NotificationHandler) {
        self.subscribers.write().push(handler);
    }

    /// Fan an inbound notification out to all subscribers.
    ///
    /// The subscriber list is snapshotted before iterating so handlers may
    /// re-enter the protocol (subscribe, send requests) without deadlock.
    pub fn dispatch_notification(&self, notification: &JsonRpcNotification) {
        let subscribers = self.subscribers.read().clone();
        for handler in subscribers {
            handler(notification.clone());
        }
    }

    /// Install the handler for inbound requests (bidirectional transports).
    /// Replaces any prior handler.
    pub fn set_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        *self.request_handler.write() = Some(handler);
    }

    /// The installed inbound-request handler, if any.
    pub fn request_handler(&self) -> Option<Arc<dyn RequestHandler>> {
        self.request_handler.read().clone()
    }

    /// Await the response for a registered request.
    pub async fn wait(
        &self,
        id: RequestId,
        rx: oneshot::Receiver<JsonRpcResponse>,
        timeout: Option<std::time::Duration>,
    ) -> Result<JsonRpcResponse> {
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.cancel(&id);
                    return Err(Error::Timeout);
                },
            },
            None => rx.await,
        };
        outcome.map_err(|_| Error::Transport(TransportError::ConnectionClosed))
    }
}

impl std::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol")
            .field("pending", &self.pending_len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JsonRpcResponse;
    use serde_json::json;

    #[tokio::test]
    async fn ids_are_monotonic() {
        let protocol = Protocol::new();
        let first = protocol.next_request_id();
        let second = protocol.next_request_id();
        assert_ne!(first, second);
        let (RequestId::Number(a), RequestId::Number(b)) = (first, second) else {
            panic!("expected numeric ids");
        };
        assert!(b > a);
    }

    #[tokio::test]
    async fn register_and_complete() {
        let protocol = Protocol::new();
        let id = protocol.next_request_id();
        let rx = protocol.register(id.clone()).unwrap();
        assert_eq!(protocol.pending_len(), 1);

        assert!(protocol.complete(JsonRpcResponse::success(id.clone(), json!("ok"))));
        assert_eq!(protocol.pending_len(), 0);

        let response = rx.await.unwrap();
        assert_eq!(response.result(), Some(&json!("ok")));
    }

    #[tokio::test]
    async fn unknown_response_is_dropped() {
        let protocol = Protocol::new();
        assert!(!protocol.complete(JsonRpcResponse::success(RequestId::Number(99), json!(null))));
    }

    #[tokio::test]
    async fn concurrent_requests_each_get_their_own_response() {
        let protocol = Arc::new(Protocol::new());
        let mut waiters = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..16 {
            let id = protocol.next_request_id();
            let rx = protocol.register(id.clone()).unwrap();
            ids.push(id.clone());
            waiters.push(tokio::spawn(async move {
                let response = rx.await.unwrap();
                (id, response)
            }));
        }

        // Complete in reverse order to exercise correlation, not FIFO luck.
        for id in ids.iter().rev() {
            protocol.complete(JsonRpcResponse::success(id.clone(), json!(id.to_string())));
        }

        for waiter in waiters {
            let (id, response) = waiter.await.unwrap();
            assert_eq!(response.id, id);
            assert_eq!(response.result(), Some(&json!(id.to_string())));
        }
    }

    #[tokio::test]
    async fn close_fails_pending_and_rejects_new() {
        let protocol = Protocol::new();
        let id = protocol.next_request_id();
        let rx = protocol.register(id).unwrap();
        protocol.close();

        assert!(rx.await.is_err());
        assert!(protocol.register(RequestId::Number(1000)).is_err());
    }

    #[tokio::test]
    async fn notification_fanout_preserves_all_subscribers() {
        let protocol = Protocol::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b"] {
            let seen = seen.clone();
            protocol.subscribe_notifications(Arc::new(move |n| {
                seen.lock().push(format!("{tag}:{}", n.method));
            }));
        }
        protocol.dispatch_notification(&JsonRpcNotification::new("notifications/progress", None));
        let mut got = seen.lock().clone();
        got.sort();
        assert_eq!(got, vec!["a:notifications/progress", "b:notifications/progress"]);
    }

    #[tokio::test]
    async fn wait_times_out_and_clears_pending() {
        let protocol = Protocol::new();
        let id = protocol.next_request_id();
        let rx = protocol.register(id.clone()).unwrap();
        let result = protocol
            .wait(id, rx, Some(std::time::Duration::from_millis(20)))
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(protocol.pending_len(), 0);
    }
}
