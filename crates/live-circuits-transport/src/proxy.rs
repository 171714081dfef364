//! Per-circuit client proxy with a disconnect backlog.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use live_circuits_core::CircuitId;
use tokio::sync::mpsc;

use crate::protocol::{OutboundCall, ServerMessage};

/// Cap on backlogged call bytes while no client is attached (1 MB).
const BACKLOG_BYTES: usize = 1024 * 1024;

/// Traffic item for a connection's send loop.
#[derive(Debug)]
pub enum Outbound {
    /// Control message, serialized as-is.
    Message(ServerMessage),
    /// Client invocation, serialized together with its buffer frames.
    Call(OutboundCall),
}

#[derive(Debug)]
struct QueuedCall {
    call: OutboundCall,
    bytes: usize,
}

#[derive(Debug, Default)]
struct Inner {
    sender: Option<mpsc::UnboundedSender<Outbound>>,
    backlog: VecDeque<QueuedCall>,
    backlog_bytes: usize,
}

/// Handle a circuit host uses to talk to whichever client is connected.
///
/// The circuit outlives any single connection, so the proxy does too:
/// while no client is attached, calls pile up in a byte-capped backlog
/// and are replayed in order on the next attach. Clones share the same
/// backlog and attachment state.
#[derive(Debug, Clone)]
pub struct ClientProxy {
    circuit_id: CircuitId,
    inner: Arc<Mutex<Inner>>,
}

impl ClientProxy {
    /// Create a detached proxy for `circuit_id`.
    #[must_use]
    pub fn new(circuit_id: CircuitId) -> Self {
        Self {
            circuit_id,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Circuit this proxy belongs to.
    #[must_use]
    pub const fn circuit_id(&self) -> CircuitId {
        self.circuit_id
    }

    /// Whether a client connection is currently attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().sender.is_some()
    }

    /// Number of calls waiting for the next attach.
    #[must_use]
    pub fn queued_calls(&self) -> usize {
        self.inner.lock().unwrap().backlog.len()
    }

    /// Invoke a function on the client.
    ///
    /// Attached, the call goes straight to the connection's send loop;
    /// detached, it joins the backlog, evicting the oldest entries once
    /// the byte cap is exceeded. Delivery is best-effort either way: a
    /// call handed to a connection that dies mid-send is gone, exactly
    /// as it would be on the wire.
    pub fn invoke(&self, call: OutboundCall) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(sender) = &inner.sender {
            if !sender.is_closed() {
                let _ = sender.send(Outbound::Call(call));
                return;
            }
            // The send loop went away without an explicit detach.
            inner.sender = None;
        }
        self.push_capped(&mut inner, call);
    }

    /// Attach a connection's send loop, replaying the backlog in order.
    ///
    /// Replay happens under the proxy lock, ahead of setting the live
    /// sender, so calls made concurrently cannot jump the queue.
    pub fn attach(&self, sender: mpsc::UnboundedSender<Outbound>) {
        let mut inner = self.inner.lock().unwrap();
        let backlog = std::mem::take(&mut inner.backlog);
        inner.backlog_bytes = 0;
        if !backlog.is_empty() {
            tracing::debug!(
                circuit_id = %self.circuit_id,
                queued = backlog.len(),
                "replaying calls queued while detached"
            );
        }
        for queued in backlog {
            let _ = sender.send(Outbound::Call(queued.call));
        }
        inner.sender = Some(sender);
    }

    /// Drop the attached connection.
    ///
    /// The proxy stays usable: later calls queue for the next attach.
    pub fn detach(&self) {
        self.inner.lock().unwrap().sender = None;
    }

    /// Drop the attachment only if `sender` still owns it.
    ///
    /// A connection that may have been superseded by a resume calls
    /// this with its own sender, so a stale disconnect cannot unhook
    /// the takeover. Returns whether a detach happened.
    pub fn detach_if(&self, sender: &mpsc::UnboundedSender<Outbound>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if let Some(current) = &inner.sender {
            if current.same_channel(sender) {
                inner.sender = None;
                return true;
            }
        }
        false
    }

    fn push_capped(&self, inner: &mut Inner, call: OutboundCall) {
        let bytes = call.approx_bytes();
        while inner.backlog_bytes.saturating_add(bytes) > BACKLOG_BYTES {
            if let Some(front) = inner.backlog.pop_front() {
                inner.backlog_bytes = inner.backlog_bytes.saturating_sub(front.bytes);
                tracing::warn!(
                    circuit_id = %self.circuit_id,
                    "backlog full, dropping oldest queued call"
                );
            } else {
                break;
            }
        }
        inner.backlog.push_back(QueuedCall { call, bytes });
        inner.backlog_bytes = inner.backlog_bytes.saturating_add(bytes);
    }
}

#[cfg(test)]
mod tests {
    use live_circuits_core::CircuitId;
    use serde_json::Value;

    use super::*;
    use crate::protocol::CallArg;

    fn call(method: &str) -> OutboundCall {
        OutboundCall::new(method, vec![])
    }

    fn recv_call(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> OutboundCall {
        match rx.try_recv() {
            Ok(Outbound::Call(call)) => call,
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[test]
    fn test_detached_proxy_queues_calls() {
        let proxy = ClientProxy::new(CircuitId::new());
        assert!(!proxy.is_connected());

        proxy.invoke(call("a"));
        proxy.invoke(call("b"));
        assert_eq!(proxy.queued_calls(), 2);
    }

    #[test]
    fn test_attach_flushes_backlog_in_order() {
        let proxy = ClientProxy::new(CircuitId::new());
        proxy.invoke(call("first"));
        proxy.invoke(call("second"));

        let (tx, mut rx) = mpsc::unbounded_channel();
        proxy.attach(tx);
        assert!(proxy.is_connected());
        assert_eq!(proxy.queued_calls(), 0);

        assert_eq!(recv_call(&mut rx).method, "first");
        assert_eq!(recv_call(&mut rx).method, "second");

        proxy.invoke(call("live"));
        assert_eq!(recv_call(&mut rx).method, "live");
    }

    #[test]
    fn test_detach_queues_again() {
        let proxy = ClientProxy::new(CircuitId::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        proxy.attach(tx);

        proxy.invoke(call("online"));
        assert_eq!(recv_call(&mut rx).method, "online");

        proxy.detach();
        proxy.invoke(call("offline"));
        assert!(!proxy.is_connected());
        assert_eq!(proxy.queued_calls(), 1);
    }

    #[test]
    fn test_backlog_evicts_oldest_beyond_cap() {
        let proxy = ClientProxy::new(CircuitId::new());
        let big = "x".repeat(700 * 1024);

        proxy.invoke(OutboundCall::new(
            "old",
            vec![CallArg::Json(Value::from(big.clone()))],
        ));
        proxy.invoke(OutboundCall::new(
            "new",
            vec![CallArg::Json(Value::from(big))],
        ));
        assert_eq!(proxy.queued_calls(), 1);

        let (tx, mut rx) = mpsc::unbounded_channel();
        proxy.attach(tx);
        assert_eq!(recv_call(&mut rx).method, "new");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_detach_if_ignores_superseded_sender() {
        let proxy = ClientProxy::new(CircuitId::new());
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();

        proxy.attach(old_tx.clone());
        proxy.attach(new_tx.clone());

        // The replaced sender cannot break the live attachment.
        assert!(!proxy.detach_if(&old_tx));
        assert!(proxy.is_connected());
        proxy.invoke(call("still_live"));
        assert_eq!(recv_call(&mut new_rx).method, "still_live");

        assert!(proxy.detach_if(&new_tx));
        assert!(!proxy.is_connected());
    }

    #[test]
    fn test_dead_sender_falls_back_to_queueing() {
        let proxy = ClientProxy::new(CircuitId::new());
        let (tx, rx) = mpsc::unbounded_channel();
        proxy.attach(tx);
        drop(rx);

        proxy.invoke(call("stranded"));
        assert!(!proxy.is_connected());
        assert_eq!(proxy.queued_calls(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let proxy = ClientProxy::new(CircuitId::new());
        let clone = proxy.clone();

        proxy.invoke(call("queued"));
        assert_eq!(clone.queued_calls(), 1);
        assert_eq!(clone.circuit_id(), proxy.circuit_id());
    }
}
