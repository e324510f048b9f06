//! In-process message bus
//!
//! Routes requests to agents by message type, correlates responses by
//! request id, and fans events out to subscribers. The bus never fails a
//! caller with a Rust error: every failure becomes a `Response` with
//! `success = false`, or a dropped event.
//!
//! Shared mutable state is limited to the pending-correlation table and the
//! subscription table. Per-agent concurrency lives in each `AgentRuntime`.

use crate::agent::registry::AgentRegistry;
use crate::agent::runtime::{A2AAgent, AgentRuntime, RequestContext};
use crate::config::{AgentOverrides, BusSection};
use crate::error::AgentError;
use crate::observability::{BusMetrics, MetricsSnapshot};
use crate::progress::BusStatusReporter;
use crate::protocol::message_types::WILDCARD_EVENT_TYPE;
use crate::protocol::{Event, Request, Response, BUS_SENDER_ID};
use crate::request_span;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Handle returned by `subscribe`; pass it to `unsubscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

enum SubscriptionTarget {
    /// Delivered through the agent's `handle_event`
    Agent(String),
    /// Delivered into a bounded channel owned by an external observer
    Channel(mpsc::Sender<Event>),
}

struct Subscription {
    event_types: HashSet<String>,
    target: SubscriptionTarget,
}

impl Subscription {
    fn matches(&self, event: &Event) -> bool {
        if let SubscriptionTarget::Agent(agent_id) = &self.target {
            if agent_id == &event.sender_id {
                return false;
            }
        }
        self.event_types.contains(&event.event_type)
            || (event.broadcast && self.event_types.contains(WILDCARD_EVENT_TYPE))
    }
}

/// A caller waiting on one routed request
///
/// The ticket is unique per routing attempt, so a reply from an earlier
/// attempt that reused the same request id cannot resolve a later one.
struct Waiter {
    ticket: u64,
    sender: oneshot::Sender<Response>,
}

struct BusInner {
    registry: AgentRegistry,
    pending: Mutex<HashMap<String, Waiter>>,
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    next_subscription: AtomicU64,
    next_ticket: AtomicU64,
    metrics: Arc<BusMetrics>,
    config: BusSection,
}

impl BusInner {
    fn pending(&self) -> MutexGuard<'_, HashMap<String, Waiter>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the waiter for `request_id` only if it belongs to `ticket`
    fn take_waiter(&self, request_id: &str, ticket: u64) -> Option<Waiter> {
        let mut pending = self.pending();
        match pending.get(request_id) {
            Some(waiter) if waiter.ticket == ticket => pending.remove(request_id),
            _ => None,
        }
    }
}

/// Removes a pending entry if the waiting caller goes away early
struct PendingEntry<'a> {
    inner: &'a BusInner,
    request_id: String,
    ticket: u64,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.inner.take_waiter(&self.request_id, self.ticket);
    }
}

/// Cloneable handle to one bus instance
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

/// Non-owning handle for agents that publish back into the bus
#[derive(Clone, Default)]
pub struct WeakMessageBus {
    inner: Weak<BusInner>,
}

impl WeakMessageBus {
    pub fn upgrade(&self) -> Option<MessageBus> {
        self.inner.upgrade().map(|inner| MessageBus { inner })
    }
}

impl fmt::Debug for WeakMessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakMessageBus")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("agents", &self.inner.registry.agent_count())
            .field("pending", &self.pending_count())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(BusSection::default())
    }
}

impl MessageBus {
    pub fn new(config: BusSection) -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: AgentRegistry::new(),
                pending: Mutex::new(HashMap::new()),
                subscriptions: RwLock::new(HashMap::new()),
                next_subscription: AtomicU64::new(1),
                next_ticket: AtomicU64::new(1),
                metrics: Arc::new(BusMetrics::new()),
                config,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakMessageBus {
        WeakMessageBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &BusSection {
        &self.inner.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Requests currently waiting for a response
    pub fn pending_count(&self) -> usize {
        self.inner.pending().len()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Register an agent with its declared capabilities
    pub fn register_agent(&self, agent: Arc<dyn A2AAgent>) -> Arc<AgentRuntime> {
        self.register_agent_with(agent, &AgentOverrides::default())
    }

    /// Register an agent, applying configured overrides
    ///
    /// Replaces any agent registered under the same id, including its event
    /// subscriptions.
    pub fn register_agent_with(
        &self,
        agent: Arc<dyn A2AAgent>,
        overrides: &AgentOverrides,
    ) -> Arc<AgentRuntime> {
        let runtime = Arc::new(AgentRuntime::new(
            agent,
            overrides,
            Arc::new(BusStatusReporter::new(self.downgrade())),
            Arc::clone(&self.inner.metrics),
        ));
        let agent_id = runtime.agent_id().to_string();

        if self.inner.registry.register(Arc::clone(&runtime)).is_some() {
            self.remove_agent_subscriptions(&agent_id);
        }

        let event_types = runtime.descriptor().subscribed_event_types.clone();
        if !event_types.is_empty() {
            self.subscribe(&agent_id, event_types);
        }

        runtime
    }

    /// Remove an agent and its subscriptions; false if it was not registered
    pub fn unregister_agent(&self, agent_id: &str) -> bool {
        let removed = self.inner.registry.unregister(agent_id);
        self.remove_agent_subscriptions(agent_id);
        removed
    }

    /// Subscribe a registered agent to event types
    ///
    /// `"*"` matches every broadcast event.
    pub fn subscribe<I, S>(&self, agent_id: &str, event_types: I) -> SubscriptionId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_subscription(
            event_types,
            SubscriptionTarget::Agent(agent_id.to_string()),
        )
    }

    /// Subscribe an external observer; events arrive on the returned channel
    ///
    /// Delivery uses `try_send`, so a full channel drops events rather than
    /// slowing the publisher.
    pub fn subscribe_channel<I, S>(&self, event_types: I) -> (SubscriptionId, mpsc::Receiver<Event>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (sender, receiver) = mpsc::channel(self.inner.config.subscriber_buffer.max(1));
        let id = self.add_subscription(event_types, SubscriptionTarget::Channel(sender));
        (id, receiver)
    }

    fn add_subscription<I, S>(&self, event_types: I, target: SubscriptionTarget) -> SubscriptionId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        let event_types: HashSet<String> = event_types.into_iter().map(Into::into).collect();
        debug!("Adding subscription {} for {:?}", id, event_types);

        self.inner
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Subscription {
                    event_types,
                    target,
                },
            );
        id
    }

    /// Remove a subscription; returns false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self
            .inner
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            debug!("Removed subscription {}", id);
        }
        removed
    }

    fn remove_agent_subscriptions(&self, agent_id: &str) {
        self.inner
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, sub| {
                !matches!(&sub.target, SubscriptionTarget::Agent(id) if id == agent_id)
            });
    }

    /// Fan an event out to matching subscribers without waiting
    ///
    /// Agent subscribers each run on their own task; a failing subscriber is
    /// logged and counted and never affects the publisher or other
    /// subscribers.
    pub fn publish(&self, event: Event) {
        self.inner.metrics.event_published();
        debug!(
            "Publishing {} from {} (broadcast: {})",
            event.event_type, event.sender_id, event.broadcast
        );

        let mut agent_targets = Vec::new();
        let mut closed = Vec::new();
        {
            let subscriptions = self
                .inner
                .subscriptions
                .read()
                .unwrap_or_else(PoisonError::into_inner);

            for (id, subscription) in subscriptions.iter() {
                if !subscription.matches(&event) {
                    continue;
                }
                match &subscription.target {
                    SubscriptionTarget::Agent(agent_id) => agent_targets.push(agent_id.clone()),
                    SubscriptionTarget::Channel(sender) => match sender.try_send(event.clone()) {
                        Ok(()) => self.inner.metrics.event_delivered(),
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!("Subscriber {} is full, dropping {}", id, event.event_type);
                            self.inner.metrics.event_delivery_failed();
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
                    },
                }
            }
        }

        for id in closed {
            debug!("Subscriber {} went away", id);
            self.unsubscribe(id);
        }

        if agent_targets.is_empty() {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    "No async runtime, {} agent deliveries of {} skipped",
                    agent_targets.len(),
                    event.event_type
                );
                return;
            }
        };

        for agent_id in agent_targets {
            let Some(runtime) = self.inner.registry.get_agent(&agent_id) else {
                continue;
            };
            let event = event.clone();
            let metrics = Arc::clone(&self.inner.metrics);
            handle.spawn(async move {
                match runtime.deliver_event(&event).await {
                    Ok(()) => metrics.event_delivered(),
                    Err(e) => {
                        warn!(
                            "Agent {} failed to handle {}: {}",
                            agent_id, event.event_type, e
                        );
                        metrics.event_delivery_failed();
                    }
                }
            });
        }
    }

    /// Route a request to the first eligible agent and wait for its response
    ///
    /// A `timeout_ms` of zero uses the bus default. On timeout the pending
    /// entry is removed, the handler's cancellation token is cancelled, and a
    /// synthetic `timeout` failure is returned; a response arriving later is
    /// dropped.
    pub async fn request_response(&self, request: Request) -> Response {
        let timeout_ms = if request.timeout_ms == 0 {
            self.inner.config.default_timeout_ms
        } else {
            request.timeout_ms
        };
        let span = request_span!(
            request_id = %request.id,
            message_type = %request.message_type,
            timeout_ms
        );
        self.route(request, timeout_ms).instrument(span).await
    }

    async fn route(&self, request: Request, timeout_ms: u64) -> Response {
        let request_id = request.id.clone();

        let Some(runtime) = self
            .inner
            .registry
            .find_agents_for_message_type(&request.message_type)
            .into_iter()
            .next()
        else {
            warn!("No agent available for {}", request.message_type);
            self.inner.metrics.request_unavailable();
            return AgentError::agent_unavailable(&request.message_type)
                .to_response(BUS_SENDER_ID, &request_id);
        };

        let (sender, mut receiver) = oneshot::channel();
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        {
            let mut pending = self.inner.pending();
            if pending.contains_key(&request_id) {
                warn!("Duplicate in-flight request id {}", request_id);
                return AgentError::validation_error(format!(
                    "request id '{request_id}' is already in flight"
                ))
                .to_response(BUS_SENDER_ID, &request_id);
            }
            pending.insert(request_id.clone(), Waiter { ticket, sender });
        }
        let _entry = PendingEntry {
            inner: &self.inner,
            request_id: request_id.clone(),
            ticket,
        };

        self.inner.metrics.request_routed();
        debug!("Routing {} to {}", request_id, runtime.agent_id());

        let token = CancellationToken::new();
        let ctx = RequestContext::new(token.clone());
        let bus = self.downgrade();
        tokio::spawn(
            async move {
                let response = runtime.dispatch(request, ctx).await;
                match bus.upgrade() {
                    Some(bus) => {
                        bus.resolve(ticket, response);
                    }
                    None => debug!("Bus dropped before response could be delivered"),
                }
            }
            .in_current_span(),
        );

        match tokio::time::timeout(Duration::from_millis(timeout_ms), &mut receiver).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => AgentError::internal_error("response channel closed")
                .to_response(BUS_SENDER_ID, &request_id),
            Err(_) => {
                let still_pending = self.inner.take_waiter(&request_id, ticket).is_some();
                if !still_pending {
                    // Resolved between the deadline and the removal
                    if let Ok(response) = receiver.try_recv() {
                        return response;
                    }
                }
                token.cancel();
                self.inner.metrics.request_timed_out();
                warn!("Request {} timed out after {}ms", request_id, timeout_ms);
                AgentError::timeout(&request_id, timeout_ms).to_response(BUS_SENDER_ID, &request_id)
            }
        }
    }

    /// Resolve the pending wait for `response.request_id`
    ///
    /// Returns false when nobody is waiting any more (late or duplicate
    /// response); the response is dropped.
    pub fn deliver_response(&self, response: Response) -> bool {
        let waiter = self.inner.pending().remove(&response.request_id);
        self.complete(waiter, response)
    }

    /// Resolve the wait of the routing attempt identified by `ticket`
    ///
    /// A reply from an attempt that already timed out is dropped even when a
    /// newer request reuses its id.
    fn resolve(&self, ticket: u64, response: Response) -> bool {
        let waiter = self.inner.take_waiter(&response.request_id, ticket);
        self.complete(waiter, response)
    }

    fn complete(&self, waiter: Option<Waiter>, response: Response) -> bool {
        match waiter {
            Some(Waiter { sender, .. }) => {
                let request_id = response.request_id.clone();
                if sender.send(response).is_ok() {
                    self.inner.metrics.response_resolved();
                    true
                } else {
                    debug!("Caller for {} stopped waiting", request_id);
                    self.inner.metrics.late_response_dropped();
                    false
                }
            }
            None => {
                debug!(
                    "Dropping response for {}: no pending request",
                    response.request_id
                );
                self.inner.metrics.late_response_dropped();
                false
            }
        }
    }

    /// Log a one-line summary of registered agents
    pub fn log_summary(&self) {
        info!(
            "Bus ready: {} agents, {} subscriptions",
            self.inner.registry.agent_count(),
            self.subscription_count()
        );
    }
}
