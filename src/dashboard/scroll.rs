use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use super::pager::Filters;

pub const DEFAULT_AUTO_FILL_LIMIT: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewportEvent {
    /// The end-of-list sentinel entered the viewport.
    SentinelVisible,
    /// A render finished; `scrollable` is false when the content does not
    /// overflow the viewport.
    Layout { scrollable: bool },
}

/// Source of viewport events. Implementations hand out independent
/// subscriptions that stop delivering once unsubscribed or dropped.
pub trait VisibilityObserver: Send + Sync {
    fn subscribe(&self) -> Subscription;
}

pub struct Subscription {
    id: u64,
    receiver: UnboundedReceiver<ViewportEvent>,
    hub: Weak<HubInner>,
    active: bool,
}

impl Subscription {
    pub async fn next(&mut self) -> Option<ViewportEvent> {
        if !self.active {
            return None;
        }
        self.receiver.recv().await
    }

    pub fn try_next(&mut self) -> Option<ViewportEvent> {
        if !self.active {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
        self.receiver.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, UnboundedSender<ViewportEvent>)>>,
}

impl HubInner {
    fn with_subscribers<R>(
        &self,
        f: impl FnOnce(&mut Vec<(u64, UnboundedSender<ViewportEvent>)>) -> R,
    ) -> R {
        let mut guard = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn remove(&self, id: u64) {
        self.with_subscribers(|subs| subs.retain(|(sid, _)| *sid != id));
    }
}

/// In-process observer fed by whatever drives the viewport (the terminal
/// browse loop, or tests).
#[derive(Clone, Default)]
pub struct SentinelHub {
    inner: Arc<HubInner>,
}

impl SentinelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers to every live subscriber and returns how many received it.
    pub fn notify(&self, event: ViewportEvent) -> usize {
        self.inner.with_subscribers(|subs| {
            subs.retain(|(_, tx)| !tx.is_closed());
            subs.iter().filter(|(_, tx)| tx.send(event).is_ok()).count()
        })
    }

    /// Drops every subscriber; their pending `next` calls resolve to `None`.
    pub fn close(&self) {
        self.inner.with_subscribers(|subs| subs.clear());
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.with_subscribers(|subs| subs.len())
    }
}

impl VisibilityObserver for SentinelHub {
    fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner.with_subscribers(|subs| subs.push((id, sender)));
        Subscription {
            id,
            receiver,
            hub: Arc::downgrade(&self.inner),
            active: true,
        }
    }
}

/// Identity of the fetch function a subscription was bound against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchKey {
    pub generation: u64,
    pub filters: Filters,
}

/// Holds at most one live subscription and replaces it whenever the bound
/// fetch key changes.
#[derive(Default)]
pub struct Binding {
    key: Option<FetchKey>,
    subscription: Option<Subscription>,
    resubscriptions: u64,
}

impl Binding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind<O: VisibilityObserver + ?Sized>(
        &mut self,
        observer: &O,
        key: FetchKey,
    ) -> &mut Subscription {
        let stale = self.key.as_ref() != Some(&key) || self.subscription.is_none();
        if stale {
            if let Some(mut previous) = self.subscription.take() {
                previous.unsubscribe();
                self.resubscriptions += 1;
                debug!(generation = key.generation, "rebinding viewport subscription");
            }
            self.key = Some(key);
        }
        self.subscription.get_or_insert_with(|| observer.subscribe())
    }

    pub fn release(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.key = None;
    }

    pub fn resubscriptions(&self) -> u64 {
        self.resubscriptions
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TriggerInput {
    pub has_more: bool,
    pub in_flight: bool,
    pub no_results: bool,
    pub errored: bool,
}

impl TriggerInput {
    fn can_fetch(self) -> bool {
        self.has_more && !self.in_flight && !self.no_results && !self.errored
    }
}

/// Decides whether a viewport event should request the next page.
#[derive(Clone, Debug)]
pub struct ScrollTrigger {
    auto_fill_limit: u32,
    auto_fills: u32,
}

impl Default for ScrollTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_AUTO_FILL_LIMIT)
    }
}

impl ScrollTrigger {
    pub fn new(auto_fill_limit: u32) -> Self {
        Self {
            auto_fill_limit,
            auto_fills: 0,
        }
    }

    pub fn auto_fills(&self) -> u32 {
        self.auto_fills
    }

    /// Starts a new filter session.
    pub fn reset(&mut self) {
        self.auto_fills = 0;
    }

    pub fn decide(&mut self, event: ViewportEvent, input: TriggerInput) -> bool {
        match event {
            ViewportEvent::SentinelVisible => input.can_fetch(),
            ViewportEvent::Layout { scrollable: true } => false,
            ViewportEvent::Layout { scrollable: false } => {
                if !input.can_fetch() || self.auto_fills >= self.auto_fill_limit {
                    return false;
                }
                self.auto_fills += 1;
                debug!(
                    attempt = self.auto_fills,
                    limit = self.auto_fill_limit,
                    "viewport not filled, requesting another page"
                );
                true
            }
        }
    }
}
