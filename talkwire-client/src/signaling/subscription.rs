use crate::signaling::router::{ListenerKey, RouterInner};
use std::sync::Weak;
use tracing::debug;

#[derive(Debug, Clone)]
pub(crate) enum SubscriptionTarget {
    Negotiation(ListenerKey),
    Roster,
}

/// Registration handle returned by the router.
///
/// The listener stays registered until the handle is dropped or
/// [`Subscription::unsubscribe`] is called. A handle only ever removes its
/// own registration, never a newer one for the same key.
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    router: Weak<RouterInner>,
    target: SubscriptionTarget,
    id: u64,
}

impl Subscription {
    pub(crate) fn new(router: Weak<RouterInner>, target: SubscriptionTarget, id: u64) -> Self {
        Self { router, target, id }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Whether the registration is still in place.
    pub fn is_active(&self) -> bool {
        let Some(router) = self.router.upgrade() else {
            return false;
        };
        match &self.target {
            SubscriptionTarget::Negotiation(key) => router
                .negotiation
                .get(key)
                .is_some_and(|reg| reg.id == self.id),
            SubscriptionTarget::Roster => router.roster.contains_key(&self.id),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(router) = self.router.upgrade() else {
            return;
        };
        match &self.target {
            SubscriptionTarget::Negotiation(key) => {
                if router
                    .negotiation
                    .remove_if(key, |_, reg| reg.id == self.id)
                    .is_some()
                {
                    debug!("Listener for {:?} unsubscribed", key);
                }
            }
            SubscriptionTarget::Roster => {
                router.roster.remove(&self.id);
            }
        }
    }
}
