use hashbrown::{DefaultHashBuilder, HashMap};

use indexmap::IndexMap;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{Receiver, Sender, channel};

use tracing::{debug, warn};

use crate::attribute::AttributeUpdate;

/// Number of updates a subscription buffers before it is dropped.
pub const SUBSCRIPTION_CAPACITY: usize = 32;

struct Subscription {
    attribute: String,
    sender: Sender<AttributeUpdate>,
}

// Updates are buffered in the channel until its receiver is taken.
// A subscription whose buffer is full is dropped.
#[derive(Default)]
pub(crate) struct Subscriptions {
    next_id: u64,
    active: IndexMap<String, Subscription, DefaultHashBuilder>,
    pending: HashMap<String, Receiver<AttributeUpdate>>,
}

impl Subscriptions {
    pub(crate) fn subscribe(&mut self, attribute: &str) -> String {
        let id = format!("subscription-{}", self.next_id);
        self.next_id += 1;

        let (sender, receiver) = channel(SUBSCRIPTION_CAPACITY);
        let _ = self.active.insert(
            id.clone(),
            Subscription {
                attribute: attribute.into(),
                sender,
            },
        );
        let _ = self.pending.insert(id.clone(), receiver);

        id
    }

    pub(crate) fn take_receiver(&mut self, id: &str) -> Option<Receiver<AttributeUpdate>> {
        self.pending.remove(id)
    }

    pub(crate) fn unsubscribe(&mut self, id: &str) -> bool {
        let _ = self.pending.remove(id);
        self.active.shift_remove(id).is_some()
    }

    pub(crate) fn notify(&mut self, update: &AttributeUpdate) {
        let pending = &mut self.pending;
        self.active.retain(|id, subscription| {
            if subscription.attribute != update.attribute() {
                return true;
            }
            match subscription.sender.try_send(update.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!("Dropping the `{id}` subscription, its buffer is full");
                    let _ = pending.remove(id);
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Dropping the `{id}` subscription, its receiver is closed");
                    false
                }
            }
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn clear(&mut self) {
        self.active.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use twingate::parameter::ParameterKind;

    use crate::attribute::{Attribute, AttributeUpdate};

    use super::{SUBSCRIPTION_CAPACITY, Subscriptions};

    fn update(attribute: &str, value: i64) -> AttributeUpdate {
        let attribute = Attribute::updatable(attribute, ParameterKind::I64).with_value(value);
        AttributeUpdate::new("/thermostat/temperature", &attribute)
    }

    #[test]
    fn notify_matching_subscriptions() {
        let mut subscriptions = Subscriptions::default();
        let value = subscriptions.subscribe("value");
        let other = subscriptions.subscribe("threshold");
        assert_ne!(value, other);

        let mut value_receiver = subscriptions.take_receiver(&value).unwrap();
        let mut other_receiver = subscriptions.take_receiver(&other).unwrap();
        assert!(subscriptions.take_receiver(&value).is_none());

        subscriptions.notify(&update("value", 21));

        assert_eq!(value_receiver.try_recv().unwrap().value(), &serde_json::json!(21));
        assert!(other_receiver.try_recv().is_err());
    }

    #[test]
    fn closed_receivers_are_dropped() {
        let mut subscriptions = Subscriptions::default();
        let id = subscriptions.subscribe("value");
        drop(subscriptions.take_receiver(&id));

        subscriptions.notify(&update("value", 1));
        assert_eq!(subscriptions.len(), 0);
    }

    #[test]
    fn full_subscriptions_are_dropped() {
        let mut subscriptions = Subscriptions::default();
        let unclaimed = subscriptions.subscribe("value");
        let claimed = subscriptions.subscribe("value");
        let mut receiver = subscriptions.take_receiver(&claimed).unwrap();

        for value in 0..SUBSCRIPTION_CAPACITY {
            subscriptions.notify(&update("value", value as i64));
            assert!(receiver.try_recv().is_ok());
        }
        assert_eq!(subscriptions.len(), 2);

        subscriptions.notify(&update("value", -1));
        assert_eq!(subscriptions.len(), 1);
        assert!(subscriptions.take_receiver(&unclaimed).is_none());
        assert_eq!(receiver.try_recv().unwrap().value(), &serde_json::json!(-1));
    }

    #[test]
    fn unsubscribe() {
        let mut subscriptions = Subscriptions::default();
        let id = subscriptions.subscribe("value");

        assert!(subscriptions.unsubscribe(&id));
        assert!(!subscriptions.unsubscribe(&id));
        assert!(subscriptions.take_receiver(&id).is_none());
    }
}
