//! The subscription table: a fixed-size array of
//! `TopicBinding` slots, examined on every inbound PUBLISH and installed or
//! cleared as SUBACK/UNSUBACK resolve in-flight requests.

use std::fmt;
use std::sync::Arc;

use mqtt_core::topic::Filter;
use mqtt_core::QoS;

use crate::event::Message;

/// A callback invoked for messages matching a [`TopicBinding`]'s filter.
pub type Callback = Arc<dyn Fn(&Message) + Send + Sync>;

/// One subscription-table entry: a topic filter, its callback, and an opaque
/// context token standing in for the original's context pointer. Binding
/// identity is `(filter, context, callback)`, not equality
/// of any payload the callback closes over.
#[derive(Clone)]
pub struct TopicBinding {
    filter: Filter,
    qos: QoS,
    context: u64,
    callback: Callback,
}

impl fmt::Debug for TopicBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicBinding")
            .field("filter", &self.filter.as_str())
            .field("qos", &self.qos)
            .field("context", &self.context)
            .finish()
    }
}

impl TopicBinding {
    /// Builds a binding. `context` is a caller-chosen token distinguishing
    /// otherwise-identical bindings, mirroring the original's opaque context
    /// pointer; pass `0` when the caller has nothing to distinguish by.
    pub fn new(filter: Filter, qos: QoS, context: u64, callback: Callback) -> Self {
        TopicBinding {
            filter,
            qos,
            context,
            callback,
        }
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn qos(&self) -> QoS {
        self.qos
    }

    /// Invokes this binding's callback. Called with no table lock held.
    pub(crate) fn invoke(&self, message: &Message) {
        (self.callback)(message)
    }

    /// Identity comparison: same filter bytes, same
    /// context, same callback (`Arc` pointer equality, since closures have
    /// no structural equality).
    fn same_binding(&self, other: &TopicBinding) -> bool {
        self.filter.as_str() == other.filter.as_str()
            && self.context == other.context
            && Arc::ptr_eq(&self.callback, &other.callback)
    }
}

/// Outcome of [`SubscriptionTable::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    DuplicateIgnored,
    Full,
}

/// Fixed-capacity subscription table. A slot is occupied iff it holds a
/// binding; capacity is `SUB_NUM_MAX`.
pub struct SubscriptionTable {
    slots: Vec<Option<TopicBinding>>,
}

impl SubscriptionTable {
    pub fn new(capacity: usize) -> Self {
        SubscriptionTable {
            slots: vec![None; capacity],
        }
    }

    /// Linear scan for an identical binding; installs into the first empty
    /// slot found during the same scan if none matched.
    pub fn install(&mut self, binding: TopicBinding) -> InstallOutcome {
        let mut empty_slot = None;

        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                Some(existing) if existing.same_binding(&binding) => {
                    return InstallOutcome::DuplicateIgnored
                }
                None if empty_slot.is_none() => empty_slot = Some(i),
                _ => {}
            }
        }

        match empty_slot {
            Some(i) => {
                self.slots[i] = Some(binding);
                InstallOutcome::Installed
            }
            None => InstallOutcome::Full,
        }
    }

    /// Clears every slot whose binding is identical to `binding`. More than
    /// one slot may match: different contexts may share a filter.
    pub fn remove_matching(&mut self, binding: &TopicBinding) {
        for slot in &mut self.slots {
            if slot.as_ref().map_or(false, |b| b.same_binding(binding)) {
                *slot = None;
            }
        }
    }

    /// Returns every occupied binding whose filter matches `topic`, without
    /// invoking anything. Callers hold this table's lock only for the
    /// duration of this call, then invoke the returned bindings with the
    /// lock released.
    pub fn matching(&self, topic: &str) -> Vec<TopicBinding> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref())
            .filter(|binding| binding.filter().matches(topic))
            .cloned()
            .collect()
    }

    /// Convenience wrapper combining `matching` with invocation, for callers
    /// (tests, single-threaded use) that are not holding this table behind a
    /// separate lock. Production dispatch in `client.rs` uses `matching`
    /// directly so the table's mutex is released before any callback runs.
    pub fn match_and_invoke(
        &self,
        topic: &str,
        message: &Message,
        default_handler: Option<&dyn Fn(&Message)>,
    ) {
        let matched = self.matching(topic);

        if matched.is_empty() {
            if let Some(handler) = default_handler {
                handler(message);
            }
        } else {
            for binding in &matched {
                binding.invoke(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqtt_core::topic::validate_topic_filter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn binding(filter: &str, context: u64) -> TopicBinding {
        TopicBinding::new(
            validate_topic_filter(filter).unwrap(),
            QoS::AtMostOnce,
            context,
            Arc::new(|_: &Message| {}),
        )
    }

    #[test]
    fn install_ignores_exact_duplicates() {
        let mut table = SubscriptionTable::new(4);
        let cb: Callback = Arc::new(|_: &Message| {});
        let b1 = TopicBinding::new(validate_topic_filter("/a/b").unwrap(), QoS::AtMostOnce, 0, cb.clone());
        let b2 = TopicBinding::new(validate_topic_filter("/a/b").unwrap(), QoS::AtMostOnce, 0, cb);

        assert_eq!(table.install(b1), InstallOutcome::Installed);
        assert_eq!(table.install(b2), InstallOutcome::DuplicateIgnored);
    }

    #[test]
    fn install_allows_same_filter_with_different_context() {
        let mut table = SubscriptionTable::new(4);
        assert_eq!(table.install(binding("/a/b", 1)), InstallOutcome::Installed);
        assert_eq!(table.install(binding("/a/b", 2)), InstallOutcome::Installed);
    }

    #[test]
    fn install_reports_full_once_capacity_is_exhausted() {
        let mut table = SubscriptionTable::new(1);
        assert_eq!(table.install(binding("/a", 1)), InstallOutcome::Installed);
        assert_eq!(table.install(binding("/b", 2)), InstallOutcome::Full);
    }

    #[test]
    fn remove_matching_clears_every_identical_slot() {
        let mut table = SubscriptionTable::new(4);
        let cb: Callback = Arc::new(|_: &Message| {});
        let a = TopicBinding::new(validate_topic_filter("/a").unwrap(), QoS::AtMostOnce, 0, cb.clone());
        let b = TopicBinding::new(validate_topic_filter("/a").unwrap(), QoS::AtMostOnce, 0, cb);

        table.install(a.clone());
        assert_eq!(table.matching("/a").len(), 1);

        table.remove_matching(&b);
        assert!(table.matching("/a").is_empty());
    }

    #[test]
    fn match_and_invoke_falls_back_to_default_handler_when_unmatched() {
        let table = SubscriptionTable::new(4);
        let invocations = Arc::new(AtomicUsize::new(0));
        let invocations2 = invocations.clone();
        let default: &dyn Fn(&Message) = &move |_| {
            invocations2.fetch_add(1, Ordering::SeqCst);
        };

        table.match_and_invoke(
            "/nowhere",
            &Message {
                topic: "/nowhere".into(),
                payload: vec![],
            },
            Some(default),
        );

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn match_and_invoke_dispatches_to_every_matching_wildcard_binding() {
        let mut table = SubscriptionTable::new(4);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let cb: Callback = Arc::new(move |_: &Message| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        table.install(TopicBinding::new(
            validate_topic_filter("/sensors/+/temp").unwrap(),
            QoS::AtMostOnce,
            0,
            cb.clone(),
        ));
        table.install(TopicBinding::new(
            validate_topic_filter("/sensors/#").unwrap(),
            QoS::AtMostOnce,
            1,
            cb,
        ));

        table.match_and_invoke(
            "/sensors/17/temp",
            &Message {
                topic: "/sensors/17/temp".into(),
                payload: vec![1],
            },
            None,
        );

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
