//! Pub/sub bookkeeping
//!
//! Push mode starts when the first confirmation of a SUBSCRIBE, PSUBSCRIBE
//! or MONITOR arrives, not when the command is queued. It ends when an
//! unsubscribe confirmation reports zero remaining subscriptions. MONITOR
//! never leaves push mode; only a disconnect ends it.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use bytes::Bytes;

use crate::protocol::{CommandRequest, ReplyValue};

use super::AsyncClient;

/// Receives every push while a subscription is active
pub(super) type SubscriptionCallback = Rc<RefCell<dyn FnMut(&AsyncClient, ReplyValue)>>;

/// Channel names and glob patterns are tracked separately by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Namespace {
    Channel,
    Pattern,
}

/// True for SUBSCRIBE, PSUBSCRIBE and MONITOR
pub(super) fn starts_push(command: &CommandRequest) -> bool {
    ["SUBSCRIBE", "PSUBSCRIBE", "MONITOR"]
        .iter()
        .any(|name| command.is(name))
}

/// Namespace an UNSUBSCRIBE or PUNSUBSCRIBE acts on
pub(super) fn unsubscribe_namespace(command: &CommandRequest) -> Option<Namespace> {
    if command.is("UNSUBSCRIBE") {
        Some(Namespace::Channel)
    } else if command.is("PUNSUBSCRIBE") {
        Some(Namespace::Pattern)
    } else {
        None
    }
}

/// A server push, recognised by the leading element of an array reply
#[derive(Debug)]
pub(super) enum Push {
    Subscribed {
        namespace: Namespace,
        name: Bytes,
    },
    /// `name` is null when there was nothing to unsubscribe from
    Unsubscribed {
        namespace: Namespace,
        name: Option<Bytes>,
        remaining: i64,
    },
    Message,
}

impl Push {
    pub(super) fn parse(reply: &ReplyValue) -> Option<Push> {
        let items = reply.as_array()?;
        let kind = items.first()?.as_bytes()?;
        let name = items
            .get(1)
            .and_then(ReplyValue::as_bytes)
            .map(Bytes::copy_from_slice);

        let namespace = |pattern: bool| {
            if pattern {
                Namespace::Pattern
            } else {
                Namespace::Channel
            }
        };

        if kind.eq_ignore_ascii_case(b"subscribe") || kind.eq_ignore_ascii_case(b"psubscribe") {
            Some(Push::Subscribed {
                namespace: namespace(kind[0].eq_ignore_ascii_case(&b'p')),
                name: name?,
            })
        } else if kind.eq_ignore_ascii_case(b"unsubscribe")
            || kind.eq_ignore_ascii_case(b"punsubscribe")
        {
            Some(Push::Unsubscribed {
                namespace: namespace(kind[0].eq_ignore_ascii_case(&b'p')),
                name,
                remaining: items.get(2)?.as_integer()?,
            })
        } else if kind.eq_ignore_ascii_case(b"message") || kind.eq_ignore_ascii_case(b"pmessage") {
            Some(Push::Message)
        } else {
            None
        }
    }
}

/// Active push mode
pub(super) struct Subscription {
    callback: SubscriptionCallback,
    monitor: bool,
    channels: HashSet<Bytes>,
    patterns: HashSet<Bytes>,
}

impl Subscription {
    pub(super) fn new(callback: SubscriptionCallback, monitor: bool) -> Self {
        Self {
            callback,
            monitor,
            channels: HashSet::new(),
            patterns: HashSet::new(),
        }
    }

    pub(super) fn callback(&self) -> SubscriptionCallback {
        Rc::clone(&self.callback)
    }

    /// Later subscribe calls take over delivery of every push
    pub(super) fn set_callback(&mut self, callback: SubscriptionCallback) {
        self.callback = callback;
    }

    pub(super) fn is_monitor(&self) -> bool {
        self.monitor
    }

    /// Nothing left subscribed in `namespace`
    pub(super) fn is_empty(&self, namespace: Namespace) -> bool {
        self.names(namespace).is_empty()
    }

    /// Apply a confirmation. Returns true once the server reports that
    /// nothing remains subscribed.
    pub(super) fn track(&mut self, push: &Push) -> bool {
        match push {
            Push::Subscribed { namespace, name } => {
                self.names_mut(*namespace).insert(name.clone());
                false
            }
            Push::Unsubscribed {
                namespace,
                name,
                remaining,
            } => {
                if let Some(name) = name {
                    self.names_mut(*namespace).remove(name);
                }
                *remaining <= 0
            }
            Push::Message => false,
        }
    }

    fn names(&self, namespace: Namespace) -> &HashSet<Bytes> {
        match namespace {
            Namespace::Channel => &self.channels,
            Namespace::Pattern => &self.patterns,
        }
    }

    fn names_mut(&mut self, namespace: Namespace) -> &mut HashSet<Bytes> {
        match namespace {
            Namespace::Channel => &mut self.channels,
            Namespace::Pattern => &mut self.patterns,
        }
    }
}
