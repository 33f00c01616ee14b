//! Subscription registry: dedup, replay set, deferred private intents.

use std::collections::HashSet;
use std::fmt;

use tokio::sync::oneshot;

use hermes_core::{Channel, Symbol};

use crate::error::ConnectError;

/// One logical stream: a channel, optionally scoped to a symbol.
/// Private channels (balance, orders) are account-wide and carry no
/// symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub channel: Channel,
    pub symbol: Option<Symbol>,
}

impl SubscriptionKey {
    pub fn order_book(symbol: impl Into<Symbol>) -> Self {
        SubscriptionKey {
            channel: Channel::OrderBook,
            symbol: Some(symbol.into()),
        }
    }

    pub fn ticker(symbol: impl Into<Symbol>) -> Self {
        SubscriptionKey {
            channel: Channel::Ticker,
            symbol: Some(symbol.into()),
        }
    }

    pub fn trades(symbol: impl Into<Symbol>) -> Self {
        SubscriptionKey {
            channel: Channel::Trades,
            symbol: Some(symbol.into()),
        }
    }

    pub fn balance() -> Self {
        SubscriptionKey {
            channel: Channel::Balance,
            symbol: None,
        }
    }

    pub fn orders() -> Self {
        SubscriptionKey {
            channel: Channel::Orders,
            symbol: None,
        }
    }

    pub fn is_private(&self) -> bool {
        self.channel.is_private()
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            Some(symbol) => write!(f, "{}:{}", self.channel.as_str(), symbol),
            None => write!(f, "{}", self.channel.as_str()),
        }
    }
}

/// Completion signal for a subscribe call
pub type SubscribeAck = oneshot::Sender<Result<(), ConnectError>>;

/// Outcome of registering interest in a key
pub enum Begin {
    /// Interest already registered, nothing to send
    AlreadyActive,
    /// Private key parked until authentication completes
    Deferred,
    /// New interest, caller should emit the subscribe frame
    Activate { key: SubscriptionKey },
}

/// Tracks which streams the session owes the venue.
///
/// `active` is the replay set: after any reconnect every key in it is
/// re-requested exactly once. Private keys arriving before the auth
/// handshake finishes park in `deferred` together with their acks.
#[derive(Default)]
pub struct SubscriptionManager {
    active: HashSet<SubscriptionKey>,
    deferred: Vec<(SubscriptionKey, SubscribeAck)>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in a key. `authenticated` decides whether a
    /// private key activates now or parks until the auth ack.
    pub fn begin(
        &mut self,
        key: SubscriptionKey,
        ack: SubscribeAck,
        authenticated: bool,
    ) -> Begin {
        if self.active.contains(&key) {
            let _ = ack.send(Ok(()));
            return Begin::AlreadyActive;
        }
        if key.is_private() && !authenticated {
            self.deferred.push((key, ack));
            return Begin::Deferred;
        }
        self.active.insert(key.clone());
        let _ = ack.send(Ok(()));
        Begin::Activate { key }
    }

    /// Promote all deferred private keys to active, returning the keys
    /// whose subscribe frames must now be sent
    pub fn complete_deferred(&mut self) -> Vec<SubscriptionKey> {
        let mut activated = Vec::new();
        for (key, ack) in self.deferred.drain(..) {
            let _ = ack.send(Ok(()));
            if self.active.insert(key.clone()) {
                activated.push(key);
            }
        }
        activated
    }

    /// Fail every deferred private intent with the given error
    pub fn fail_deferred(&mut self, err: impl Fn() -> ConnectError) {
        for (_, ack) in self.deferred.drain(..) {
            let _ = ack.send(Err(err()));
        }
    }

    /// Drop interest in a key. Returns true if it was active.
    pub fn remove(&mut self, key: &SubscriptionKey) -> bool {
        self.active.remove(key)
    }

    pub fn is_active(&self, key: &SubscriptionKey) -> bool {
        self.active.contains(key)
    }

    /// The replay set, public keys first so market data resumes before
    /// the auth handshake completes
    pub fn replay_keys(&self) -> (Vec<SubscriptionKey>, Vec<SubscriptionKey>) {
        let mut public = Vec::new();
        let mut private = Vec::new();
        for key in &self.active {
            if key.is_private() {
                private.push(key.clone());
            } else {
                public.push(key.clone());
            }
        }
        (public, private)
    }

    /// Any active or deferred private interest
    pub fn has_private_interest(&self) -> bool {
        !self.deferred.is_empty() || self.active.iter().any(|k| k.is_private())
    }

    pub fn has_interest(&self) -> bool {
        !self.active.is_empty() || !self.deferred.is_empty()
    }

    /// Distinct symbols with any active market-data interest
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut out: Vec<Symbol> = self
            .active
            .iter()
            .filter_map(|k| k.symbol.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }
}
