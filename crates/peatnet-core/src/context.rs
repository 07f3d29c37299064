//! Shared handles every engine component works with.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::dice::Dice;
use crate::events::EventBus;
use crate::store::{NewUser, TxScope};

/// Store, clock, dice, event bus and configuration, cheaply cloneable.
pub struct Context<S> {
    /// Entity store.
    pub store: Arc<S>,
    /// Wall clock.
    pub clock: Arc<dyn Clock>,
    /// Random source.
    pub dice: Arc<dyn Dice>,
    /// Outbound notifications.
    pub events: EventBus,
    /// Engine configuration.
    pub config: Arc<EngineConfig>,
}

impl<S> Context<S> {
    /// Bundle the handles.
    pub const fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        dice: Arc<dyn Dice>,
        events: EventBus,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            clock,
            dice,
            events,
            config,
        }
    }

    /// Current wall-clock time.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// An empty transaction scope whose new users start with the configured
    /// balances and are stamped `now`.
    pub fn scope(&self, now: DateTime<Utc>) -> TxScope {
        let economy = &self.config.economy;
        TxScope::new(NewUser {
            primary: economy.starting_primary,
            premium: economy.starting_premium,
            health: economy.starting_health,
            at: now,
        })
    }
}

impl<S> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            dice: Arc::clone(&self.dice),
            events: self.events.clone(),
            config: Arc::clone(&self.config),
        }
    }
}
