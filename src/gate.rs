//! Cross-client back-off when the server stops answering.
//!
//! Only one client at a time may hold the floor and sit out the cooldown
//! window. Clients that find the floor taken give up instead of queueing.

use crate::config::SimulationConfig;
use std::time::Duration;
use tokio::{sync::Mutex, time};

/// What a client should do after an unanswered exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Persistence is off: the whole simulation must stop.
    Stop,
    /// Another client already holds the floor; this one terminates.
    CooldownObserved,
    /// This client held the floor for a full cooldown window and released it.
    ProceedAfterWait,
}

#[derive(Debug)]
pub struct CoordinationGate {
    persist: bool,
    acquire_timeout: Duration,
    cooldown: Duration,
    floor: Mutex<()>,
}

impl CoordinationGate {
    pub fn new(persist: bool, acquire_timeout: Duration, cooldown: Duration) -> Self {
        Self {
            persist,
            acquire_timeout,
            cooldown,
            floor: Mutex::new(()),
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.persist, config.response_timeout, config.cooldown())
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Never waits longer than the acquire timeout for the floor, and always
    /// releases it after the cooldown window.
    pub async fn try_enter_cooldown(&self) -> GateOutcome {
        if !self.persist {
            tracing::warn!("Server unresponsive and persistence is off, stopping simulation");
            return GateOutcome::Stop;
        }

        match time::timeout(self.acquire_timeout, self.floor.lock()).await {
            Ok(_guard) => {
                tracing::info!("========= LOCK Locked =========");
                time::sleep(self.cooldown).await;
                tracing::info!("========= LOCK Release =========");
                GateOutcome::ProceedAfterWait
            }
            Err(_) => {
                tracing::debug!("Cooldown already in progress, backing off");
                GateOutcome::CooldownObserved
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_non_persistent_stops_immediately() {
        let gate = CoordinationGate::new(false, Duration::from_millis(100), Duration::from_secs(10));
        let start = Instant::now();

        assert_eq!(gate.try_enter_cooldown().await, GateOutcome::Stop);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_holder_sleeps_full_cooldown() {
        let gate = CoordinationGate::new(true, Duration::from_millis(100), Duration::from_secs(10));
        let start = Instant::now();

        assert_eq!(gate.try_enter_cooldown().await, GateOutcome::ProceedAfterWait);
        assert_eq!(start.elapsed(), Duration::from_secs(10));

        // Released afterwards, so the next caller holds the floor again.
        assert_eq!(gate.try_enter_cooldown().await, GateOutcome::ProceedAfterWait);
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    #[test]
    fn test_from_config_derives_cooldown() {
        let config = SimulationConfig::new("eth0".to_string(), std::net::Ipv4Addr::new(10, 0, 0, 1))
            .with_response_timeout(Duration::from_millis(250));
        let gate = CoordinationGate::from_config(&config);
        assert_eq!(gate.cooldown(), Duration::from_secs(25));
    }
}
