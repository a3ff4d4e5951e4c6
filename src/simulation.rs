//! Supervisor for a population of simulated clients.
//!
//! Every engine runs as its own task. When one of them reports
//! [`Termination::GlobalStop`], the supervisor broadcasts a halt that stops
//! all the others at their next suspension point.

use crate::{
    client::{LeaseEngine, Termination},
    config::SimulationConfig,
    error::SwarmError,
    gate::CoordinationGate,
    transport::Transport,
};
use std::{fmt, sync::Arc};
use tokio::{
    sync::watch,
    task::{JoinError, JoinSet},
    time,
};
use tracing::Instrument as _;

/// How many engines ended for each reason.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub no_offer: usize,
    pub declined: usize,
    pub cooldown_observed: usize,
    pub lease_lost: usize,
    pub global_stop: usize,
    pub halted: usize,
    pub failed: usize,
}

impl Summary {
    fn record(&mut self, termination: Termination) {
        match termination {
            Termination::NoOffer => self.no_offer += 1,
            Termination::Declined => self.declined += 1,
            Termination::CooldownObserved => self.cooldown_observed += 1,
            Termination::LeaseLost => self.lease_lost += 1,
            Termination::GlobalStop => self.global_stop += 1,
            Termination::Halted => self.halted += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.no_offer
            + self.declined
            + self.cooldown_observed
            + self.lease_lost
            + self.global_stop
            + self.halted
            + self.failed
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} clients: {} no offer, {} declined, {} cooldown observed, {} lease lost, \
             {} global stop, {} halted, {} failed",
            self.total(),
            self.no_offer,
            self.declined,
            self.cooldown_observed,
            self.lease_lost,
            self.global_stop,
            self.halted,
            self.failed
        )
    }
}

pub struct Simulation {
    config: Arc<SimulationConfig>,
    gate: Arc<CoordinationGate>,
    halt: watch::Sender<bool>,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        let gate = Arc::new(CoordinationGate::from_config(&config));
        let (halt, _) = watch::channel(false);
        Self {
            config: Arc::new(config),
            gate,
            halt,
        }
    }

    /// Stops every running engine and any that have not started yet.
    pub fn halt(&self) {
        self.halt.send_replace(true);
    }

    pub fn is_halted(&self) -> bool {
        *self.halt.borrow()
    }

    /// Launches the configured number of engines and waits until all have stopped.
    ///
    /// `make_transport` is called once per client with the client's index.
    pub async fn run<T, F>(&self, mut make_transport: F) -> Result<Summary, SwarmError>
    where
        T: Transport + 'static,
        F: FnMut(usize) -> Result<T, SwarmError>,
    {
        let mut tasks = JoinSet::new();
        let mut summary = Summary::default();

        tracing::info!(
            "Starting {} clients against {} on {}",
            self.config.clients,
            self.config.server,
            self.config.interface
        );

        for index in 0..self.config.clients {
            if self.is_halted() {
                tracing::info!("Halted before launching client {}", index);
                break;
            }

            let transport = match make_transport(index) {
                Ok(transport) => transport,
                Err(e) => {
                    // If the first one fails, none of the others will work either.
                    if index == 0 {
                        return Err(e);
                    }
                    tracing::error!("Failed to open transport for client {}: {}", index, e);
                    summary.failed += 1;
                    continue;
                }
            };

            let engine = LeaseEngine::new(Arc::clone(&self.config), Arc::clone(&self.gate), transport);
            let span = tracing::info_span!(
                "client",
                index,
                xid = %format_args!("{:#010x}", engine.identity().xid)
            );
            let halt = self.halt.subscribe();
            tasks.spawn(
                async move {
                    tokio::select! {
                        result = engine.run() => result,
                        _ = halted(halt) => {
                            tracing::debug!("Client halted");
                            Ok(Termination::Halted)
                        }
                    }
                }
                .instrument(span),
            );

            while let Some(joined) = tasks.try_join_next() {
                self.settle(joined, &mut summary);
            }
            if !self.config.stagger.is_zero() && index + 1 < self.config.clients {
                self.pause_between_launches(&mut tasks, &mut summary).await;
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.settle(joined, &mut summary);
        }

        tracing::info!("Simulation finished: {}", summary);
        Ok(summary)
    }

    /// Waits out the stagger while settling engines that finish in the meantime.
    ///
    /// Returns early once the simulation is halted.
    async fn pause_between_launches(
        &self,
        tasks: &mut JoinSet<Result<Termination, SwarmError>>,
        summary: &mut Summary,
    ) {
        let pause = time::sleep(self.config.stagger);
        let halt = halted(self.halt.subscribe());
        tokio::pin!(pause, halt);

        loop {
            tokio::select! {
                _ = &mut pause => return,
                _ = &mut halt => return,
                Some(joined) = tasks.join_next() => self.settle(joined, summary),
            }
        }
    }

    fn settle(
        &self,
        joined: Result<Result<Termination, SwarmError>, JoinError>,
        summary: &mut Summary,
    ) {
        match joined {
            Ok(Ok(termination)) => {
                if termination == Termination::GlobalStop && !self.is_halted() {
                    tracing::warn!("Server unresponsive, halting all clients");
                    self.halt();
                }
                summary.record(termination);
            }
            Ok(Err(e)) => {
                tracing::error!("Client failed: {}", e);
                summary.failed += 1;
            }
            Err(e) => {
                tracing::error!("Client task panicked or was cancelled: {}", e);
                summary.failed += 1;
            }
        }
    }
}

async fn halted(mut halt: watch::Receiver<bool>) {
    loop {
        let is_halted = *halt.borrow_and_update();
        if is_halted {
            return;
        }
        if halt.changed().await.is_err() {
            // Supervisor gone without halting; never fire.
            std::future::pending::<()>().await;
        }
    }
}
