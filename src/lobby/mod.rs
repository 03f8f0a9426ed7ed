//! The game loop: single owner of the scheduler, coordinator and metrics
//!
//! Socket tasks run on the multi-threaded runtime and talk to the loop only
//! through [`LobbyEvent`]s, so everything below this point is touched from
//! one task and needs no locking.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::game::Disconnect;
use crate::matchmaking::{CoordinatorSettings, MatchCoordinator, Wake, WakeRequest};
use crate::metrics::{MetricsAggregator, MetricsSink};
use crate::timing::{PollReport, Scheduler};
use crate::util::time::{Clock, SharedClock};
use crate::ws::{ChannelTransport, ConnectionId, Transport};

/// How often the loop polls the scheduler
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Socket lifecycle as reported by the transport
#[derive(Debug)]
pub enum LobbyEvent {
    Connected {
        conn: ConnectionId,
        outbound: mpsc::UnboundedSender<String>,
    },
    Message {
        conn: ConnectionId,
        text: String,
    },
    Disconnected {
        conn: ConnectionId,
        reason: Disconnect,
    },
}

/// Counters published for the health endpoint
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LobbyStatus {
    pub waiting: bool,
    pub active_matches: usize,
    pub matches_completed: u64,
    pub pending_wakes: usize,
}

pub type SharedStatus = Arc<RwLock<LobbyStatus>>;

/// Loop tuning that is not part of match rules
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub report_interval_ms: u64,
    pub poll_budget_ms: u64,
}

pub struct GameLoop<T: Transport> {
    clock: SharedClock,
    scheduler: Scheduler<Wake>,
    coordinator: MatchCoordinator,
    metrics: MetricsAggregator,
    transport: T,
    status: SharedStatus,
}

impl<T: Transport> GameLoop<T> {
    pub fn new(
        settings: CoordinatorSettings,
        loop_settings: &LoopSettings,
        clock: SharedClock,
        sink: Box<dyn MetricsSink>,
        transport: T,
    ) -> Self {
        let now = clock.now_ms();
        Self {
            scheduler: Scheduler::new(now, loop_settings.poll_budget_ms),
            coordinator: MatchCoordinator::new(settings),
            metrics: MetricsAggregator::new(loop_settings.report_interval_ms, clock.clone(), sink),
            transport,
            status: SharedStatus::default(),
            clock,
        }
    }

    pub fn status(&self) -> SharedStatus {
        self.status.clone()
    }

    pub fn coordinator(&self) -> &MatchCoordinator {
        &self.coordinator
    }

    pub fn scheduler(&self) -> &Scheduler<Wake> {
        &self.scheduler
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn connect(&mut self, conn: ConnectionId) {
        let now = self.clock.now_ms();
        let request = self
            .coordinator
            .connect(conn, now, &mut self.transport, &mut self.metrics);
        if let Some(WakeRequest { wake, at }) = request {
            self.scheduler.add(wake, at);
        }
        self.publish_status();
    }

    pub fn message(&mut self, conn: ConnectionId, text: &str) {
        self.coordinator.on_message(conn, text);
    }

    pub fn disconnect(&mut self, conn: ConnectionId, reason: Disconnect) {
        self.coordinator.on_close(conn, reason, &mut self.transport);
        self.publish_status();
    }

    /// Drain due scheduler work, then give the metrics a chance to flush
    pub fn poll(&mut self) -> PollReport {
        let Self {
            clock,
            scheduler,
            coordinator,
            metrics,
            transport,
            ..
        } = self;

        let clock: &dyn Clock = &**clock;
        let report = scheduler.poll(clock, |wake| {
            let started = clock.now_ms();
            let next = coordinator.run(*wake, started, transport, metrics);
            if let Wake::Tick(_) = wake {
                metrics.write("tickRuntime", clock.now_ms().saturating_sub(started));
            }
            next
        });

        if report.budget_exhausted {
            self.metrics.count("schedulerBudgetExceeded");
        }
        self.metrics.maybe_flush();
        if report.executed > 0 {
            self.publish_status();
        }
        report
    }

    /// Flush whatever metrics are pending
    pub fn shutdown(&mut self) {
        self.metrics.flush();
        info!(
            active_matches = self.coordinator.active_matches(),
            matches_completed = self.coordinator.matches_completed(),
            "Game loop stopped"
        );
    }

    fn publish_status(&self) {
        *self.status.write() = LobbyStatus {
            waiting: self.coordinator.waiting().is_some(),
            active_matches: self.coordinator.active_matches(),
            matches_completed: self.coordinator.matches_completed(),
            pending_wakes: self.scheduler.len(),
        };
    }
}

impl GameLoop<ChannelTransport> {
    pub fn handle(&mut self, event: LobbyEvent) {
        match event {
            LobbyEvent::Connected { conn, outbound } => {
                debug!(conn = %conn, "Connection opened");
                self.transport.register(conn, outbound);
                self.connect(conn);
            }
            LobbyEvent::Message { conn, text } => self.message(conn, &text),
            LobbyEvent::Disconnected { conn, reason } => {
                debug!(conn = %conn, ?reason, "Connection closed");
                self.disconnect(conn, reason);
            }
        }
    }

    /// Run until every event sender is gone or `shutdown` fires
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<LobbyEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        info!("Game loop started");

        let mut interval = tokio::time::interval(POLL_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                _ = interval.tick() => {
                    self.poll();
                }
                _ = &mut shutdown => break,
            }
        }

        self.shutdown();
    }
}
