//! Sweep timers
//!
//! Owns one tokio task per sweep. The status and no-show sweeps tick on fixed
//! intervals; the reminder sweep sleeps until the configured local hour. Tasks
//! are aborted when the runner is stopped or dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::database::Store;
use crate::scheduler::sweeps::{run_sweep, Sweep, SweepReport};
use crate::services::notification::Dispatcher;
use crate::utils::clock::Clock;
use crate::utils::errors::Result;
use crate::utils::helpers::next_local_hour;

pub struct SchedulerRunner {
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerRunner {
    pub fn new(store: Arc<dyn Store>, dispatcher: Dispatcher, clock: Arc<dyn Clock>, config: SchedulerConfig) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            config,
            handles: Vec::new(),
        }
    }

    /// Run one sweep now, outside the timers
    pub async fn run_once(&self, sweep: Sweep) -> Result<SweepReport> {
        run_sweep(sweep, self.store.as_ref(), &self.dispatcher, self.clock.now(), &self.config).await
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Start the sweep timers
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("Scheduler is already running");
            return;
        }

        self.handles.push(self.spawn_interval(Sweep::Status, self.config.status_interval()));
        self.handles.push(self.spawn_interval(Sweep::NoShow, self.config.no_show_interval()));
        self.handles.push(self.spawn_daily_reminders());

        info!(
            status_interval = ?self.config.status_interval(),
            no_show_interval = ?self.config.no_show_interval(),
            reminder_hour = self.config.reminder_hour,
            "Started scheduler"
        );
    }

    /// Stop all sweep timers
    pub fn stop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        info!("Stopped scheduler");
    }

    fn spawn_interval(&self, sweep: Sweep, period: Duration) -> JoinHandle<()> {
        let store = self.store.clone();
        let dispatcher = self.dispatcher.clone();
        let clock = self.clock.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                execute(sweep, store.as_ref(), &dispatcher, clock.as_ref(), &config).await;
            }
        })
    }

    fn spawn_daily_reminders(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let dispatcher = self.dispatcher.clone();
        let clock = self.clock.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            loop {
                let now = clock.now();
                let next_run = next_local_hour(now, config.local_offset(), config.reminder_hour);
                let wait = (next_run - now).to_std().unwrap_or(Duration::ZERO);
                info!(next_run = %next_run, "Next reminder sweep scheduled");

                tokio::time::sleep(wait).await;
                execute(Sweep::Reminder, store.as_ref(), &dispatcher, clock.as_ref(), &config).await;
            }
        })
    }
}

async fn execute(sweep: Sweep, store: &dyn Store, dispatcher: &Dispatcher, clock: &dyn Clock, config: &SchedulerConfig) {
    if let Err(e) = run_sweep(sweep, store, dispatcher, clock.now(), config).await {
        error!(sweep = sweep.name(), error = %e, "Sweep failed");
    }
}

impl Drop for SchedulerRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
