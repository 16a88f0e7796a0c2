//! Automatic tick driver.
//!
//! Fires every `period` and advances the world by the *measured* elapsed
//! time since the previous fire, so scheduling drift is absorbed into the
//! delta instead of slowing the simulation down.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::info;

use crate::app::Application;

pub fn spawn(app: Arc<Application>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(period_ms = period.as_millis() as u64, "automatic ticker started");
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; it only arms the timer.
        timer.tick().await;
        let mut last_tick = Instant::now();
        loop {
            timer.tick().await;
            let now = Instant::now();
            let delta_ms = now.duration_since(last_tick).as_secs_f64() * 1000.0;
            last_tick = now;
            app.tick(delta_ms);
        }
    })
}
