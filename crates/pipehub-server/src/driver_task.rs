//! Periodic maintenance task: the state machine tick plus retention and
//! stale-subscription housekeeping.

use std::time::Duration;

use chrono::Utc;
use pipehub_core::{EventLog, StateDriver};

use crate::api_handlers::HubState;

/// One pass of everything the timer owns. Failures are logged and retried
/// on the next pass; nothing here aborts the loop.
pub fn run_maintenance_pass(state: &HubState) {
    let now = Utc::now();

    let driver = StateDriver::new(state.store.clone(), state.publisher.clone());
    let report = driver.tick(now);
    if report.errors > 0 {
        log::warn!(
            "maintenance_tick transitioned={} errors={}",
            report.transitioned,
            report.errors
        );
    }

    match state.store.purge_expired(now) {
        Ok(purged) if purged > 0 => log::info!("events_purged count={}", purged),
        Ok(_) => {}
        Err(err) => log::warn!("events_purge_failed error={}", err),
    }

    match state.registry.sweep_stale(now) {
        Ok(swept) if swept > 0 => log::info!("stale_subscriptions_swept count={}", swept),
        Ok(_) => {}
        Err(err) => log::warn!("subscription_sweep_failed error={}", err),
    }

    match state.registry.gc_durable(now) {
        Ok(collected) if collected > 0 => {
            log::info!("stale_subscribers_collected count={}", collected)
        }
        Ok(_) => {}
        Err(err) => log::warn!("subscriber_gc_failed error={}", err),
    }

    state.bus.sweep_idle();
}

/// Spawns the periodic driver loop at the configured tick cadence.
pub fn spawn(state: HubState) -> tokio::task::JoinHandle<()> {
    let period = Duration::from_secs(state.settings.driver_tick_seconds);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_maintenance_pass(&state);
        }
    })
}
