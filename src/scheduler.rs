//! Light Scheduler
//!
//! ## Responsibilities
//!
//! - Drive the fast reconcile tick (camera probe -> reconciler -> bridge)
//! - Drive the periodic resync read that corrects external drift, picking
//!   the cadence from the current desired state after every firing
//! - Swallow per-tick errors so one bad sample or one dead bridge call
//!   never stops the loop; the next firing is the retry
//!
//! Both cadences run in a single task that owns the reconciler, so no lock
//! guards the reconcile state and the two triggers cannot interleave.

use crate::config::AppConfig;
use crate::hue_client::LightBridge;
use crate::reconciler::{LightCommand, LightReconciler};
use crate::usage_probe::CapabilityProbe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Drives reconciliation of one light against the camera probe
pub struct LightScheduler {
    probe: CapabilityProbe,
    bridge: Arc<dyn LightBridge>,
    /// Fast reconcile cadence
    tick_interval: Duration,
    /// Resync cadence while on-air
    resync_active: Duration,
    /// Resync cadence while idle
    resync_idle: Duration,
    /// Debounce window handed to the reconciler
    off_debounce_ticks: u32,
    running: Arc<RwLock<bool>>,
}

impl LightScheduler {
    /// Create a scheduler from the daemon configuration
    pub fn new(probe: CapabilityProbe, bridge: Arc<dyn LightBridge>, config: &AppConfig) -> Self {
        Self {
            probe,
            bridge,
            tick_interval: config.tick_interval,
            resync_active: config.resync_active,
            resync_idle: config.resync_idle,
            off_debounce_ticks: config.off_debounce_ticks,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Run the reconcile loop until `stop` is called
    pub async fn run(&self) {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Reconcile loop already running");
                return;
            }
            *running = true;
        }

        info!(
            tick_ms = self.tick_interval.as_millis() as u64,
            off_debounce_ticks = self.off_debounce_ticks,
            "Starting light reconcile loop"
        );

        let mut reconciler = LightReconciler::new(self.off_debounce_ticks);

        // Baseline: whatever the light showed before, it starts off now
        match self.bridge.set_state(false).await {
            Ok(on) => reconciler.record_confirmed(on),
            Err(e) => {
                warn!(error = %e, "Startup off baseline failed, loop will converge on cadence")
            }
        }

        let mut tick = interval(self.tick_interval);
        // A stalled bridge call must not burst catch-up ticks afterwards,
        // the debounce counter counts real cadence ticks
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next_resync = Instant::now() + self.resync_after(&reconciler);

        loop {
            if !*self.running.read().await {
                break;
            }

            tokio::select! {
                _ = tick.tick() => {
                    self.reconcile_tick(&mut reconciler).await;
                }
                _ = sleep_until(next_resync) => {
                    self.resync(&mut reconciler).await;
                    // Re-arm unconditionally, success or failure, from the
                    // desired state the loop holds right now
                    next_resync = Instant::now() + self.resync_after(&reconciler);
                }
            }
        }

        info!("Light reconcile loop stopped");
    }

    /// Stop the loop; it exits at its next wake
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("Stopping light reconcile loop");
    }

    /// One fast tick: sample the probe, apply at most one due command
    async fn reconcile_tick(&self, reconciler: &mut LightReconciler) {
        let in_use = match self.probe.is_in_use() {
            Ok(in_use) => in_use,
            Err(e) => {
                warn!(error = %e, "Camera probe failed, skipping tick");
                return;
            }
        };

        let command = match reconciler.observe_probe(in_use) {
            Some(command) => command,
            None => return,
        };
        let target = matches!(command, LightCommand::TurnOn);

        match self.bridge.set_state(target).await {
            Ok(confirmed) => {
                reconciler.record_confirmed(confirmed);
                info!(on = confirmed, "Light state set");
            }
            Err(e) => {
                error!(error = %e, on = target, "Light state write failed, will retry next tick");
            }
        }
    }

    /// One resync: read the device and adopt what it reports
    async fn resync(&self, reconciler: &mut LightReconciler) {
        match self.bridge.get_state().await {
            Ok(on) => {
                if on != reconciler.observed_on() {
                    info!(device_on = on, "Resync found external change");
                } else {
                    debug!(device_on = on, "Resync confirmed current state");
                }
                reconciler.record_confirmed(on);
            }
            Err(e) => {
                warn!(error = %e, "Resync read failed, keeping last confirmed state");
            }
        }
    }

    /// Resync delay for the current desired state
    fn resync_after(&self, reconciler: &LightReconciler) -> Duration {
        if reconciler.desired_on() {
            self.resync_active
        } else {
            self.resync_idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::hue_client::LightAppearance;
    use crate::usage_probe::MemoryLedger;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::{sleep, timeout};

    /// Bridge double with scriptable failures and an externally flippable
    /// device state
    #[derive(Default)]
    struct FakeBridge {
        device_on: Mutex<bool>,
        set_calls: Mutex<Vec<bool>>,
        get_calls: AtomicUsize,
        failing_sets: AtomicUsize,
        failing_gets: AtomicBool,
    }

    impl FakeBridge {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn set_calls(&self) -> Vec<bool> {
            self.set_calls.lock().unwrap().clone()
        }

        fn device_on(&self) -> bool {
            *self.device_on.lock().unwrap()
        }

        /// Flip the device behind the daemon's back, like a wall switch
        fn flip_device(&self, on: bool) {
            *self.device_on.lock().unwrap() = on;
        }

        fn fail_next_sets(&self, count: usize) {
            self.failing_sets.store(count, Ordering::SeqCst);
        }

        fn fail_gets(&self, failing: bool) {
            self.failing_gets.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl LightBridge for FakeBridge {
        async fn set_state(&self, on: bool) -> Result<bool> {
            self.set_calls.lock().unwrap().push(on);
            if self.failing_sets.load(Ordering::SeqCst) > 0 {
                self.failing_sets.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::Unreachable("fake bridge down".to_string()));
            }
            *self.device_on.lock().unwrap() = on;
            Ok(on)
        }

        async fn get_state(&self) -> Result<bool> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_gets.load(Ordering::SeqCst) {
                return Err(Error::Unreachable("fake bridge down".to_string()));
            }
            Ok(*self.device_on.lock().unwrap())
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            bridge_ip: "127.0.0.1".to_string(),
            username: "test".to_string(),
            light_number: "1".to_string(),
            appearance: LightAppearance::default(),
            tick_interval: Duration::from_millis(10),
            resync_active: Duration::from_millis(30),
            resync_idle: Duration::from_millis(30),
            off_debounce_ticks: 3,
            capability: "webcam".to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }

    fn spawn_scheduler(
        ledger: &Arc<MemoryLedger>,
        bridge: &Arc<FakeBridge>,
        config: &AppConfig,
    ) -> (Arc<LightScheduler>, tokio::task::JoinHandle<()>) {
        let probe = CapabilityProbe::new(Box::new(ledger.clone()), "webcam");
        let scheduler = Arc::new(LightScheduler::new(probe, bridge.clone(), config));
        let runner = scheduler.clone();
        let handle = tokio::spawn(async move { runner.run().await });
        (scheduler, handle)
    }

    #[tokio::test]
    async fn test_startup_baseline_forces_off() {
        let ledger = Arc::new(MemoryLedger::new());
        let bridge = FakeBridge::new();
        bridge.flip_device(true);

        let (scheduler, handle) = spawn_scheduler(&ledger, &bridge, &test_config());
        sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;
        handle.await.unwrap();

        assert_eq!(bridge.set_calls().first(), Some(&false));
        assert!(!bridge.device_on());
    }

    #[tokio::test]
    async fn test_camera_in_use_turns_light_on_once() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.set(&["webcam", "meet.exe"], 0);
        let bridge = FakeBridge::new();

        let (scheduler, handle) = spawn_scheduler(&ledger, &bridge, &test_config());
        sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;
        handle.await.unwrap();

        // Baseline off, one on, then nothing despite many more in-use ticks
        assert_eq!(bridge.set_calls(), vec![false, true]);
        assert!(bridge.device_on());
    }

    #[tokio::test]
    async fn test_release_turns_light_off_after_debounce() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.set(&["webcam", "meet.exe"], 0);
        let bridge = FakeBridge::new();

        let (scheduler, handle) = spawn_scheduler(&ledger, &bridge, &test_config());
        sleep(Duration::from_millis(60)).await;
        assert!(bridge.device_on());

        ledger.set(&["webcam", "meet.exe"], 133_497_600_000_000_000);
        sleep(Duration::from_millis(120)).await;
        scheduler.stop().await;
        handle.await.unwrap();

        assert_eq!(bridge.set_calls(), vec![false, true, false]);
        assert!(!bridge.device_on());
    }

    #[tokio::test]
    async fn test_failed_sets_are_retried_on_cadence() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.set(&["webcam", "meet.exe"], 0);
        let bridge = FakeBridge::new();
        // Baseline plus the first two on attempts fail
        bridge.fail_next_sets(3);

        let (scheduler, handle) = spawn_scheduler(&ledger, &bridge, &test_config());
        sleep(Duration::from_millis(150)).await;
        scheduler.stop().await;
        handle.await.unwrap();

        assert_eq!(bridge.set_calls(), vec![false, true, true, true]);
        assert!(bridge.device_on());
    }

    #[tokio::test]
    async fn test_resync_keeps_firing_after_read_failures() {
        let ledger = Arc::new(MemoryLedger::new());
        let bridge = FakeBridge::new();
        bridge.fail_gets(true);

        let (scheduler, handle) = spawn_scheduler(&ledger, &bridge, &test_config());
        sleep(Duration::from_millis(150)).await;
        scheduler.stop().await;
        handle.await.unwrap();

        // A failed read never cancels the next resync
        assert!(bridge.get_calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_resync_corrects_external_drift() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.set(&["webcam", "meet.exe"], 0);
        let bridge = FakeBridge::new();

        let (scheduler, handle) = spawn_scheduler(&ledger, &bridge, &test_config());
        sleep(Duration::from_millis(60)).await;
        assert!(bridge.device_on());

        // Wall switch: light goes dark while the camera is still live
        bridge.flip_device(false);
        sleep(Duration::from_millis(150)).await;
        scheduler.stop().await;
        handle.await.unwrap();

        let calls = bridge.set_calls();
        assert!(calls.iter().filter(|&&on| on).count() >= 2, "expected a re-send after drift, got {:?}", calls);
        assert!(bridge.device_on());
    }

    #[tokio::test]
    async fn test_probe_failure_skips_ticks() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.set(&["webcam", "meet.exe"], 0);
        ledger.fail_at(&["webcam"]);
        let bridge = FakeBridge::new();

        let (scheduler, handle) = spawn_scheduler(&ledger, &bridge, &test_config());
        sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;
        handle.await.unwrap();

        // Only the startup baseline, no tick ever saw a valid sample
        assert_eq!(bridge.set_calls(), vec![false]);
    }

    #[tokio::test]
    async fn test_stop_terminates_run() {
        let ledger = Arc::new(MemoryLedger::new());
        let bridge = FakeBridge::new();

        let (scheduler, handle) = spawn_scheduler(&ledger, &bridge, &test_config());
        sleep(Duration::from_millis(30)).await;
        scheduler.stop().await;

        timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
    }
}
