//! Light Reconciler
//!
//! Tracks what the light should show (from the camera probe) against what
//! the device last confirmed, and decides when a command is due. On-air is
//! immediate; off is debounced over consecutive idle ticks so brief camera
//! releases between meetings do not flicker the light.
//!
//! The reconciler is a plain owned state machine. It never talks to the
//! network itself; the scheduler feeds it probe samples and reports back
//! device-confirmed state.

/// Decision produced by a reconcile tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightCommand {
    /// Switch the light on with the configured appearance
    TurnOn,
    /// Switch the light off
    TurnOff,
}

/// Reconciliation state machine for one light
pub struct LightReconciler {
    /// What the light should show right now
    desired_on: bool,
    /// Last device-confirmed light state
    observed_on: bool,
    /// Consecutive idle ticks since the camera was last seen in use
    off_ticks: u32,
    /// Idle ticks the counter must strictly exceed before off is commanded
    off_debounce_ticks: u32,
}

impl LightReconciler {
    /// Create a reconciler; observed state starts off because startup
    /// issues an off baseline before the first tick
    pub fn new(off_debounce_ticks: u32) -> Self {
        Self {
            desired_on: false,
            observed_on: false,
            off_ticks: 0,
            off_debounce_ticks,
        }
    }

    /// Feed one probe sample and return the command due, if any
    ///
    /// Returns:
    /// - `Some(TurnOn)` when the camera is in use and the light is not
    ///   confirmed on yet (repeated until a send is confirmed)
    /// - `Some(TurnOff)` when the light is confirmed on and the idle run
    ///   has exceeded the debounce window (repeated until confirmed)
    /// - `None` when desired and confirmed state already agree
    pub fn observe_probe(&mut self, in_use: bool) -> Option<LightCommand> {
        if in_use && !self.desired_on {
            tracing::info!("Camera in use, light should be on");
        } else if !in_use && self.desired_on {
            tracing::info!("Camera released, holding light through debounce window");
        }
        self.desired_on = in_use;

        if in_use {
            self.off_ticks = 0;
            if !self.observed_on {
                return Some(LightCommand::TurnOn);
            }
            return None;
        }

        self.off_ticks = self.off_ticks.saturating_add(1);
        if self.observed_on && self.off_ticks > self.off_debounce_ticks {
            return Some(LightCommand::TurnOff);
        }
        None
    }

    /// Record a device-confirmed on/off state
    ///
    /// Called only with values the device actually reported (a confirmed
    /// send or a resync read). A confirmed off also closes the current
    /// debounce cycle.
    pub fn record_confirmed(&mut self, on: bool) {
        self.observed_on = on;
        if !on {
            self.off_ticks = 0;
        }
    }

    /// What the light should currently show
    pub fn desired_on(&self) -> bool {
        self.desired_on
    }

    /// Last device-confirmed state
    pub fn observed_on(&self) -> bool {
        self.observed_on
    }
}
