use bevy::prelude::*;
use std::time::Duration;

use crate::error::FlightDataError;

/// Shortest accepted refresh interval
const MIN_INTERVAL: Duration = Duration::from_millis(100);

pub type RefreshCallback = Box<dyn FnMut() -> Result<(), FlightDataError> + Send + Sync>;

/// Periodic trigger driven by frame time.
///
/// `start` runs the callback right away and then once per elapsed interval
/// until `stop`. A failing callback is logged and the schedule keeps going.
#[derive(Resource, Default)]
pub struct AutoRefresh {
    timer: Option<Timer>,
    callback: Option<RefreshCallback>,
    /// Total callback invocations
    pub cycles: u64,
    /// Invocations that returned an error
    pub failures: u64,
}

impl AutoRefresh {
    /// Returns `false` (and does nothing) when already running.
    pub fn start<F>(&mut self, callback: F, interval: Duration) -> bool
    where
        F: FnMut() -> Result<(), FlightDataError> + Send + Sync + 'static,
    {
        if self.is_running() {
            debug!("Auto refresh already running");
            return false;
        }

        let interval = if interval < MIN_INTERVAL {
            warn!(
                "Refresh interval {:?} too short, using {:?}",
                interval, MIN_INTERVAL
            );
            MIN_INTERVAL
        } else {
            interval
        };

        self.callback = Some(Box::new(callback));
        self.timer = Some(Timer::new(interval, TimerMode::Repeating));
        info!("Auto refresh started, every {:?}", interval);
        self.fire();
        true
    }

    /// Returns `false` when already stopped.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.timer = None;
        self.callback = None;
        info!("Auto refresh stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.timer.as_ref().map(Timer::duration)
    }

    /// Advance the schedule by `delta`. Returns how many cycles fired.
    pub fn tick(&mut self, delta: Duration) -> u32 {
        let Some(timer) = self.timer.as_mut() else {
            return 0;
        };
        timer.tick(delta);
        let fired = timer.times_finished_this_tick();
        for _ in 0..fired {
            self.fire();
        }
        fired
    }

    fn fire(&mut self) {
        let Some(callback) = self.callback.as_mut() else {
            return;
        };
        self.cycles += 1;
        if let Err(e) = callback() {
            self.failures += 1;
            warn!("Auto refresh error: {}", e);
        }
    }
}

pub fn tick_auto_refresh(time: Res<Time>, mut refresh: ResMut<AutoRefresh>) {
    refresh.tick(time.delta());
}

pub struct RefreshPlugin;

impl Plugin for RefreshPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<AutoRefresh>()
            .add_systems(Update, tick_auto_refresh);
    }
}
