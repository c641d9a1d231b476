//! Periodic drivers for the evaluation and rotation pipelines.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;

use super::engine::Engine;

/// Fixed-interval timers driving the engine.
///
/// The check and rotation loops run on independent timers and never block
/// each other; a firing launches work and moves on without waiting for
/// the previous firing's pipelines.
pub struct Scheduler {
    engine: Arc<Engine>,
    check_interval: Duration,
    rotation_interval: Duration,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, check_interval: Duration, rotation_interval: Duration) -> Self {
        Self { engine, check_interval, rotation_interval }
    }

    /// Spawn both loops. Each fires once immediately, then at its fixed
    /// interval.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        vec![self.spawn_check_loop(), self.spawn_rotation_loop()]
    }

    fn spawn_check_loop(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let period = self.check_interval;

        tokio::spawn(async move {
            let mut timer = interval(period);
            loop {
                timer.tick().await;
                Arc::clone(&engine).run_check_tick().await;
            }
        })
    }

    fn spawn_rotation_loop(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let period = self.rotation_interval;

        tokio::spawn(async move {
            let mut timer = interval(period);
            loop {
                timer.tick().await;
                engine.rotate_logs().await;
            }
        })
    }
}
