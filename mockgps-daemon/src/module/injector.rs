//! Injection loop
//!
//! Keeps re-submitting the active coordinate to every registered provider
//! so consumers that drop aged samples keep seeing a live position.
//!
//! A controller task owns the loop lifecycle (`Stopped -> Starting ->
//! Pulsing -> Stopped`) and reacts to Start/Update/Stop messages. The pulse
//! task only reads the active coordinate, which the controller swaps as a
//! whole value.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::location::{Coordinate, LocationFix};
use super::provider::ProviderRegistry;
use crate::error::CommandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Stopped,
    Starting,
    Pulsing,
}

#[derive(Debug)]
enum LoopMessage {
    Start(Coordinate),
    Update(Coordinate),
    Stop(oneshot::Sender<()>),
}

/// Cloneable handle to the injection loop controller
#[derive(Clone)]
pub struct InjectorHandle {
    tx: mpsc::Sender<LoopMessage>,
    status: watch::Receiver<LoopStatus>,
    active: watch::Receiver<Option<Coordinate>>,
}

impl InjectorHandle {
    pub fn status(&self) -> LoopStatus {
        *self.status.borrow()
    }

    pub fn is_pulsing(&self) -> bool {
        self.status() != LoopStatus::Stopped
    }

    /// Coordinate the next pulse will inject
    pub fn active_coordinate(&self) -> Option<Coordinate> {
        *self.active.borrow()
    }

    pub async fn start(&self, coordinate: Coordinate) -> Result<(), CommandError> {
        self.send(LoopMessage::Start(coordinate)).await
    }

    pub async fn update(&self, coordinate: Coordinate) -> Result<(), CommandError> {
        self.send(LoopMessage::Update(coordinate)).await
    }

    /// Stop pulsing and unregister every provider; returns once both are done.
    pub async fn stop(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.send(LoopMessage::Stop(ack_tx)).await.is_err() {
            debug!("Injection loop controller already gone, nothing to stop");
            return;
        }
        let _ = ack_rx.await;
    }

    async fn send(&self, message: LoopMessage) -> Result<(), CommandError> {
        self.tx.send(message).await.map_err(|_| CommandError::InjectorClosed)
    }
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct InjectionLoop {
    registry: Arc<ProviderRegistry>,
    interval: Duration,
    boot: Instant,
    status: watch::Sender<LoopStatus>,
    active: watch::Sender<Option<Coordinate>>,
    running: Option<RunningLoop>,
}

impl InjectionLoop {
    /// Spawn the controller task.
    ///
    /// `boot` is the reference for the monotonic timestamp of every sample.
    /// The controller tears the loop down once every handle is dropped.
    pub fn spawn(
        registry: Arc<ProviderRegistry>,
        interval: Duration,
        boot: Instant,
    ) -> (InjectorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(100);
        let (status_tx, status_rx) = watch::channel(LoopStatus::Stopped);
        let (active_tx, active_rx) = watch::channel(None);

        let controller = Self {
            registry,
            interval,
            boot,
            status: status_tx,
            active: active_tx,
            running: None,
        };

        let handle = InjectorHandle {
            tx,
            status: status_rx,
            active: active_rx,
        };

        (handle, tokio::spawn(controller.run(rx)))
    }

    async fn run(mut self, mut rx: mpsc::Receiver<LoopMessage>) {
        while let Some(message) = rx.recv().await {
            match message {
                LoopMessage::Start(coordinate) => {
                    if self.is_running() {
                        debug!("Injection loop already pulsing, treating start as update");
                    }
                    self.apply(coordinate);
                }
                LoopMessage::Update(coordinate) => {
                    if !self.is_running() {
                        info!("Update received while stopped, starting injection loop");
                    }
                    self.apply(coordinate);
                }
                LoopMessage::Stop(ack) => {
                    self.stop().await;
                    let _ = ack.send(());
                }
            }
        }

        info!("Injection loop controller shutting down");
        self.stop().await;
    }

    fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|running| !running.handle.is_finished())
    }

    fn apply(&mut self, coordinate: Coordinate) {
        let merged = coordinate.inherit_altitude(self.active.borrow().as_ref());
        self.active.send_replace(Some(merged));
        info!("Injection loop now targets {}", merged);

        if !self.is_running() {
            self.start();
        }
    }

    fn start(&mut self) {
        self.status.send_replace(LoopStatus::Starting);
        info!(
            "Starting injection loop in foreground mode (pulse every {} ms)",
            self.interval.as_millis()
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pulse_loop(
            self.registry.clone(),
            self.active.subscribe(),
            self.interval,
            self.boot,
            cancel.clone(),
        ));

        self.running = Some(RunningLoop { cancel, handle });
        self.status.send_replace(LoopStatus::Pulsing);
    }

    /// Cancel the pulse task, wait for it to exit, then remove the providers.
    async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                warn!("Injection loop ended abnormally: {}", e);
            }
            info!("Injection loop stopped");
        }

        self.registry.unregister_all().await;
        self.active.send_replace(None);
        self.status.send_replace(LoopStatus::Stopped);
    }
}

async fn pulse_loop(
    registry: Arc<ProviderRegistry>,
    active: watch::Receiver<Option<Coordinate>>,
    interval: Duration,
    boot: Instant,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if cancel.is_cancelled() {
            break;
        }

        let coordinate = *active.borrow();
        if let Some(coordinate) = coordinate {
            pulse(&registry, &coordinate, boot).await;
        }
    }
}

/// Submit one sample to every registered provider; returns how many were accepted.
pub async fn pulse(registry: &ProviderRegistry, coordinate: &Coordinate, boot: Instant) -> usize {
    let time = Utc::now();
    let elapsed_realtime = boot.elapsed();
    let subsystem = registry.subsystem();

    let submissions = registry.registered().into_iter().map(|name| async move {
        let fix = LocationFix::new(name, coordinate, time, elapsed_realtime);
        match subsystem.submit_location(name, &fix).await {
            Ok(()) => {
                trace!("Pulsed {} into {}", coordinate, name);
                true
            }
            Err(e) => {
                warn!("Failed to set mock location for {}: {}", name, e);
                false
            }
        }
    });

    join_all(submissions).await.into_iter().filter(|ok| *ok).count()
}
