use bevy::prelude::*;
use chrono::NaiveDate;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use super::astronomy::{AstronomyClient, MoonImage};
use super::client::OpenSkyClient;
use super::model::{AircraftState, TrackPoint};
use crate::error::FlightDataError;
use crate::geo::GeoPoint;

/// Work handed to the background fetch thread.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchRequest {
    States { center: GeoPoint, radius_km: f64 },
    Track { icao24: String },
    MoonTexture { center: GeoPoint, date: NaiveDate },
}

/// Result of one request, delivered back to the frame loop.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    States(Result<Vec<AircraftState>, FlightDataError>),
    Track {
        icao24: String,
        result: Result<Vec<TrackPoint>, FlightDataError>,
    },
    MoonTexture(Result<Option<MoonImage>, FlightDataError>),
}

/// Background thread running its own tokio runtime. Requests are executed one
/// at a time in submission order, so outcomes arrive in the same order.
pub struct FetchWorker {
    requests: Option<UnboundedSender<FetchRequest>>,
    outcomes: Receiver<FetchOutcome>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl FetchWorker {
    pub fn spawn(client: OpenSkyClient, astronomy: AstronomyClient) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name("flight-fetch".to_string())
            .spawn(move || run(client, astronomy, request_rx, outcome_tx, shutdown_rx))
            .map_err(|e| error!("Failed to spawn fetch worker thread: {}", e))
            .ok();

        Self {
            requests: Some(request_tx),
            outcomes: outcome_rx,
            shutdown: Some(shutdown_tx),
            thread,
        }
    }

    /// Cloneable submission handle.
    pub fn sender(&self) -> Option<UnboundedSender<FetchRequest>> {
        self.requests.clone()
    }

    pub fn submit(&self, request: FetchRequest) -> Result<(), FlightDataError> {
        submit_to(self.requests.as_ref(), request)
    }

    /// Next finished outcome, if any. Never blocks.
    pub fn try_next(&self) -> Option<FetchOutcome> {
        match self.outcomes.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn recv_timeout(&self, timeout: std::time::Duration) -> Option<FetchOutcome> {
        self.outcomes.recv_timeout(timeout).ok()
    }

    /// Abort any request in flight and wait for the thread to exit.
    /// Submission handles cloned from [`FetchWorker::sender`] stop working.
    pub fn shutdown(&mut self) {
        self.requests = None;
        // Dropping the sender resolves the receiver on the worker side
        self.shutdown = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Fetch worker thread panicked");
            }
        }
    }
}

impl Drop for FetchWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) fn submit_to(
    requests: Option<&UnboundedSender<FetchRequest>>,
    request: FetchRequest,
) -> Result<(), FlightDataError> {
    requests
        .ok_or(FlightDataError::WorkerStopped)?
        .send(request)
        .map_err(|_| FlightDataError::WorkerStopped)
}

fn run(
    mut client: OpenSkyClient,
    astronomy: AstronomyClient,
    mut requests: UnboundedReceiver<FetchRequest>,
    outcomes: Sender<FetchOutcome>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime for fetch worker: {}", e);
            return;
        }
    };

    rt.block_on(async move {
        info!("Flight fetch worker started");
        loop {
            let request = tokio::select! {
                _ = &mut shutdown => break,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            let outcome = tokio::select! {
                _ = &mut shutdown => break,
                outcome = execute(&mut client, &astronomy, request) => outcome,
            };
            if outcomes.send(outcome).is_err() {
                break;
            }
        }
        info!("Flight fetch worker stopped");
    });
}

async fn execute(
    client: &mut OpenSkyClient,
    astronomy: &AstronomyClient,
    request: FetchRequest,
) -> FetchOutcome {
    match request {
        FetchRequest::States { center, radius_km } => FetchOutcome::States(
            client
                .fetch_states(center.latitude, center.longitude, radius_km)
                .await,
        ),
        FetchRequest::Track { icao24 } => {
            let result = client.fetch_track(&icao24).await;
            FetchOutcome::Track { icao24, result }
        }
        FetchRequest::MoonTexture { center, date } => FetchOutcome::MoonTexture(
            astronomy
                .fetch_moon_texture(center.latitude, center.longitude, date)
                .await,
        ),
    }
}
