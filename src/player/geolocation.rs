//! Continuous observer location as a cancellable subscription.

use bevy::prelude::*;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde_json::Value;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::GeoError;
use crate::geo::GeoPoint;

pub type LocationFix = Result<GeoPoint, GeoError>;

/// Live location watch. Cancelled explicitly or when dropped; after
/// cancellation the watch delivers nothing more.
#[derive(Debug)]
pub struct WatchHandle {
    cancel: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Handle for a watch run on `thread`. The thread must exit once the
    /// receiving end of `cancel` disconnects.
    pub fn new(cancel: Sender<()>, thread: Option<JoinHandle<()>>) -> Self {
        Self {
            cancel: Some(cancel),
            thread,
        }
    }

    /// Handle for a watch with nothing running in the background.
    pub fn inert() -> Self {
        Self {
            cancel: None,
            thread: None,
        }
    }

    pub fn cancel(&mut self) {
        // Disconnecting the channel is the cancel signal
        self.cancel = None;
        if let Some(thread) = self.thread.take() {
            if thread.is_finished() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Source of observer locations.
pub trait LocationProvider: Send + Sync {
    /// Deliver fixes to `sink` until the returned handle is cancelled.
    fn watch(&self, sink: Sender<LocationFix>) -> WatchHandle;

    /// Deliver a single fix to `sink` without blocking the caller.
    fn locate_once(&self, sink: Sender<LocationFix>);
}

/// Always reports the same location.
pub struct FixedLocationProvider {
    pub point: GeoPoint,
}

impl LocationProvider for FixedLocationProvider {
    fn watch(&self, sink: Sender<LocationFix>) -> WatchHandle {
        let _ = sink.send(Ok(self.point));
        WatchHandle::inert()
    }

    fn locate_once(&self, sink: Sender<LocationFix>) {
        let _ = sink.send(Ok(self.point));
    }
}

/// IP geolocation service and the JSON fields holding the coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct IpEndpoint {
    pub url: String,
    pub latitude_field: &'static str,
    pub longitude_field: &'static str,
}

impl IpEndpoint {
    pub fn ipapi_co() -> Self {
        Self {
            url: "https://ipapi.co/json/".to_string(),
            latitude_field: "latitude",
            longitude_field: "longitude",
        }
    }

    pub fn ip_api_com() -> Self {
        Self {
            url: "http://ip-api.com/json/".to_string(),
            latitude_field: "lat",
            longitude_field: "lon",
        }
    }
}

/// Polls IP geolocation services, first answer wins.
#[derive(Debug, Clone)]
pub struct IpLocationProvider {
    pub endpoints: Vec<IpEndpoint>,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl IpLocationProvider {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            endpoints: vec![IpEndpoint::ipapi_co(), IpEndpoint::ip_api_com()],
            poll_interval,
            timeout: Duration::from_secs(10),
        }
    }

    /// Blocking lookup. Must not run on the frame loop.
    pub fn lookup(&self) -> LocationFix {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| GeoError::Unavailable(e.to_string()))?;

        let mut last_error = GeoError::Unavailable("no location service configured".to_string());
        for endpoint in &self.endpoints {
            match lookup_endpoint(&client, endpoint) {
                Ok(point) => return Ok(point),
                Err(e) => {
                    debug!("Location lookup via {} failed: {}", endpoint.url, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

fn lookup_endpoint(client: &reqwest::blocking::Client, endpoint: &IpEndpoint) -> LocationFix {
    let response = client.get(&endpoint.url).send().map_err(|e| {
        if e.is_timeout() {
            GeoError::Timeout
        } else {
            GeoError::Unavailable(e.to_string())
        }
    })?;

    match response.status().as_u16() {
        200..=299 => {}
        401 | 403 => return Err(GeoError::PermissionDenied),
        status => return Err(GeoError::Unavailable(format!("HTTP {}", status))),
    }

    let body: Value = response
        .json()
        .map_err(|e| GeoError::Unavailable(e.to_string()))?;
    let latitude = body.get(endpoint.latitude_field).and_then(Value::as_f64);
    let longitude = body.get(endpoint.longitude_field).and_then(Value::as_f64);

    match (latitude, longitude) {
        (Some(lat), Some(lon)) if GeoPoint::new(lat, lon).is_valid() => Ok(GeoPoint::new(lat, lon)),
        _ => Err(GeoError::Unavailable(format!(
            "no coordinates in response from {}",
            endpoint.url
        ))),
    }
}

impl LocationProvider for IpLocationProvider {
    fn watch(&self, sink: Sender<LocationFix>) -> WatchHandle {
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);
        let provider = self.clone();

        let thread = std::thread::Builder::new()
            .name("geolocation-watch".to_string())
            .spawn(move || loop {
                let fix = provider.lookup();
                // Never deliver after cancellation
                if matches!(cancel_rx.try_recv(), Err(TryRecvError::Disconnected)) {
                    break;
                }
                if sink.send(fix).is_err() {
                    break;
                }
                match cancel_rx.recv_timeout(provider.poll_interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            })
            .map_err(|e| error!("Failed to spawn geolocation thread: {}", e))
            .ok();

        WatchHandle::new(cancel_tx, thread)
    }

    fn locate_once(&self, sink: Sender<LocationFix>) {
        let provider = self.clone();
        if let Err(e) = std::thread::Builder::new()
            .name("geolocation-once".to_string())
            .spawn(move || {
                let _ = sink.send(provider.lookup());
            })
        {
            error!("Failed to spawn geolocation thread: {}", e);
        }
    }
}

/// Owns the single location watch of the active session.
#[derive(Resource)]
pub struct GeolocationTracker {
    provider: Box<dyn LocationProvider>,
    watch: Option<WatchHandle>,
    channel: Option<(Sender<LocationFix>, Receiver<LocationFix>)>,
    pub last_fix: Option<GeoPoint>,
    pub last_error: Option<GeoError>,
}

impl GeolocationTracker {
    pub fn new(provider: Box<dyn LocationProvider>) -> Self {
        Self {
            provider,
            watch: None,
            channel: None,
            last_fix: None,
            last_error: None,
        }
    }

    /// Start watching. No-op (returns `false`) while a watch is outstanding.
    pub fn start(&mut self) -> bool {
        if self.watch.is_some() {
            return false;
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        self.watch = Some(self.provider.watch(tx.clone()));
        self.channel = Some((tx, rx));
        info!("Location watch started");
        true
    }

    /// Cancel the watch and discard anything not yet polled.
    pub fn stop(&mut self) -> bool {
        let Some(mut watch) = self.watch.take() else {
            return false;
        };
        watch.cancel();
        self.channel = None;
        info!("Location watch cancelled");
        true
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    /// Ask for an immediate fix. Only while watching.
    pub fn locate_now(&self) -> bool {
        match &self.channel {
            Some((tx, _)) => {
                self.provider.locate_once(tx.clone());
                true
            }
            None => false,
        }
    }

    /// Drain delivered fixes. Returns the newest successful one; failures are
    /// logged and leave the last fix unchanged.
    pub fn poll(&mut self) -> Option<GeoPoint> {
        let (_, rx) = self.channel.as_ref()?;
        let mut newest = None;
        for fix in rx.try_iter() {
            match fix {
                Ok(point) => newest = Some(point),
                Err(e) => {
                    warn!("Geolocation error: {}", e);
                    self.last_error = Some(e);
                }
            }
        }
        if let Some(point) = newest {
            self.last_fix = Some(point);
            self.last_error = None;
        }
        newest
    }
}

impl Drop for GeolocationTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flight_data::client::test_server::MockServer;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    /// Provider that emits a script of fixes, then idles until cancelled.
    struct ScriptedProvider {
        script: Vec<LocationFix>,
        watches: Arc<AtomicUsize>,
        stopped: Arc<AtomicBool>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<LocationFix>) -> Self {
            Self {
                script,
                watches: Arc::new(AtomicUsize::new(0)),
                stopped: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl LocationProvider for ScriptedProvider {
        fn watch(&self, sink: Sender<LocationFix>) -> WatchHandle {
            self.watches.fetch_add(1, Ordering::SeqCst);
            let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);
            let script = self.script.clone();
            let stopped = Arc::clone(&self.stopped);
            let thread = std::thread::spawn(move || {
                for fix in script {
                    let _ = sink.send(fix);
                }
                // Blocks until the handle disconnects
                let _ = cancel_rx.recv();
                stopped.store(true, Ordering::SeqCst);
            });
            WatchHandle::new(cancel_tx, Some(thread))
        }

        fn locate_once(&self, sink: Sender<LocationFix>) {
            let _ = sink.send(Ok(GeoPoint::new(1.0, 2.0)));
        }
    }

    fn wait_for(flag: &AtomicBool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if flag.load(Ordering::SeqCst) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    fn poll_until_fix(tracker: &mut GeolocationTracker) -> Option<GeoPoint> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(point) = tracker.poll() {
                return Some(point);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        None
    }

    #[test]
    fn second_start_does_not_open_another_watch() {
        let provider = ScriptedProvider::new(vec![]);
        let watches = Arc::clone(&provider.watches);
        let mut tracker = GeolocationTracker::new(Box::new(provider));

        assert!(tracker.start());
        assert!(!tracker.start());
        assert_eq!(watches.load(Ordering::SeqCst), 1);
        assert!(tracker.stop());
        assert!(!tracker.stop());
    }

    #[test]
    fn stop_cancels_the_watch_thread() {
        let provider = ScriptedProvider::new(vec![]);
        let stopped = Arc::clone(&provider.stopped);
        let mut tracker = GeolocationTracker::new(Box::new(provider));

        tracker.start();
        assert!(!stopped.load(Ordering::SeqCst));
        tracker.stop();
        assert!(wait_for(&stopped));
        assert!(!tracker.is_watching());
    }

    #[test]
    fn dropping_the_tracker_cancels_too() {
        let provider = ScriptedProvider::new(vec![]);
        let stopped = Arc::clone(&provider.stopped);
        let mut tracker = GeolocationTracker::new(Box::new(provider));
        tracker.start();
        drop(tracker);
        assert!(wait_for(&stopped));
    }

    #[test]
    fn errors_leave_last_fix_unchanged() {
        let provider = ScriptedProvider::new(vec![
            Ok(GeoPoint::new(46.5, 6.6)),
            Err(GeoError::PermissionDenied),
        ]);
        let mut tracker = GeolocationTracker::new(Box::new(provider));
        tracker.start();

        let fix = poll_until_fix(&mut tracker);
        assert_eq!(fix, Some(GeoPoint::new(46.5, 6.6)));

        // Let the trailing error arrive, it must not clear the fix
        let deadline = Instant::now() + Duration::from_secs(5);
        while tracker.last_error.is_none() && Instant::now() < deadline {
            assert_eq!(tracker.poll(), None);
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(tracker.last_error, Some(GeoError::PermissionDenied));
        assert_eq!(tracker.last_fix, Some(GeoPoint::new(46.5, 6.6)));
    }

    #[test]
    fn poll_returns_newest_fix() {
        let provider = FixedLocationProvider {
            point: GeoPoint::new(46.778, 6.6412),
        };
        let mut tracker = GeolocationTracker::new(Box::new(provider));
        assert_eq!(tracker.poll(), None);
        assert!(!tracker.locate_now());

        tracker.start();
        assert!(tracker.locate_now());
        assert_eq!(tracker.poll(), Some(GeoPoint::new(46.778, 6.6412)));
        assert_eq!(tracker.poll(), None);
    }

    #[test]
    fn ip_lookup_falls_back_to_second_service() {
        let server = MockServer::start(Box::new(|req| {
            if req.url.starts_with("/primary") {
                (429, r#"{"error":true,"reason":"RateLimited"}"#.to_string())
            } else {
                (200, r#"{"status":"success","lat":46.78,"lon":6.64}"#.to_string())
            }
        }));
        let provider = IpLocationProvider {
            endpoints: vec![
                IpEndpoint {
                    url: format!("{}/primary", server.base_url),
                    latitude_field: "latitude",
                    longitude_field: "longitude",
                },
                IpEndpoint {
                    url: format!("{}/fallback", server.base_url),
                    latitude_field: "lat",
                    longitude_field: "lon",
                },
            ],
            poll_interval: Duration::from_secs(60),
            timeout: Duration::from_secs(5),
        };

        assert_eq!(provider.lookup(), Ok(GeoPoint::new(46.78, 6.64)));
        assert_eq!(server.recorded().len(), 2);
    }

    #[test]
    fn ip_lookup_without_coordinates_is_unavailable() {
        let server = MockServer::start(Box::new(|_| (200, r#"{"status":"fail"}"#.to_string())));
        let provider = IpLocationProvider {
            endpoints: vec![IpEndpoint {
                url: format!("{}/json", server.base_url),
                latitude_field: "lat",
                longitude_field: "lon",
            }],
            poll_interval: Duration::from_secs(60),
            timeout: Duration::from_secs(5),
        };
        assert!(matches!(provider.lookup(), Err(GeoError::Unavailable(_))));
    }
}
