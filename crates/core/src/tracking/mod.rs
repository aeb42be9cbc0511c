//! Planar-marker tracking session.
//!
//! Wraps a platform tracking engine and the camera stream feeding it. The
//! session owns exactly one engine and at most one live camera stream; every
//! native handle it creates is registered with the shared
//! [`ResourceRegistry`] so teardown happens exactly once.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    config::{RetryConfig, TrackingConfig},
    diagnostics::Diagnostics,
    render::RenderSurface,
    resources::{ResourceHandle, ResourceKind, ResourceRegistry},
    scene::Pose,
    wait::wait_until,
    OverlayError, Result,
};

/// Precompiled marker features, or the raw image they would be built from.
#[derive(Clone, PartialEq)]
pub enum TrackingDescriptor {
    Binary(Arc<[u8]>),
    Image { width: u32, height: u32 },
}

impl TrackingDescriptor {
    pub fn binary(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Binary(bytes.into())
    }
}

impl fmt::Debug for TrackingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary(bytes) => write!(f, "Binary({} bytes)", bytes.len()),
            Self::Image { width, height } => write!(f, "Image({width}x{height})"),
        }
    }
}

/// What the engine is actually handed to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorSource {
    /// Temporary object reference wrapping the binary descriptor.
    ObjectUrl(String),
    Image { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacingMode {
    Environment,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceProfile {
    Handheld,
    Desktop,
}

impl DeviceProfile {
    pub fn preferred_facing(self) -> FacingMode {
        match self {
            Self::Handheld => FacingMode::Environment,
            Self::Desktop => FacingMode::User,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CameraConstraints {
    pub facing_mode: Option<FacingMode>,
    pub resolution: Option<Resolution>,
}

impl CameraConstraints {
    pub fn for_device(device: DeviceProfile, resolution: Resolution) -> Self {
        Self {
            facing_mode: Some(device.preferred_facing()),
            resolution: Some(resolution),
        }
    }

    /// Any camera at any resolution.
    pub fn relaxed() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("permission denied")]
    Denied,
    #[error("constraints unsatisfied: {0}")]
    ConstraintsUnsatisfied(String),
    #[error("camera unavailable: {0}")]
    Unavailable(String),
}

/// Live camera stream. Dropping it does not stop the tracks.
pub trait CameraStream: Send {
    fn label(&self) -> String;
    fn stop_tracks(&mut self);
}

#[async_trait]
pub trait CameraBackend: Send + Sync {
    async fn request_stream(
        &self,
        constraints: &CameraConstraints,
    ) -> std::result::Result<Box<dyn CameraStream>, CameraError>;
}

/// Engine construction parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingOptions {
    pub device: DeviceProfile,
    pub resolution: Resolution,
    pub max_simultaneous_targets: usize,
}

impl TrackingOptions {
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            device: if config.handheld {
                DeviceProfile::Handheld
            } else {
                DeviceProfile::Desktop
            },
            resolution: Resolution {
                width: config.width,
                height: config.height,
            },
            max_simultaneous_targets: 1,
        }
    }

    pub fn facing_mode(&self) -> FacingMode {
        self.device.preferred_facing()
    }
}

/// One candidate match reported by the engine for the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub target_index: usize,
    pub anchor: Pose,
}

pub trait TrackingEngine: Send {
    /// Attaches the camera feed and starts the internal detection loop.
    fn start(&mut self, stream: &dyn CameraStream) -> std::result::Result<(), String>;
    /// Whether the engine has created and attached its camera feed element.
    fn is_camera_attached(&self) -> bool;
    /// Candidate matches for the most recent processed frame.
    fn detections(&mut self) -> Vec<Detection>;
    fn stop(&mut self);
}

/// Platform entry point for engines and temporary object references.
pub trait TrackingBackend: Send + Sync {
    fn construct(
        &self,
        source: &DescriptorSource,
        surface_size: (u32, u32),
        options: &TrackingOptions,
    ) -> std::result::Result<Box<dyn TrackingEngine>, String>;

    fn create_object_url(&self, bytes: Arc<[u8]>) -> String;

    fn revoke_object_url(&self, url: &str);
}

pub type VisibilityCallback = Box<dyn FnMut(bool, Option<&Pose>) + Send>;

/// Engine plus whether its detection loop is running. Every stop goes through
/// [`EngineSlot::halt`], so the engine is stopped once per start.
struct EngineSlot {
    engine: Box<dyn TrackingEngine>,
    detecting: bool,
}

impl EngineSlot {
    fn halt(&mut self) -> bool {
        if !self.detecting {
            return false;
        }
        self.engine.stop();
        self.detecting = false;
        true
    }
}

type SharedEngine = Arc<Mutex<EngineSlot>>;

pub struct MarkerTrackingSession {
    engine: SharedEngine,
    camera: Arc<dyn CameraBackend>,
    registry: Arc<ResourceRegistry>,
    options: TrackingOptions,
    retry: RetryConfig,
    diagnostics: Diagnostics,
    descriptor: Option<TrackingDescriptor>,
    engine_handle: Option<ResourceHandle>,
    object_url_handle: Option<ResourceHandle>,
    stream_handle: Option<ResourceHandle>,
    listeners: Vec<VisibilityCallback>,
    resolution: (u32, u32),
    running: bool,
}

impl MarkerTrackingSession {
    /// Builds the engine against `surface`. Fails with
    /// [`OverlayError::SurfaceNotReady`] while the surface has no size.
    #[allow(clippy::too_many_arguments)]
    pub fn initialize(
        descriptor: TrackingDescriptor,
        surface: &dyn RenderSurface,
        backend: Arc<dyn TrackingBackend>,
        camera: Arc<dyn CameraBackend>,
        options: TrackingOptions,
        retry: RetryConfig,
        registry: Arc<ResourceRegistry>,
        diagnostics: Diagnostics,
    ) -> Result<Self> {
        let size = surface.measured_size();
        if size.0 == 0 || size.1 == 0 {
            return Err(OverlayError::SurfaceNotReady);
        }

        let (source, object_url_handle) = match &descriptor {
            TrackingDescriptor::Binary(bytes) => {
                let url = backend.create_object_url(bytes.clone());
                let revoke = backend.clone();
                let revoked = url.clone();
                let handle = registry.register(ResourceKind::ObjectUrl, "descriptor url", move || {
                    revoke.revoke_object_url(&revoked)
                });
                (DescriptorSource::ObjectUrl(url), Some(handle))
            }
            TrackingDescriptor::Image { width, height } => (
                DescriptorSource::Image {
                    width: *width,
                    height: *height,
                },
                None,
            ),
        };

        let engine = match backend.construct(&source, size, &options) {
            Ok(engine) => Arc::new(Mutex::new(EngineSlot {
                engine,
                detecting: false,
            })),
            Err(reason) => {
                if let Some(handle) = object_url_handle {
                    registry.release(handle);
                }
                diagnostics.error(format!("tracking engine construction failed: {reason}"));
                return Err(OverlayError::EngineConstruction(reason));
            }
        };

        let stopper = engine.clone();
        let engine_handle = registry.register(ResourceKind::TrackingEngine, "tracking engine", move || {
            stopper.lock().halt();
        });

        diagnostics.info(format!(
            "tracking engine ready on {}x{} surface ({:?} camera)",
            size.0,
            size.1,
            options.facing_mode()
        ));

        Ok(Self {
            engine,
            camera,
            registry,
            resolution: (options.resolution.width, options.resolution.height),
            options,
            retry,
            diagnostics,
            descriptor: Some(descriptor),
            engine_handle: Some(engine_handle),
            object_url_handle,
            stream_handle: None,
            listeners: Vec::new(),
            running: false,
        })
    }

    /// Acquires the camera, starts detection and resolves once the feed is attached.
    pub async fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        if self.engine_handle.is_none() {
            return Err(OverlayError::NotInitialized);
        }
        // Left behind when an earlier start was abandoned mid-way.
        if let Some(stale) = self.stream_handle.take() {
            self.registry.release(stale);
        }

        let preferred = CameraConstraints::for_device(self.options.device, self.options.resolution);
        let mut stream = self.request_camera(preferred).await?;
        self.diagnostics
            .info(format!("camera stream acquired: {}", stream.label()));

        let started = {
            let mut slot = self.engine.lock();
            let started = slot.engine.start(stream.as_ref());
            slot.detecting = started.is_ok();
            started
        };
        if let Err(reason) = started {
            stream.stop_tracks();
            self.diagnostics
                .error(format!("tracking engine failed to start: {reason}"));
            return Err(OverlayError::Initialization(format!(
                "tracking engine failed to start: {reason}"
            )));
        }

        self.stream_handle = Some(self.registry.register(
            ResourceKind::CameraTrack,
            "camera stream",
            move || stream.stop_tracks(),
        ));

        let engine = self.engine.clone();
        let attached = wait_until(
            move || engine.lock().engine.is_camera_attached(),
            self.retry.attach_timeout(),
            self.retry.attach_poll_interval(),
        )
        .await;

        if !attached {
            self.stop();
            return Err(OverlayError::Initialization(
                "camera feed never attached to the tracker".to_string(),
            ));
        }

        self.running = true;
        self.diagnostics.info("marker tracking started");
        Ok(())
    }

    async fn request_camera(&self, preferred: CameraConstraints) -> Result<Box<dyn CameraStream>> {
        match self.camera.request_stream(&preferred).await {
            Ok(stream) => Ok(stream),
            Err(CameraError::Denied) => Err(OverlayError::CameraPermission),
            Err(CameraError::ConstraintsUnsatisfied(reason)) => {
                self.diagnostics.warn(format!(
                    "camera constraints rejected ({reason}), retrying relaxed"
                ));
                match self.camera.request_stream(&CameraConstraints::relaxed()).await {
                    Ok(stream) => Ok(stream),
                    Err(CameraError::Denied) => Err(OverlayError::CameraPermission),
                    Err(err) => Err(OverlayError::ConstraintNegotiation(err.to_string())),
                }
            }
            Err(CameraError::Unavailable(reason)) => Err(OverlayError::Initialization(format!(
                "camera unavailable: {reason}"
            ))),
        }
    }

    pub fn on_visibility_change(&mut self, callback: impl FnMut(bool, Option<&Pose>) + Send + 'static) {
        self.listeners.push(Box::new(callback));
    }

    /// Reads this frame's detections and notifies listeners. Only the first
    /// candidate is honoured. Returns the anchor while the marker is visible.
    pub fn poll_frame(&mut self) -> Option<Pose> {
        if !self.running {
            return None;
        }

        let detections = self.engine.lock().engine.detections();
        if detections.len() > self.options.max_simultaneous_targets {
            tracing::trace!(candidates = detections.len(), "ignoring extra marker candidates");
        }
        let anchor = detections.first().map(|detection| detection.anchor);

        for listener in &mut self.listeners {
            listener(anchor.is_some(), anchor.as_ref());
        }
        anchor
    }

    /// Halts detection and releases the camera, keeping GPU-side objects.
    pub fn stop(&mut self) {
        if self.engine.lock().halt() {
            self.diagnostics.debug("marker detection halted");
        }
        if let Some(handle) = self.stream_handle.take() {
            if self.registry.release(handle) {
                self.diagnostics.info("camera stream stopped");
            }
        }
        self.running = false;
    }

    /// Releases every resource owned by the session. Idempotent.
    /// The registry disposers do the actual work: engine first, then camera
    /// tracks, then the descriptor reference.
    pub fn dispose(&mut self) {
        for handle in [
            self.engine_handle.take(),
            self.stream_handle.take(),
            self.object_url_handle.take(),
        ]
        .into_iter()
        .flatten()
        {
            self.registry.release(handle);
        }
        self.running = false;
        self.descriptor = None;
        self.listeners.clear();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn facing_mode(&self) -> FacingMode {
        self.options.facing_mode()
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn max_simultaneous_targets(&self) -> usize {
        self.options.max_simultaneous_targets
    }

    pub fn descriptor(&self) -> Option<&TrackingDescriptor> {
        self.descriptor.as_ref()
    }
}

impl fmt::Debug for MarkerTrackingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerTrackingSession")
            .field("options", &self.options)
            .field("descriptor", &self.descriptor)
            .field("running", &self.running)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::sim::{SimCamera, SimSurface, SimTracker};

    fn session(
        tracker: &SimTracker,
        camera: &SimCamera,
        registry: Arc<ResourceRegistry>,
    ) -> MarkerTrackingSession {
        MarkerTrackingSession::initialize(
            TrackingDescriptor::binary(vec![1u8, 2, 3]),
            &SimSurface::new(640, 480),
            Arc::new(tracker.clone()),
            Arc::new(camera.clone()),
            TrackingOptions::from_config(&TrackingConfig::default()),
            RetryConfig::default(),
            registry,
            Diagnostics::default(),
        )
        .unwrap()
    }

    #[test]
    fn zero_sized_surface_is_not_ready() {
        let tracker = SimTracker::new();
        let err = MarkerTrackingSession::initialize(
            TrackingDescriptor::binary(vec![1u8]),
            &SimSurface::new(0, 0),
            Arc::new(tracker.clone()),
            Arc::new(SimCamera::new()),
            TrackingOptions::from_config(&TrackingConfig::default()),
            RetryConfig::default(),
            Arc::new(ResourceRegistry::new()),
            Diagnostics::default(),
        )
        .unwrap_err();

        assert!(matches!(err, OverlayError::SurfaceNotReady));
        assert_eq!(tracker.probe().constructed, 0);
    }

    #[test]
    fn construction_failure_revokes_object_url() {
        let tracker = SimTracker::new().failing_construction("webgl unavailable");
        let registry = Arc::new(ResourceRegistry::new());
        let err = MarkerTrackingSession::initialize(
            TrackingDescriptor::binary(vec![1u8]),
            &SimSurface::new(640, 480),
            Arc::new(tracker.clone()),
            Arc::new(SimCamera::new()),
            TrackingOptions::from_config(&TrackingConfig::default()),
            RetryConfig::default(),
            registry.clone(),
            Diagnostics::default(),
        )
        .unwrap_err();

        assert!(matches!(err, OverlayError::EngineConstruction(_)));
        assert_eq!(tracker.probe().revoked_urls, 1);
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn handheld_prefers_environment_camera() {
        let tracker = SimTracker::new();
        let camera = SimCamera::new();
        let mut session = session(&tracker, &camera, Arc::new(ResourceRegistry::new()));

        session.start().await.unwrap();

        assert!(session.is_running());
        let requests = camera.probe().requests;
        assert_eq!(requests[0].facing_mode, Some(FacingMode::Environment));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_once_with_relaxed_constraints() {
        let tracker = SimTracker::new();
        let camera = SimCamera::new().rejecting_constraints(1);
        let mut session = session(&tracker, &camera, Arc::new(ResourceRegistry::new()));

        session.start().await.unwrap();

        let probe = camera.probe();
        assert_eq!(probe.requests.len(), 2);
        assert_eq!(probe.requests[1], CameraConstraints::relaxed());
    }

    #[tokio::test(start_paused = true)]
    async fn constraint_failure_propagates_after_one_retry() {
        let tracker = SimTracker::new();
        let camera = SimCamera::new().rejecting_constraints(5);
        let mut session = session(&tracker, &camera, Arc::new(ResourceRegistry::new()));

        let err = session.start().await.unwrap_err();

        assert!(matches!(err, OverlayError::ConstraintNegotiation(_)));
        assert_eq!(camera.probe().requests.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn denied_camera_is_terminal() {
        let tracker = SimTracker::new();
        let camera = SimCamera::new().denying();
        let mut session = session(&tracker, &camera, Arc::new(ResourceRegistry::new()));

        let err = session.start().await.unwrap_err();

        assert!(matches!(err, OverlayError::CameraPermission));
        assert_eq!(camera.probe().requests.len(), 1);
        assert!(!session.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn only_first_candidate_is_honoured() {
        let tracker = SimTracker::new();
        let camera = SimCamera::new();
        let mut session = session(&tracker, &camera, Arc::new(ResourceRegistry::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        session.on_visibility_change(move |visible, anchor| {
            sink.lock().push((visible, anchor.map(|pose| pose.position)))
        });
        session.start().await.unwrap();

        tracker.show_candidates(vec![
            Pose::from_position(Vec3::new(0.0, 0.0, -1.0)),
            Pose::from_position(Vec3::new(5.0, 0.0, -1.0)),
        ]);
        let anchor = session.poll_frame().unwrap();
        tracker.hide();
        assert!(session.poll_frame().is_none());

        assert_eq!(anchor.position, Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(
            *seen.lock(),
            vec![(true, Some(Vec3::new(0.0, 0.0, -1.0))), (false, None)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_keeps_engine_for_fast_restart() {
        let tracker = SimTracker::new();
        let camera = SimCamera::new();
        let registry = Arc::new(ResourceRegistry::new());
        let mut session = session(&tracker, &camera, registry.clone());

        session.start().await.unwrap();
        session.stop();
        assert_eq!(camera.probe().active, 0);
        assert!(registry.live_kinds().contains(&ResourceKind::TrackingEngine));

        session.start().await.unwrap();
        assert_eq!(camera.probe().active, 1);
        assert_eq!(tracker.probe().constructed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn engine_is_stopped_once_across_stop_and_teardown() {
        let tracker = SimTracker::new();
        let camera = SimCamera::new();
        let registry = Arc::new(ResourceRegistry::new());
        let mut session = session(&tracker, &camera, registry.clone());

        session.start().await.unwrap();
        session.stop();
        session.stop();
        registry.release_all();
        session.dispose();

        let engine = tracker.probe();
        assert_eq!(engine.start_calls, 1);
        assert_eq!(engine.stop_calls, 1);
        assert_eq!(camera.probe().active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_start_does_not_leak_a_stream() {
        let tracker = SimTracker::new();
        let camera = SimCamera::new().with_latency(std::time::Duration::from_millis(50));
        let mut session = session(&tracker, &camera, Arc::new(ResourceRegistry::new()));

        let abandoned =
            tokio::time::timeout(std::time::Duration::from_millis(10), session.start()).await;
        assert!(abandoned.is_err());
        assert!(!session.is_running());

        session.start().await.unwrap();
        assert_eq!(camera.probe().active, 1);
        assert!(matches!(
            tracker.probe().last_source,
            Some(DescriptorSource::ObjectUrl(ref url)) if url.starts_with("blob:sim/")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_twice_leaves_no_tracks() {
        let tracker = SimTracker::new();
        let camera = SimCamera::new();
        let registry = Arc::new(ResourceRegistry::new());
        let mut session = session(&tracker, &camera, registry.clone());
        session.start().await.unwrap();

        session.dispose();
        session.dispose();

        let probe = camera.probe();
        assert_eq!(probe.started, probe.stopped);
        assert_eq!(tracker.probe().start_calls, 1);
        assert_eq!(tracker.probe().stop_calls, 1);
        assert_eq!(tracker.probe().revoked_urls, 1);
        assert_eq!(registry.live_count(), 0);
        assert!(session.descriptor().is_none());
    }
}
