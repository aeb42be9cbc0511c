//! In-memory stand-ins for the platform collaborators.
//!
//! Each simulator is a cheap clonable handle over shared state, so a test (or
//! the CLI demo) can keep one clone to script behaviour and read counters
//! while the engine owns another.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    render::{GpuHandle, GpuKind, RenderSurface, Renderer},
    scene::{NodeTransform, Pose},
    session::Backends,
    tracking::{
        CameraBackend, CameraConstraints, CameraError, CameraStream, DescriptorSource, Detection,
        TrackingBackend, TrackingEngine, TrackingOptions,
    },
    video::{MediaElement, MediaFactory},
    OverlayError, Result,
};

/// Surface with a scriptable measured size.
#[derive(Debug, Clone)]
pub struct SimSurface {
    state: Arc<Mutex<SurfaceState>>,
    renderer: SimRenderer,
}

#[derive(Debug)]
struct SurfaceState {
    size: (u32, u32),
    measurements: u32,
}

impl SimSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(SurfaceState {
                size: (width, height),
                measurements: 0,
            })),
            renderer: SimRenderer::default(),
        }
    }

    pub fn set_size(&self, width: u32, height: u32) {
        self.state.lock().size = (width, height);
    }

    pub fn measurements(&self) -> u32 {
        self.state.lock().measurements
    }

    pub fn renderer(&self) -> SimRenderer {
        self.renderer.clone()
    }
}

impl RenderSurface for SimSurface {
    fn measured_size(&self) -> (u32, u32) {
        let mut state = self.state.lock();
        state.measurements += 1;
        state.size
    }

    fn create_renderer(&self) -> Result<Arc<dyn Renderer>> {
        let mut state = self.renderer.state.lock();
        state.created += 1;
        state.disposed = false;
        Ok(Arc::new(self.renderer.clone()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimRenderer {
    state: Arc<Mutex<RendererState>>,
}

#[derive(Debug, Default)]
struct RendererState {
    next_id: u64,
    live: HashMap<GpuHandle, GpuKind>,
    attached: HashSet<GpuHandle>,
    uploads: u64,
    failing_uploads: u32,
    created: u32,
    disposals: u32,
    disposed: bool,
    calls_after_dispose: u32,
    node_updates: u64,
    last_node: Option<NodeTransform>,
}

impl RendererState {
    /// Counts calls that reach the renderer after it was disposed.
    fn touch(&mut self) {
        if self.disposed {
            self.calls_after_dispose += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RendererProbe {
    pub live: usize,
    pub attached: usize,
    pub uploads: u64,
    pub created: u32,
    pub disposals: u32,
    pub calls_after_dispose: u32,
    pub node_updates: u64,
    pub last_node: Option<NodeTransform>,
}

impl SimRenderer {
    /// Makes the next `count` texture uploads fail.
    pub fn fail_next_uploads(&self, count: u32) {
        self.state.lock().failing_uploads = count;
    }

    pub fn probe(&self) -> RendererProbe {
        let state = self.state.lock();
        RendererProbe {
            live: state.live.len(),
            attached: state.attached.len(),
            uploads: state.uploads,
            created: state.created,
            disposals: state.disposals,
            calls_after_dispose: state.calls_after_dispose,
            node_updates: state.node_updates,
            last_node: state.last_node,
        }
    }
}

impl Renderer for SimRenderer {
    fn allocate(&self, kind: GpuKind, _label: &str) -> GpuHandle {
        let mut state = self.state.lock();
        state.touch();
        state.next_id += 1;
        let handle = GpuHandle(state.next_id);
        state.live.insert(handle, kind);
        handle
    }

    fn free(&self, handle: GpuHandle) {
        let mut state = self.state.lock();
        state.touch();
        state.live.remove(&handle);
    }

    fn attach(&self, node: GpuHandle) {
        let mut state = self.state.lock();
        state.touch();
        state.attached.insert(node);
    }

    fn detach(&self, node: GpuHandle) {
        let mut state = self.state.lock();
        state.touch();
        state.attached.remove(&node);
    }

    fn apply_node(&self, _node: GpuHandle, transform: &NodeTransform) {
        let mut state = self.state.lock();
        state.touch();
        state.node_updates += 1;
        state.last_node = Some(*transform);
    }

    fn upload_video_frame(&self, texture: GpuHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.touch();
        if state.failing_uploads > 0 {
            state.failing_uploads -= 1;
            return Err(OverlayError::msg("texture upload failed"));
        }
        if !state.live.contains_key(&texture) {
            return Err(OverlayError::msg("upload to freed texture"));
        }
        state.uploads += 1;
        Ok(())
    }

    fn dispose(&self) {
        let mut state = self.state.lock();
        state.touch();
        state.disposals += 1;
        state.disposed = true;
    }
}

/// Camera that counts every stream it hands out and every track it stops.
#[derive(Debug, Clone, Default)]
pub struct SimCamera {
    state: Arc<Mutex<CameraState>>,
}

#[derive(Debug, Default)]
struct CameraState {
    deny: bool,
    rejected_constraints: u32,
    latency: Duration,
    requests: Vec<CameraConstraints>,
    started: u32,
    stopped: u32,
    active: u32,
    max_active: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraProbe {
    pub requests: Vec<CameraConstraints>,
    pub started: u32,
    pub stopped: u32,
    pub active: u32,
    pub max_active: u32,
}

impl SimCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denying(self) -> Self {
        self.state.lock().deny = true;
        self
    }

    /// The next `count` requests fail constraint negotiation.
    pub fn rejecting_constraints(self, count: u32) -> Self {
        self.state.lock().rejected_constraints = count;
        self
    }

    /// Delay before a permission prompt resolves.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().latency = latency;
        self
    }

    pub fn probe(&self) -> CameraProbe {
        let state = self.state.lock();
        CameraProbe {
            requests: state.requests.clone(),
            started: state.started,
            stopped: state.stopped,
            active: state.active,
            max_active: state.max_active,
        }
    }
}

#[async_trait]
impl CameraBackend for SimCamera {
    async fn request_stream(
        &self,
        constraints: &CameraConstraints,
    ) -> std::result::Result<Box<dyn CameraStream>, CameraError> {
        let latency = {
            let mut state = self.state.lock();
            state.requests.push(*constraints);
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        if state.deny {
            return Err(CameraError::Denied);
        }
        if state.rejected_constraints > 0 {
            state.rejected_constraints -= 1;
            return Err(CameraError::ConstraintsUnsatisfied(
                "no camera matches facing mode".to_string(),
            ));
        }

        state.started += 1;
        state.active += 1;
        state.max_active = state.max_active.max(state.active);
        let id = state.started;
        Ok(Box::new(SimStream {
            id,
            stopped: false,
            state: self.state.clone(),
        }))
    }
}

struct SimStream {
    id: u32,
    stopped: bool,
    state: Arc<Mutex<CameraState>>,
}

impl CameraStream for SimStream {
    fn label(&self) -> String {
        format!("sim camera #{}", self.id)
    }

    fn stop_tracks(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let mut state = self.state.lock();
        state.stopped += 1;
        state.active = state.active.saturating_sub(1);
    }
}

/// Tracking backend whose engines report whatever marker poses are scripted.
#[derive(Debug, Clone, Default)]
pub struct SimTracker {
    state: Arc<Mutex<TrackerState>>,
}

#[derive(Debug, Default)]
struct TrackerState {
    failing_construction: Option<String>,
    candidates: Vec<Pose>,
    constructed: u32,
    created_urls: u32,
    revoked_urls: u32,
    live_urls: HashSet<String>,
    last_source: Option<DescriptorSource>,
    start_calls: u32,
    stop_calls: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerProbe {
    pub constructed: u32,
    pub created_urls: u32,
    pub revoked_urls: u32,
    pub live_urls: usize,
    pub last_source: Option<DescriptorSource>,
    pub start_calls: u32,
    pub stop_calls: u32,
}

impl SimTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_construction(self, reason: &str) -> Self {
        self.state.lock().failing_construction = Some(reason.to_string());
        self
    }

    pub fn show(&self, anchor: Pose) {
        self.state.lock().candidates = vec![anchor];
    }

    pub fn show_candidates(&self, anchors: Vec<Pose>) {
        self.state.lock().candidates = anchors;
    }

    pub fn hide(&self) {
        self.state.lock().candidates.clear();
    }

    pub fn probe(&self) -> TrackerProbe {
        let state = self.state.lock();
        TrackerProbe {
            constructed: state.constructed,
            created_urls: state.created_urls,
            revoked_urls: state.revoked_urls,
            live_urls: state.live_urls.len(),
            last_source: state.last_source.clone(),
            start_calls: state.start_calls,
            stop_calls: state.stop_calls,
        }
    }
}

impl TrackingBackend for SimTracker {
    fn construct(
        &self,
        source: &DescriptorSource,
        _surface_size: (u32, u32),
        _options: &TrackingOptions,
    ) -> std::result::Result<Box<dyn TrackingEngine>, String> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.failing_construction {
            return Err(reason.clone());
        }
        state.constructed += 1;
        state.last_source = Some(source.clone());
        Ok(Box::new(SimEngine {
            state: self.state.clone(),
            running: false,
        }))
    }

    fn create_object_url(&self, bytes: Arc<[u8]>) -> String {
        let mut state = self.state.lock();
        state.created_urls += 1;
        let url = format!("blob:sim/{}-{}", state.created_urls, bytes.len());
        state.live_urls.insert(url.clone());
        url
    }

    fn revoke_object_url(&self, url: &str) {
        let mut state = self.state.lock();
        if state.live_urls.remove(url) {
            state.revoked_urls += 1;
        }
    }
}

struct SimEngine {
    state: Arc<Mutex<TrackerState>>,
    running: bool,
}

impl TrackingEngine for SimEngine {
    fn start(&mut self, _stream: &dyn CameraStream) -> std::result::Result<(), String> {
        self.running = true;
        self.state.lock().start_calls += 1;
        Ok(())
    }

    fn is_camera_attached(&self) -> bool {
        self.running
    }

    fn detections(&mut self) -> Vec<Detection> {
        if !self.running {
            return Vec::new();
        }
        self.state
            .lock()
            .candidates
            .iter()
            .enumerate()
            .map(|(target_index, anchor)| Detection {
                target_index,
                anchor: *anchor,
            })
            .collect()
    }

    fn stop(&mut self) {
        self.state.lock().stop_calls += 1;
        self.running = false;
    }
}

/// Media factory whose elements share one scriptable playback state.
#[derive(Debug, Clone)]
pub struct SimMedia {
    state: Arc<Mutex<MediaState>>,
}

#[derive(Debug)]
struct MediaState {
    metadata_after: Option<Duration>,
    autoplay: bool,
    duration: f64,
    dimensions: (u32, u32),
    source: Option<String>,
    loaded_at: Option<tokio::time::Instant>,
    paused: bool,
    muted: bool,
    current_time: f64,
    play_calls: u32,
    pause_calls: u32,
    reloads: u32,
    created: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaProbe {
    pub source: Option<String>,
    pub paused: bool,
    pub muted: bool,
    pub current_time: f64,
    pub play_calls: u32,
    pub pause_calls: u32,
    pub reloads: u32,
    pub created: u32,
}

impl SimMedia {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MediaState {
                metadata_after: Some(Duration::ZERO),
                autoplay: true,
                duration: 30.0,
                dimensions: (1280, 720),
                source: None,
                loaded_at: None,
                paused: true,
                muted: false,
                current_time: 0.0,
                play_calls: 0,
                pause_calls: 0,
                reloads: 0,
                created: 0,
            })),
        }
    }

    pub fn with_metadata_after(self, delay: Duration) -> Self {
        self.state.lock().metadata_after = Some(delay);
        self
    }

    /// Metadata never arrives.
    pub fn never_loading(self) -> Self {
        self.state.lock().metadata_after = None;
        self
    }

    pub fn with_autoplay(self, allowed: bool) -> Self {
        self.set_autoplay(allowed);
        self
    }

    pub fn with_duration(self, seconds: f64) -> Self {
        self.state.lock().duration = seconds;
        self
    }

    pub fn with_dimensions(self, width: u32, height: u32) -> Self {
        self.state.lock().dimensions = (width, height);
        self
    }

    pub fn set_autoplay(&self, allowed: bool) {
        self.state.lock().autoplay = allowed;
    }

    /// Advances playback by `seconds` if playing. Reaching the end pauses.
    pub fn advance(&self, seconds: f64) {
        let mut state = self.state.lock();
        if state.paused || state.source.is_none() {
            return;
        }
        state.current_time += seconds;
        if state.current_time >= state.duration {
            state.current_time = state.duration;
            state.paused = true;
        }
    }

    pub fn probe(&self) -> MediaProbe {
        let state = self.state.lock();
        MediaProbe {
            source: state.source.clone(),
            paused: state.paused,
            muted: state.muted,
            current_time: state.current_time,
            play_calls: state.play_calls,
            pause_calls: state.pause_calls,
            reloads: state.reloads,
            created: state.created,
        }
    }
}

impl Default for SimMedia {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaFactory for SimMedia {
    fn create_element(&self) -> Box<dyn MediaElement> {
        let mut state = self.state.lock();
        state.created += 1;
        // Elements start from a blank slate, like a freshly created <video>.
        state.source = None;
        state.loaded_at = None;
        state.paused = true;
        state.current_time = 0.0;
        Box::new(SimMediaElement {
            state: self.state.clone(),
        })
    }
}

struct SimMediaElement {
    state: Arc<Mutex<MediaState>>,
}

impl MediaElement for SimMediaElement {
    fn set_source(&mut self, url: &str) {
        let mut state = self.state.lock();
        state.source = Some(url.to_string());
        state.loaded_at = Some(tokio::time::Instant::now());
        state.current_time = 0.0;
        state.paused = true;
    }

    fn clear_source(&mut self) {
        let mut state = self.state.lock();
        state.source = None;
        state.loaded_at = None;
    }

    fn reload(&mut self) {
        let mut state = self.state.lock();
        state.reloads += 1;
        state.current_time = 0.0;
    }

    fn has_metadata(&self) -> bool {
        let state = self.state.lock();
        match (state.loaded_at, state.metadata_after) {
            (Some(loaded_at), Some(delay)) => tokio::time::Instant::now() >= loaded_at + delay,
            _ => false,
        }
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        let state = self.state.lock();
        state.source.as_ref().map(|_| state.dimensions)
    }

    fn duration(&self) -> Option<f64> {
        let state = self.state.lock();
        state.source.as_ref().map(|_| state.duration)
    }

    fn play(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.play_calls += 1;
        if state.source.is_none() {
            return Err(OverlayError::msg("no media source"));
        }
        if !state.autoplay {
            return Err(OverlayError::AutoplayRejected(
                "user gesture required".to_string(),
            ));
        }
        state.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        let mut state = self.state.lock();
        state.pause_calls += 1;
        state.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn has_ended(&self) -> bool {
        let state = self.state.lock();
        state.source.is_some() && state.current_time >= state.duration
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn set_current_time(&mut self, seconds: f64) {
        let mut state = self.state.lock();
        state.current_time = seconds.min(state.duration);
    }

    fn set_muted(&mut self, muted: bool) {
        self.state.lock().muted = muted;
    }
}

/// Every simulator wired together, plus the [`Backends`] bundle built from them.
#[derive(Debug, Clone)]
pub struct SimRig {
    pub surface: SimSurface,
    pub camera: SimCamera,
    pub tracker: SimTracker,
    pub media: SimMedia,
}

impl SimRig {
    pub fn new() -> Self {
        Self {
            surface: SimSurface::new(1280, 720),
            camera: SimCamera::new(),
            tracker: SimTracker::new(),
            media: SimMedia::new(),
        }
    }

    pub fn backends(&self) -> Backends {
        Backends {
            surface: Arc::new(self.surface.clone()),
            camera: Arc::new(self.camera.clone()),
            tracking: Arc::new(self.tracker.clone()),
            media: Arc::new(self.media.clone()),
        }
    }
}

impl Default for SimRig {
    fn default() -> Self {
        Self::new()
    }
}
