//! Public lifecycle API for one overlay instance.
//!
//! [`OverlaySession`] is a cheap clonable handle. Lifecycle operations
//! (`initialize`, `start_scanning`, `stop_scanning`, `restart`, `cleanup`) are
//! async and serialised by an async mutex; [`OverlaySession::render_frame`] is
//! the synchronous per-frame callback and never waits on them. While lifecycle
//! work holds the runtime the frame is simply skipped.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    analytics::{AnalyticsHook, PlaybackAnalytics, PlaybackEvent, ViewerContext},
    animation::{EntranceParams, OverlayDriver, OverlayPhase, Transition},
    config::OverlayConfig,
    diagnostics::{DebugSink, Diagnostics},
    render::{OverlayScene, RenderSurface, Renderer},
    resources::ResourceRegistry,
    scene::{NodeTransform, OverlayNode, Pose},
    tracking::{
        CameraBackend, MarkerTrackingSession, TrackingBackend, TrackingDescriptor, TrackingOptions,
    },
    video::{MediaFactory, Playback, VideoPlayer, VideoState},
    wait::{backoff_delay, CancelTicket, Generation},
    OverlayError, Result,
};

/// Platform collaborators the session is built from.
#[derive(Clone)]
pub struct Backends {
    pub surface: Arc<dyn RenderSurface>,
    pub camera: Arc<dyn CameraBackend>,
    pub tracking: Arc<dyn TrackingBackend>,
    pub media: Arc<dyn MediaFactory>,
}

/// Content the overlay shows.
#[derive(Debug, Clone)]
pub struct OverlaySource {
    pub descriptor: Option<TrackingDescriptor>,
    pub video_url: String,
    pub viewer: ViewerContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateFlag {
    CameraActive,
    OverlayReady,
    Initialized,
    Scanning,
    TargetDetected,
    VideoPlaying,
    VideoMuted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayStatus {
    pub camera_active: bool,
    pub overlay_ready: bool,
    pub initialized: bool,
    pub scanning: bool,
    pub target_detected: bool,
    pub video_playing: bool,
    pub video_muted: bool,
}

impl OverlayStatus {
    pub fn get(&self, flag: StateFlag) -> bool {
        match flag {
            StateFlag::CameraActive => self.camera_active,
            StateFlag::OverlayReady => self.overlay_ready,
            StateFlag::Initialized => self.initialized,
            StateFlag::Scanning => self.scanning,
            StateFlag::TargetDetected => self.target_detected,
            StateFlag::VideoPlaying => self.video_playing,
            StateFlag::VideoMuted => self.video_muted,
        }
    }

    fn slot_mut(&mut self, flag: StateFlag) -> &mut bool {
        match flag {
            StateFlag::CameraActive => &mut self.camera_active,
            StateFlag::OverlayReady => &mut self.overlay_ready,
            StateFlag::Initialized => &mut self.initialized,
            StateFlag::Scanning => &mut self.scanning,
            StateFlag::TargetDetected => &mut self.target_detected,
            StateFlag::VideoPlaying => &mut self.video_playing,
            StateFlag::VideoMuted => &mut self.video_muted,
        }
    }
}

pub type ErrorReporter = Arc<dyn Fn(&str) + Send + Sync>;
pub type StateSetter = Arc<dyn Fn(StateFlag, bool) + Send + Sync>;

/// Hooks the surrounding application provides.
#[derive(Clone, Default)]
pub struct OverlayCallbacks {
    pub on_error: Option<ErrorReporter>,
    pub on_debug: Option<DebugSink>,
    pub on_state: Option<StateSetter>,
    pub on_first_playback: Option<AnalyticsHook>,
}

/// Status flags plus change notification; setters only fire on change.
///
/// Changes are queued and handed to the setter by [`StatusBoard::flush`], which
/// the session calls once it holds no locks.
struct StatusBoard {
    status: Mutex<OverlayStatus>,
    setter: Option<StateSetter>,
    pending: Mutex<Vec<(StateFlag, bool)>>,
}

impl StatusBoard {
    fn new(setter: Option<StateSetter>) -> Self {
        Self {
            status: Mutex::new(OverlayStatus::default()),
            setter,
            pending: Mutex::new(Vec::new()),
        }
    }

    fn get(&self, flag: StateFlag) -> bool {
        self.status.lock().get(flag)
    }

    fn set(&self, flag: StateFlag, value: bool) {
        let changed = {
            let mut status = self.status.lock();
            let slot = status.slot_mut(flag);
            let changed = *slot != value;
            *slot = value;
            changed
        };
        if changed && self.setter.is_some() {
            self.pending.lock().push((flag, value));
        }
    }

    fn flush(&self) {
        let Some(setter) = &self.setter else {
            return;
        };
        let changes = std::mem::take(&mut *self.pending.lock());
        for (flag, value) in changes {
            setter(flag, value);
        }
    }
}

/// User-facing transport controls, applied inside the next rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Play,
    Pause,
    ToggleMute,
}

/// What one rendered frame produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSnapshot {
    pub phase: OverlayPhase,
    pub visible: bool,
    pub scale: f32,
    pub rise: f32,
    pub yaw: f32,
    pub opacity: f32,
    /// Marker pose seen this frame, `None` while the marker is out of view.
    pub anchor: Option<Pose>,
    /// Transform handed to the renderer for the standee.
    pub transform: NodeTransform,
}

/// Everything that exists between a successful initialisation and teardown.
struct Runtime {
    registry: Arc<ResourceRegistry>,
    tracking: MarkerTrackingSession,
    video: VideoPlayer,
    node: OverlayNode,
    renderer: Arc<dyn Renderer>,
    scene: OverlayScene,
    driver: OverlayDriver,
    /// Last marker pose, kept so a fading standee stays where it was.
    last_anchor: Option<Pose>,
}

impl Runtime {
    /// Releases every registered resource in teardown order. The tracking
    /// engine comes first, which also halts detection.
    fn teardown(&mut self) {
        self.registry.release_all();
        self.tracking.dispose();
    }
}

/// Holds a runtime taken out of its slot for async work and puts it back when
/// dropped, including when the future doing the work is cancelled.
struct LentRuntime<'a> {
    slot: &'a Mutex<Option<Runtime>>,
    runtime: Option<Runtime>,
}

impl<'a> LentRuntime<'a> {
    fn take(slot: &'a Mutex<Option<Runtime>>) -> Option<Self> {
        let runtime = slot.lock().take()?;
        Some(Self {
            slot,
            runtime: Some(runtime),
        })
    }

    fn get_mut(&mut self) -> Option<&mut Runtime> {
        self.runtime.as_mut()
    }
}

impl Drop for LentRuntime<'_> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            *self.slot.lock() = Some(runtime);
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct Inner {
    config: OverlayConfig,
    source: OverlaySource,
    backends: Backends,
    diagnostics: Diagnostics,
    on_error: Option<ErrorReporter>,
    status: Arc<StatusBoard>,
    analytics: PlaybackAnalytics,
    lifecycle: tokio::sync::Mutex<()>,
    runtime: Mutex<Option<Runtime>>,
    render_installed: AtomicBool,
    restarting: AtomicBool,
    generation: Generation,
    commands: Mutex<VecDeque<UserCommand>>,
}

#[derive(Clone)]
pub struct OverlaySession {
    inner: Arc<Inner>,
}

impl OverlaySession {
    pub fn new(
        config: OverlayConfig,
        source: OverlaySource,
        backends: Backends,
        callbacks: OverlayCallbacks,
    ) -> Self {
        let analytics = PlaybackAnalytics::new(callbacks.on_first_playback, source.viewer.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                source,
                backends,
                diagnostics: Diagnostics::deferred(callbacks.on_debug),
                on_error: callbacks.on_error,
                status: Arc::new(StatusBoard::new(callbacks.on_state)),
                analytics,
                lifecycle: tokio::sync::Mutex::new(()),
                runtime: Mutex::new(None),
                render_installed: AtomicBool::new(false),
                restarting: AtomicBool::new(false),
                generation: Generation::new(),
                commands: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.inner.config
    }

    pub fn status(&self) -> OverlayStatus {
        *self.inner.status.status.lock()
    }

    pub fn is_render_installed(&self) -> bool {
        self.inner.render_installed.load(Ordering::Acquire)
    }

    /// Current animation phase, or `None` before initialisation.
    pub fn phase(&self) -> Option<OverlayPhase> {
        self.inner
            .runtime
            .lock()
            .as_ref()
            .map(|runtime| runtime.driver.phase())
    }

    pub fn video_state(&self) -> Option<VideoState> {
        self.inner
            .runtime
            .lock()
            .as_ref()
            .map(|runtime| runtime.video.state().clone())
    }

    /// Number of native resources currently held.
    pub fn live_resources(&self) -> usize {
        self.inner
            .runtime
            .lock()
            .as_ref()
            .map(|runtime| runtime.registry.live_count())
            .unwrap_or(0)
    }

    /// Unscaled `(width, height)` of the standee plane once initialised.
    pub fn node_size(&self) -> Option<(f32, f32)> {
        self.inner
            .runtime
            .lock()
            .as_ref()
            .map(|runtime| runtime.node.size())
    }

    /// Hands queued state changes and debug events to the host callbacks.
    /// Runs after every public operation, once no session lock is held.
    fn flush_host_events(&self) {
        self.inner.status.flush();
        self.inner.diagnostics.flush();
    }

    pub async fn initialize(&self) -> Result<()> {
        self.initialize_with_retry(0, self.inner.config.retry.max_retries)
            .await
    }

    /// Builds the tracking session, video and overlay node. A zero-sized
    /// surface is retried with capped exponential backoff; everything else
    /// fails once and is reported. A no-op if already initialised.
    pub async fn initialize_with_retry(&self, retry_count: u32, max_retries: u32) -> Result<()> {
        let ticket = self.inner.generation.ticket();
        let result = {
            let _lifecycle = self.inner.lifecycle.lock().await;
            self.initialize_locked(retry_count, max_retries, &ticket)
                .await
        };
        self.flush_host_events();
        result
    }

    async fn initialize_locked(
        &self,
        retry_count: u32,
        max_retries: u32,
        ticket: &CancelTicket,
    ) -> Result<()> {
        let retry = &self.inner.config.retry;
        let mut attempt = retry_count;

        loop {
            if self.inner.runtime.lock().is_some() {
                self.inner.diagnostics.debug("overlay already initialised");
                return Ok(());
            }
            ticket.check()?;

            match self.build_runtime(ticket).await {
                Ok(runtime) => {
                    self.install(runtime);
                    return Ok(());
                }
                Err(OverlayError::SurfaceNotReady) if attempt < max_retries => {
                    let delay = backoff_delay(attempt, retry.base_delay(), retry.max_delay());
                    attempt += 1;
                    self.inner.diagnostics.warn(format!(
                        "render surface not ready, retry {attempt}/{max_retries} in {} ms",
                        delay.as_millis()
                    ));
                    self.flush_host_events();
                    tokio::time::sleep(delay).await;
                }
                Err(OverlayError::Superseded) => {
                    self.inner
                        .diagnostics
                        .debug("discarding superseded initialisation");
                    return Err(OverlayError::Superseded);
                }
                Err(err) => return Err(self.fail(err)),
            }
        }
    }

    async fn build_runtime(&self, ticket: &CancelTicket) -> Result<Runtime> {
        let descriptor = match &self.inner.source.descriptor {
            Some(descriptor @ TrackingDescriptor::Binary(_)) => descriptor.clone(),
            Some(TrackingDescriptor::Image { .. }) => {
                self.inner
                    .diagnostics
                    .warn("image-only targets are not tracked without a precompiled descriptor");
                return Err(OverlayError::TrackingDescriptorMissing);
            }
            None => return Err(OverlayError::TrackingDescriptorMissing),
        };

        let registry = Arc::new(ResourceRegistry::new());
        let result = self.assemble(descriptor, registry.clone(), ticket).await;
        if result.is_err() {
            registry.release_all();
        }
        result
    }

    async fn assemble(
        &self,
        descriptor: TrackingDescriptor,
        registry: Arc<ResourceRegistry>,
        ticket: &CancelTicket,
    ) -> Result<Runtime> {
        let inner = &self.inner;
        let mut tracking = MarkerTrackingSession::initialize(
            descriptor,
            inner.backends.surface.as_ref(),
            inner.backends.tracking.clone(),
            inner.backends.camera.clone(),
            TrackingOptions::from_config(&inner.config.tracking),
            inner.config.retry.clone(),
            registry.clone(),
            inner.diagnostics.clone(),
        )?;
        let status = inner.status.clone();
        tracking.on_visibility_change(move |visible, _| status.set(StateFlag::TargetDetected, visible));

        let mut video = VideoPlayer::new(
            inner.backends.media.create_element(),
            inner.config.video.clone(),
            inner.diagnostics.clone(),
        );
        video.register(&registry);
        video.load(&inner.source.video_url).await?;
        ticket.check()?;

        let (width, height) = video.dimensions().unwrap_or((16, 9));
        let node = OverlayNode::for_video(width, height, inner.config.animation.marker_width);
        let renderer = inner.backends.surface.create_renderer()?;
        let scene = OverlayScene::build(renderer.clone(), &node, &registry);
        let driver = OverlayDriver::new(EntranceParams::for_node(&node, &inner.config.animation));

        Ok(Runtime {
            registry,
            tracking,
            video,
            node,
            renderer,
            scene,
            driver,
            last_anchor: None,
        })
    }

    fn install(&self, runtime: Runtime) {
        let muted = runtime.video.state().muted;
        *self.inner.runtime.lock() = Some(runtime);

        let status = &self.inner.status;
        status.set(StateFlag::Initialized, true);
        status.set(StateFlag::OverlayReady, true);
        status.set(StateFlag::VideoMuted, muted);
        self.inner.diagnostics.info("overlay initialised");
    }

    /// Logs `err` and hands its user-facing message to the error reporter once.
    fn fail(&self, err: OverlayError) -> OverlayError {
        let err = match err {
            OverlayError::Message(_) | OverlayError::Io(_) | OverlayError::Json(_) => {
                OverlayError::Initialization(err.to_string())
            }
            other => other,
        };
        if matches!(err, OverlayError::Superseded) {
            return err;
        }

        self.inner.diagnostics.error(err.to_string());
        if let Some(report) = &self.inner.on_error {
            report(&err.user_message());
        }
        err
    }

    /// Acquires the camera and installs the render callback.
    pub async fn start_scanning(&self) -> Result<()> {
        let result = {
            let _lifecycle = self.inner.lifecycle.lock().await;
            self.start_locked().await
        };
        self.flush_host_events();
        result
    }

    async fn start_locked(&self) -> Result<()> {
        if self.inner.status.get(StateFlag::Scanning) {
            self.inner.diagnostics.debug("already scanning");
            return Ok(());
        }

        let Some(mut lent) = LentRuntime::take(&self.inner.runtime) else {
            self.inner
                .diagnostics
                .warn("cannot start scanning before initialisation");
            return Err(OverlayError::NotInitialized);
        };

        let result = match lent.get_mut() {
            Some(runtime) => runtime.tracking.start().await,
            None => Err(OverlayError::NotInitialized),
        };
        drop(lent);

        match result {
            Ok(()) => {
                self.inner.render_installed.store(true, Ordering::Release);
                self.inner.status.set(StateFlag::CameraActive, true);
                self.inner.status.set(StateFlag::Scanning, true);
                self.inner.diagnostics.info("scanning started");
                Ok(())
            }
            Err(err) => {
                self.inner.status.set(StateFlag::CameraActive, false);
                Err(self.fail(err))
            }
        }
    }

    /// Removes the render callback, hides the overlay and releases the camera.
    pub async fn stop_scanning(&self) -> Result<()> {
        {
            let _lifecycle = self.inner.lifecycle.lock().await;
            self.stop_locked();
        }
        self.flush_host_events();
        Ok(())
    }

    fn stop_locked(&self) {
        if !self.inner.status.get(StateFlag::Scanning) {
            return;
        }
        self.inner.render_installed.store(false, Ordering::Release);

        if let Some(runtime) = self.inner.runtime.lock().as_mut() {
            runtime.driver.hide(&mut runtime.node, &mut runtime.video);
            runtime.tracking.stop();
        }

        let status = &self.inner.status;
        status.set(StateFlag::Scanning, false);
        status.set(StateFlag::CameraActive, false);
        status.set(StateFlag::TargetDetected, false);
        status.set(StateFlag::VideoPlaying, false);
        self.inner.diagnostics.info("scanning stopped");
    }

    /// Releases every resource. Safe to call repeatedly or before initialisation.
    pub async fn dispose(&self) {
        {
            let _lifecycle = self.inner.lifecycle.lock().await;
            self.dispose_locked();
        }
        self.flush_host_events();
    }

    fn dispose_locked(&self) {
        self.inner.render_installed.store(false, Ordering::Release);
        let runtime = self.inner.runtime.lock().take();
        if let Some(mut runtime) = runtime {
            runtime.teardown();
            self.inner.diagnostics.info("overlay disposed");
        }
        self.inner.commands.lock().clear();

        let status = &self.inner.status;
        for flag in [
            StateFlag::Scanning,
            StateFlag::CameraActive,
            StateFlag::TargetDetected,
            StateFlag::VideoPlaying,
            StateFlag::OverlayReady,
            StateFlag::Initialized,
        ] {
            status.set(flag, false);
        }
    }

    /// Unmount hook: cancels in-flight initialisation, then disposes.
    pub async fn cleanup(&self) {
        self.inner.generation.advance();
        self.dispose().await;
    }

    /// Full stop → dispose → initialise → start. Calls made while a restart
    /// is already running return immediately.
    pub async fn restart(&self) -> Result<()> {
        if self.inner.restarting.swap(true, Ordering::AcqRel) {
            self.inner.diagnostics.debug("restart already in progress");
            return Ok(());
        }
        let _restarting = RestartGuard(&self.inner.restarting);

        self.inner.generation.advance();
        let ticket = self.inner.generation.ticket();
        let result = self.restart_locked(&ticket).await;
        self.flush_host_events();
        result
    }

    async fn restart_locked(&self, ticket: &CancelTicket) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.diagnostics.info("restarting overlay");

        self.stop_locked();
        self.dispose_locked();
        self.initialize_locked(0, self.inner.config.retry.max_retries, ticket)
            .await?;
        self.start_locked().await
    }

    pub fn request_play(&self) {
        self.inner.commands.lock().push_back(UserCommand::Play);
    }

    pub fn request_pause(&self) {
        self.inner.commands.lock().push_back(UserCommand::Pause);
    }

    pub fn toggle_mute(&self) {
        self.inner.commands.lock().push_back(UserCommand::ToggleMute);
    }

    /// Per-frame callback. Never blocks: returns `None` when the render
    /// callback is not installed or lifecycle work currently owns the runtime.
    pub fn render_frame(&self, now_ms: f64, camera: &Pose) -> Option<FrameSnapshot> {
        if !self.is_render_installed() {
            return None;
        }
        let mut played = Vec::new();
        let snapshot = {
            let mut guard = self.inner.runtime.try_lock()?;
            let runtime = guard.as_mut()?;
            self.advance(runtime, now_ms, camera, &mut played)
        };

        for event in &played {
            self.inner.analytics.deliver(event);
        }
        self.flush_host_events();
        Some(snapshot)
    }

    fn advance(
        &self,
        runtime: &mut Runtime,
        now_ms: f64,
        camera: &Pose,
        played: &mut Vec<PlaybackEvent>,
    ) -> FrameSnapshot {
        let commands: Vec<UserCommand> = self.inner.commands.lock().drain(..).collect();
        for command in commands {
            played.extend(self.apply_command(runtime, command));
        }

        let anchor = runtime.tracking.poll_frame();
        let report = runtime.driver.tick(
            now_ms,
            anchor.as_ref(),
            camera,
            &mut runtime.node,
            &mut runtime.video,
        );
        if report.has(Transition::Acquired) {
            self.inner.diagnostics.debug("marker acquired");
        }
        if report.has(Transition::Lost) {
            self.inner.diagnostics.debug("marker lost");
        }
        if let Some(result) = report.playback {
            played.extend(self.on_play_result(runtime, result));
        }

        if anchor.is_some() {
            runtime.last_anchor = anchor;
        }
        let transform = runtime
            .node
            .world_transform(&runtime.last_anchor.unwrap_or_default());
        runtime.scene.sync_node(runtime.renderer.as_ref(), &transform);

        runtime.video.update_texture();
        self.inner
            .status
            .set(StateFlag::VideoPlaying, runtime.video.state().playing);
        if let Err(err) = runtime
            .scene
            .sync_texture(runtime.renderer.as_ref(), runtime.video.texture_mut())
        {
            self.inner
                .diagnostics
                .warn(format!("skipping texture update this frame: {err}"));
        }

        FrameSnapshot {
            phase: runtime.driver.phase(),
            visible: runtime.node.visible,
            scale: runtime.node.animated.scale,
            rise: runtime.node.animated.rise,
            yaw: runtime.node.animated.yaw,
            opacity: runtime.node.animated.opacity,
            anchor,
            transform,
        }
    }

    fn apply_command(&self, runtime: &mut Runtime, command: UserCommand) -> Option<PlaybackEvent> {
        match command {
            UserCommand::Play => {
                let result = runtime.video.play();
                self.on_play_result(runtime, result)
            }
            UserCommand::Pause => {
                runtime.video.pause();
                self.inner.status.set(StateFlag::VideoPlaying, false);
                None
            }
            UserCommand::ToggleMute => {
                let muted = runtime.video.toggle_mute();
                self.inner.status.set(StateFlag::VideoMuted, muted);
                None
            }
        }
    }

    /// Updates the playing flag and claims the first-playback event, which the
    /// caller delivers once the runtime is released.
    fn on_play_result(&self, runtime: &Runtime, result: Result<()>) -> Option<PlaybackEvent> {
        match result {
            Ok(()) => {
                self.inner.status.set(StateFlag::VideoPlaying, true);
                self.inner
                    .analytics
                    .claim_first_playback(runtime.video.duration())
            }
            Err(err) => {
                self.inner.status.set(StateFlag::VideoPlaying, false);
                self.inner
                    .diagnostics
                    .warn(format!("playback needs a tap to start: {err}"));
                None
            }
        }
    }
}

impl std::fmt::Debug for OverlaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlaySession")
            .field("status", &self.status())
            .field("render_installed", &self.is_render_installed())
            .finish()
    }
}

struct RestartGuard<'a>(&'a AtomicBool);

impl Drop for RestartGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_setter_fires_only_on_change() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let board = StatusBoard::new(Some(Arc::new(move |flag: StateFlag, value: bool| {
            sink.lock().push((flag, value))
        })));

        board.set(StateFlag::Scanning, true);
        board.set(StateFlag::Scanning, true);
        board.set(StateFlag::VideoMuted, false);
        board.set(StateFlag::Scanning, false);
        board.flush();

        assert_eq!(
            *seen.lock(),
            vec![(StateFlag::Scanning, true), (StateFlag::Scanning, false)]
        );
        assert!(!board.get(StateFlag::Scanning));
    }

    #[test]
    fn status_changes_wait_for_flush() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let board = StatusBoard::new(Some(Arc::new(move |flag: StateFlag, value: bool| {
            sink.lock().push((flag, value))
        })));

        board.set(StateFlag::TargetDetected, true);
        assert!(board.get(StateFlag::TargetDetected));
        assert!(seen.lock().is_empty());

        board.flush();
        board.flush();
        assert_eq!(*seen.lock(), vec![(StateFlag::TargetDetected, true)]);
    }

    #[test]
    fn status_flags_map_to_fields() {
        let mut status = OverlayStatus::default();
        *status.slot_mut(StateFlag::TargetDetected) = true;
        assert!(status.target_detected);
        assert!(status.get(StateFlag::TargetDetected));
        assert!(!status.get(StateFlag::CameraActive));
    }
}
