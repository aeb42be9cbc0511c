use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    config::VideoConfig,
    diagnostics::Diagnostics,
    resources::{ResourceHandle, ResourceKind, ResourceRegistry},
    wait::wait_until,
    OverlayError, Result,
};

/// Platform media element, e.g. an HTML `<video>` or a native decoder session.
pub trait MediaElement: Send {
    fn set_source(&mut self, url: &str);
    fn clear_source(&mut self);
    /// Forces the element to drop decoder state for the current source.
    fn reload(&mut self);
    fn has_metadata(&self) -> bool;
    fn dimensions(&self) -> Option<(u32, u32)>;
    fn duration(&self) -> Option<f64>;
    /// Starts playback. Rejections from the autoplay policy surface as
    /// [`OverlayError::AutoplayRejected`].
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn has_ended(&self) -> bool;
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64);
    fn set_muted(&mut self, muted: bool);
}

/// Creates media elements on demand.
pub trait MediaFactory: Send + Sync {
    fn create_element(&self) -> Box<dyn MediaElement>;
}

pub type SharedElement = Arc<Mutex<Box<dyn MediaElement>>>;

/// Video texture whose contents do not refresh on their own.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VideoTexture {
    needs_update: bool,
    versions: u64,
}

impl VideoTexture {
    pub fn mark_needs_update(&mut self) {
        self.needs_update = true;
        self.versions += 1;
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Consumes the pending flag, returning whether an upload is due.
    pub fn take_needs_update(&mut self) -> bool {
        std::mem::take(&mut self.needs_update)
    }

    pub fn versions(&self) -> u64 {
        self.versions
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoState {
    pub muted: bool,
    pub playing: bool,
    pub current_time: f64,
    /// Position recorded the last time the marker was lost.
    pub checkpoint: Option<f64>,
}

/// What the animation driver needs from playback.
pub trait Playback {
    fn is_paused(&self) -> bool;
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn checkpoint(&mut self) -> f64;
}

/// Owns one media element: loading, priming, transport controls, looping and
/// the per-frame texture refresh.
pub struct VideoPlayer {
    element: SharedElement,
    texture: VideoTexture,
    state: VideoState,
    config: VideoConfig,
    diagnostics: Diagnostics,
    handle: Option<ResourceHandle>,
}

impl VideoPlayer {
    pub fn new(element: Box<dyn MediaElement>, config: VideoConfig, diagnostics: Diagnostics) -> Self {
        Self {
            element: Arc::new(Mutex::new(element)),
            texture: VideoTexture::default(),
            state: VideoState {
                muted: config.start_muted,
                ..Default::default()
            },
            config,
            diagnostics,
            handle: None,
        }
    }

    /// Hands teardown of the element to `registry`.
    pub fn register(&mut self, registry: &ResourceRegistry) {
        if self.handle.is_some() {
            return;
        }
        let element = self.element.clone();
        self.handle = Some(registry.register(
            ResourceKind::VideoElement,
            "video element",
            move || release_element(&mut **element.lock()),
        ));
    }

    /// Loads `url` and waits for its metadata. On timeout the element is
    /// paused and emptied before the error is returned.
    pub async fn load(&mut self, url: &str) -> Result<()> {
        {
            let mut element = self.element.lock();
            element.set_muted(self.state.muted);
            element.set_source(url);
        }
        self.diagnostics.info(format!("loading video {url}"));

        let element = self.element.clone();
        let arrived = wait_until(
            move || element.lock().has_metadata(),
            self.config.load_timeout(),
            self.config.metadata_poll(),
        )
        .await;

        if !arrived {
            release_element(&mut **self.element.lock());
            self.state.playing = false;
            self.diagnostics
                .error(format!("video metadata timed out after {} ms", self.config.load_timeout_ms));
            return Err(OverlayError::MediaLoadTimeout {
                timeout_ms: self.config.load_timeout_ms,
            });
        }

        let (dimensions, duration) = {
            let element = self.element.lock();
            (element.dimensions(), element.duration())
        };
        self.diagnostics.info(format!(
            "video metadata loaded: {dimensions:?}, {:.1}s",
            duration.unwrap_or_default()
        ));

        if self.config.prime_decoder {
            self.prime();
        }
        Ok(())
    }

    /// Play-then-pause so the decoder produces a first frame for the texture.
    fn prime(&mut self) {
        let mut element = self.element.lock();
        match element.play() {
            Ok(()) => {
                element.pause();
                self.diagnostics.debug("video decoder primed");
            }
            Err(err) => self.diagnostics.warn(format!("video priming failed: {err}")),
        }
    }

    pub fn pause(&mut self) {
        self.element.lock().pause();
        if self.state.playing {
            self.diagnostics.info("video paused");
        }
        self.state.playing = false;
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.element.lock().set_muted(muted);
        self.state.muted = muted;
        self.diagnostics
            .info(if muted { "video muted" } else { "video unmuted" });
    }

    /// Flips the mute state and returns the new value.
    pub fn toggle_mute(&mut self) -> bool {
        let muted = !self.state.muted;
        self.set_muted(muted);
        muted
    }

    pub fn seek(&mut self, seconds: f64) {
        self.element.lock().set_current_time(seconds.max(0.0));
        self.state.current_time = seconds.max(0.0);
    }

    /// Per-frame upkeep: loops ended media and flags the texture while playing.
    pub fn update_texture(&mut self) {
        let mut element = self.element.lock();
        if self.config.loop_playback && element.has_ended() {
            element.set_current_time(0.0);
            if let Err(err) = element.play() {
                self.diagnostics.warn(format!("video loop restart failed: {err}"));
            }
        }

        self.state.current_time = element.current_time();
        self.state.playing = !element.is_paused();
        if self.state.playing {
            self.texture.mark_needs_update();
        }
    }

    /// Pauses and empties the element so the decoder is freed. Idempotent.
    pub fn release(&mut self) {
        release_element(&mut **self.element.lock());
        self.state.playing = false;
    }

    pub fn texture(&self) -> &VideoTexture {
        &self.texture
    }

    pub fn texture_mut(&mut self) -> &mut VideoTexture {
        &mut self.texture
    }

    pub fn state(&self) -> &VideoState {
        &self.state
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.element.lock().dimensions()
    }

    pub fn duration(&self) -> Option<f64> {
        self.element.lock().duration()
    }
}

impl Playback for VideoPlayer {
    fn is_paused(&self) -> bool {
        self.element.lock().is_paused()
    }

    fn play(&mut self) -> Result<()> {
        let result = self.element.lock().play();
        match &result {
            Ok(()) => {
                self.state.playing = true;
                self.diagnostics.info("video playing");
            }
            Err(err) => {
                self.state.playing = false;
                self.diagnostics.warn(format!("video play rejected: {err}"));
            }
        }
        result
    }

    fn pause(&mut self) {
        VideoPlayer::pause(self);
    }

    fn checkpoint(&mut self) -> f64 {
        let time = self.element.lock().current_time();
        self.state.current_time = time;
        self.state.checkpoint = Some(time);
        self.diagnostics.debug(format!("video checkpoint at {time:.2}s"));
        time
    }
}

impl std::fmt::Debug for VideoPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoPlayer")
            .field("state", &self.state)
            .field("texture", &self.texture)
            .field("registered", &self.handle.is_some())
            .finish()
    }
}

fn release_element(element: &mut dyn MediaElement) {
    element.pause();
    element.clear_source();
    element.reload();
}
