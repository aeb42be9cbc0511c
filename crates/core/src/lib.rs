//! Core library for marker-anchored video overlays.
//!
//! A printed marker is tracked through the camera feed and a video "standee"
//! grows out of it, faces the viewer and plays while the marker stays in view.
//! Platform services (camera, tracking engine, media decoding, GPU) sit behind
//! traits; [`sim`] provides deterministic in-process implementations used by
//! the tests and the command line simulator.

pub mod analytics;
pub mod animation;
pub mod config;
pub mod diagnostics;
pub mod easing;
pub mod error;
pub mod render;
pub mod resources;
pub mod scene;
pub mod session;
pub mod sim;
pub mod timeline;
pub mod tracking;
pub mod video;
pub mod wait;

pub use glam;

pub use analytics::{AnalyticsHook, PlaybackAnalytics, PlaybackEvent, ViewerContext};
pub use animation::{EntranceParams, FrameState, OverlayDriver, OverlayPhase, Transition};
pub use config::{AnimationConfig, OverlayConfig, RetryConfig, TrackingConfig, VideoConfig};
pub use diagnostics::{DebugEvent, DebugLevel, DebugSink, Diagnostics};
pub use error::{OverlayError, Result};
pub use render::{OverlayScene, RenderSurface, Renderer};
pub use resources::{ResourceHandle, ResourceKind, ResourceRegistry};
pub use scene::{NodeTransform, OverlayNode, Pose};
pub use session::{
    Backends, FrameSnapshot, OverlayCallbacks, OverlaySession, OverlaySource, OverlayStatus,
    StateFlag,
};
pub use timeline::{AnimationTimeline, FrameClock};
pub use tracking::{MarkerTrackingSession, TrackingDescriptor, TrackingOptions};
pub use video::{Playback, VideoPlayer};
