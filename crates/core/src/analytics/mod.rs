use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const FIRST_PLAYBACK_EVENT: &str = "video_play";

/// Payload handed to the analytics hook on first playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackEvent {
    pub source: String,
    pub video_progress: f64,
    pub video_duration: Option<f64>,
}

pub type AnalyticsHook = Arc<dyn Fn(&PlaybackEvent) + Send + Sync>;

/// Who is watching what; combined with the event type into the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerContext {
    pub viewer_id: String,
    pub content_id: String,
    pub source: String,
}

impl Default for ViewerContext {
    fn default() -> Self {
        Self {
            viewer_id: "anonymous".to_string(),
            content_id: String::new(),
            source: "ar".to_string(),
        }
    }
}

/// Reports first playback once per logical viewing session.
#[derive(Clone, Default)]
pub struct PlaybackAnalytics {
    hook: Option<AnalyticsHook>,
    context: ViewerContext,
    seen: Arc<Mutex<HashSet<String>>>,
}

impl PlaybackAnalytics {
    pub fn new(hook: Option<AnalyticsHook>, context: ViewerContext) -> Self {
        Self {
            hook,
            context,
            seen: Arc::default(),
        }
    }

    pub fn dedup_key(&self, event_type: &str) -> String {
        format!(
            "{event_type}:{}:{}",
            self.context.viewer_id, self.context.content_id
        )
    }

    /// Marks first playback as seen and returns the event to hand to the hook,
    /// or `None` if it was already reported or nobody is listening.
    pub fn claim_first_playback(&self, video_duration: Option<f64>) -> Option<PlaybackEvent> {
        self.hook.as_ref()?;
        if !self.seen.lock().insert(self.dedup_key(FIRST_PLAYBACK_EVENT)) {
            return None;
        }

        tracing::debug!(
            viewer = %self.context.viewer_id,
            content = %self.context.content_id,
            "recording first playback"
        );
        Some(PlaybackEvent {
            source: self.context.source.clone(),
            video_progress: 0.0,
            video_duration,
        })
    }

    pub fn deliver(&self, event: &PlaybackEvent) {
        if let Some(hook) = &self.hook {
            hook(event);
        }
    }
}

impl std::fmt::Debug for PlaybackAnalytics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackAnalytics")
            .field("hook", &self.hook.is_some())
            .field("context", &self.context)
            .field("seen", &self.seen.lock().len())
            .finish()
    }
}
