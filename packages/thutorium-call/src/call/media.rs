//! Local and remote media streams.
//!
//! Capture and rendering live outside this crate. Streams are handles over
//! platform tracks; the call agent owns the local stream for the lifetime of
//! a session and stops every track on teardown.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Capture constraints passed to [`MediaDevices::get_user_media`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    /// Video constraints, or `None` for an audio-only call.
    pub video: Option<VideoConstraints>,
    pub audio: bool,
}

/// Ideal (not mandatory) capture settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub ideal_frame_rate: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 1280,
            ideal_height: 720,
            ideal_frame_rate: 30,
        }
    }
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: Some(VideoConstraints::default()),
            audio: true,
        }
    }
}

/// Kind of media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// A single platform media track.
pub trait MediaTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    /// Mute or unmute without renegotiation.
    fn set_enabled(&self, enabled: bool);
    fn is_enabled(&self) -> bool;
    /// Stop capture/playback. Idempotent.
    fn stop(&self);
    fn is_stopped(&self) -> bool;
}

/// A set of tracks captured or received together.
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    /// Set `enabled` on every track of `kind`. Returns how many tracks were
    /// touched.
    pub fn set_enabled(&self, kind: TrackKind, enabled: bool) -> usize {
        let mut touched = 0;
        for track in self.tracks.iter().filter(|track| track.kind() == kind) {
            track.set_enabled(enabled);
            touched += 1;
        }
        touched
    }

    /// Whether any track of `kind` is enabled.
    pub fn is_enabled(&self, kind: TrackKind) -> bool {
        self.tracks
            .iter()
            .any(|track| track.kind() == kind && track.is_enabled())
    }

    /// Stop every track.
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
        tracing::debug!(stream = self.id.as_str(), "Media stream stopped");
    }
}

/// Which local tracks the user wants on. Both start enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFlags {
    pub video: bool,
    pub audio: bool,
}

impl Default for MediaFlags {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

impl MediaFlags {
    pub fn get(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Video => self.video,
            TrackKind::Audio => self.audio,
        }
    }

    /// Flip the flag for `kind` and return its new value.
    pub fn toggle(&mut self, kind: TrackKind) -> bool {
        let flag = match kind {
            TrackKind::Video => &mut self.video,
            TrackKind::Audio => &mut self.audio,
        };
        *flag = !*flag;
        *flag
    }
}

/// Access to the local camera and microphone.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire a local stream. A failure is fatal to the call; callers do not
    /// retry with relaxed constraints.
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<MediaStream>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTrack;

    #[test]
    fn test_default_constraints() {
        let constraints = MediaConstraints::default();
        let video = constraints.video.unwrap();
        assert_eq!(video.ideal_width, 1280);
        assert_eq!(video.ideal_height, 720);
        assert_eq!(video.ideal_frame_rate, 30);
        assert!(constraints.audio);
    }

    #[test]
    fn test_toggle_twice_restores_flag() {
        let mut flags = MediaFlags::default();
        assert!(!flags.toggle(TrackKind::Video));
        assert!(flags.toggle(TrackKind::Video));
        assert_eq!(flags, MediaFlags::default());
    }

    #[test]
    fn test_stream_set_enabled_by_kind() {
        let video = Arc::new(FakeTrack::new(TrackKind::Video));
        let audio = Arc::new(FakeTrack::new(TrackKind::Audio));
        let stream = MediaStream::new(
            "s1",
            vec![
                video.clone() as Arc<dyn MediaTrack>,
                audio.clone() as Arc<dyn MediaTrack>,
            ],
        );

        assert_eq!(stream.set_enabled(TrackKind::Audio, false), 1);
        assert!(!audio.is_enabled());
        assert!(video.is_enabled());
        assert!(!stream.is_enabled(TrackKind::Audio));
        assert!(stream.is_enabled(TrackKind::Video));
    }

    #[test]
    fn test_stream_stop_stops_all_tracks() {
        let video = Arc::new(FakeTrack::new(TrackKind::Video));
        let audio = Arc::new(FakeTrack::new(TrackKind::Audio));
        let stream = MediaStream::new(
            "s1",
            vec![
                video.clone() as Arc<dyn MediaTrack>,
                audio.clone() as Arc<dyn MediaTrack>,
            ],
        );

        stream.stop();
        assert!(video.is_stopped());
        assert!(audio.is_stopped());
    }
}
