//! Call UI adapter.
//!
//! Projects a [`CallState`] into what the call page renders: the incoming
//! call prompt, the call/end-call button, the video and microphone toggles
//! (Material Symbols glyph names) and the remote video placeholder.

use crate::call::media::MediaFlags;
use crate::call::state::{CallEnd, CallState};
use crate::network::EndReason;

/// Shown in place of the remote video when no call is connected.
pub const REMOTE_PLACEHOLDER: &str = "No active video";

/// The main call button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryAction {
    Call,
    Cancel,
    EndCall,
}

impl PrimaryAction {
    pub fn label(&self) -> &'static str {
        match self {
            PrimaryAction::Call => "Call",
            PrimaryAction::Cancel => "Cancel",
            PrimaryAction::EndCall => "End Call",
        }
    }
}

/// Incoming call banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCallPrompt {
    pub caller_id: String,
    pub caller_name: String,
}

impl IncomingCallPrompt {
    pub fn headline(&self) -> String {
        let name = if self.caller_name.is_empty() {
            &self.caller_id
        } else {
            &self.caller_name
        };
        format!("{} is calling...", name)
    }

    pub fn accept_label(&self) -> &'static str {
        "Answer"
    }

    pub fn reject_label(&self) -> &'static str {
        "Decline"
    }
}

/// A media toggle button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleButton {
    pub enabled: bool,
    pub icon: &'static str,
}

impl ToggleButton {
    fn video(enabled: bool) -> Self {
        Self {
            enabled,
            icon: if enabled {
                "video_camera_front"
            } else {
                "video_camera_front_off"
            },
        }
    }

    fn audio(enabled: bool) -> Self {
        Self {
            enabled,
            icon: if enabled { "mic" } else { "mic_off" },
        }
    }
}

/// Render model of the call page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallView {
    pub status: String,
    pub primary: PrimaryAction,
    pub incoming: Option<IncomingCallPrompt>,
    pub show_local_video: bool,
    pub show_remote_video: bool,
    /// Text in the remote video slot when there is no remote video.
    pub remote_placeholder: Option<&'static str>,
    pub video: ToggleButton,
    pub audio: ToggleButton,
}

impl CallView {
    pub fn project(state: &CallState) -> Self {
        let media = state.media().unwrap_or_default();
        let show_remote_video = matches!(
            state,
            CallState::Active {
                remote_attached: true,
                ..
            }
        );

        let (primary, incoming) = match state {
            CallState::Placing { .. } | CallState::AwaitingAnswer { .. } => {
                (PrimaryAction::Cancel, None)
            }
            CallState::Ringing {
                peer,
                caller_name,
                accepted: false,
                ..
            } => (
                PrimaryAction::Call,
                Some(IncomingCallPrompt {
                    caller_id: peer.clone(),
                    caller_name: caller_name.clone(),
                }),
            ),
            CallState::Ringing { .. } | CallState::Active { .. } => (PrimaryAction::EndCall, None),
            _ => (PrimaryAction::Call, None),
        };

        Self {
            status: status_line(state),
            primary,
            incoming,
            show_local_video: state.media().is_some(),
            show_remote_video,
            remote_placeholder: (!show_remote_video).then_some(REMOTE_PLACEHOLDER),
            video: ToggleButton::video(media.video),
            audio: ToggleButton::audio(media.audio),
        }
    }

    /// Flags behind the toggles.
    pub fn media(&self) -> MediaFlags {
        MediaFlags {
            video: self.video.enabled,
            audio: self.audio.enabled,
        }
    }
}

fn status_line(state: &CallState) -> String {
    match state {
        CallState::Idle => "Ready".to_string(),
        CallState::Placing { target, .. } => format!("Calling {}...", target.id()),
        CallState::AwaitingAnswer { peer, .. } => format!("Ringing {}...", peer),
        CallState::Ringing { accepted: true, .. } => "Connecting...".to_string(),
        CallState::Ringing { .. } => "Incoming call".to_string(),
        CallState::Active { peer, .. } => format!("In call with {}", peer),
        CallState::Ended { end, .. } => match end {
            CallEnd::Remote(Some(EndReason::Busy)) => "Line busy".to_string(),
            CallEnd::Remote(Some(EndReason::Rejected)) => "Call declined".to_string(),
            CallEnd::Remote(Some(EndReason::Disconnected)) => "Peer disconnected".to_string(),
            _ => "Call ended".to_string(),
        },
        CallState::Failed { error, .. } => format!("Call failed: {}", error),
    }
}
