use sketchpair_system::{Error, SessionKind};

use crate::transport::{Generation, LocalTrack, RemoteTrack, TransportSession};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Pending,
    Ready(Vec<LocalTrack>),
    Unavailable(String),
}

/// Local capture and remote tracks of the audio/video session.
///
/// Capture and negotiation resolve independently; local tracks are attached
/// once both a session and the capture exist, whichever comes last.
#[derive(Debug)]
pub struct MediaSession {
    capture: CaptureState,
    attached_to: Option<Generation>,
    remote_tracks: Vec<RemoteTrack>,
}

impl Default for MediaSession {
    fn default() -> Self {
        Self {
            capture: CaptureState::Pending,
            attached_to: None,
            remote_tracks: Vec::new(),
        }
    }
}

impl MediaSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture(&self) -> &CaptureState {
        &self.capture
    }

    pub fn attached_generation(&self) -> Option<Generation> {
        self.attached_to
    }

    pub fn remote_tracks(&self) -> &[RemoteTrack] {
        &self.remote_tracks
    }

    pub fn capture_ready(&mut self, tracks: Vec<LocalTrack>) {
        log::info!("Local capture ready with {} track(s)", tracks.len());
        self.capture = CaptureState::Ready(tracks);
    }

    /// Drawing keeps working without media; the failure is only reported.
    pub fn capture_failed(&mut self, reason: String) -> Error {
        log::warn!("Local capture unavailable: {}", reason);
        self.capture = CaptureState::Unavailable(reason.clone());
        Error::DeviceUnavailable(reason)
    }

    /// Attaches the captured tracks to `session` unless that generation
    /// already carries them. Returns how many tracks were attached.
    pub async fn attach(
        &mut self,
        session: &dyn TransportSession,
        generation: Generation,
    ) -> Result<usize, Error> {
        let CaptureState::Ready(tracks) = &self.capture else {
            return Ok(0);
        };
        if self.attached_to == Some(generation) {
            return Ok(0);
        }
        for track in tracks {
            session
                .add_track(track)
                .await
                .map_err(|e| e.into_error(SessionKind::Media))?;
        }
        self.attached_to = Some(generation);
        log::debug!("Attached {} track(s) to media session {}", tracks.len(), generation);
        Ok(tracks.len())
    }

    pub fn on_remote_track(&mut self, track: RemoteTrack) {
        log::info!("Remote {:?} track {}", track.kind, track.id);
        if !self.remote_tracks.contains(&track) {
            self.remote_tracks.push(track);
        }
    }
}
