use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, Result};
use tokio::sync::oneshot;
use tracing::error;

use crate::command::PlayerCommand;
use crate::snapshot::RawSession;

/// Platform seam: one live media-session source.
///
/// Implementations run on the dedicated session worker thread and may block
/// while the platform answers.
pub trait SessionBackend {
    /// Read the current session state, or `None` when nothing is playing.
    fn fetch(&mut self) -> Result<Option<RawSession>>;

    /// Issue one control command. `Ok(false)` means there was no session to
    /// talk to or the session declined the command.
    fn control(&mut self, command: PlayerCommand) -> Result<bool>;
}

enum BridgeRequest {
    Snapshot(oneshot::Sender<Result<Option<RawSession>>>),
    Control(PlayerCommand, oneshot::Sender<Result<bool>>),
}

/// Cloneable handle to the session worker thread.
#[derive(Clone)]
pub struct MediaBridge {
    tx: mpsc::Sender<BridgeRequest>,
}

impl MediaBridge {
    /// Spawn the worker thread and construct the backend on it. GSMTC objects
    /// are bound to the thread that initialized COM, so construction must not
    /// happen on the caller's thread.
    pub fn spawn<B, F>(make_backend: F) -> Self
    where
        B: SessionBackend + 'static,
        F: FnOnce() -> Result<B> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || worker_loop(make_backend, rx));
        Self { tx }
    }

    pub async fn snapshot(&self) -> Result<Option<RawSession>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(BridgeRequest::Snapshot(reply_tx))
            .map_err(|_| anyhow!("session worker is gone"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("session worker dropped the request"))?
    }

    pub async fn control(&self, command: PlayerCommand) -> Result<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(BridgeRequest::Control(command, reply_tx))
            .map_err(|_| anyhow!("session worker is gone"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("session worker dropped the request"))?
    }
}

fn worker_loop<B, F>(make_backend: F, rx: mpsc::Receiver<BridgeRequest>)
where
    B: SessionBackend,
    F: FnOnce() -> Result<B>,
{
    let mut backend = match make_backend() {
        Ok(backend) => backend,
        Err(err) => {
            error!("media session backend failed to start: {err:#}");
            let message = format!("session backend unavailable: {err:#}");
            while let Ok(request) = rx.recv() {
                match request {
                    BridgeRequest::Snapshot(reply) => {
                        let _ = reply.send(Err(anyhow!("{message}")));
                    }
                    BridgeRequest::Control(_, reply) => {
                        let _ = reply.send(Err(anyhow!("{message}")));
                    }
                }
            }
            return;
        }
    };

    while let Ok(request) = rx.recv() {
        match request {
            BridgeRequest::Snapshot(reply) => {
                let _ = reply.send(backend.fetch());
            }
            BridgeRequest::Control(command, reply) => {
                let _ = reply.send(backend.control(command));
            }
        }
    }
}

/// Fallback for hosts without a system media-session API: always idle.
#[cfg(not(target_os = "windows"))]
pub struct UnsupportedBackend;

#[cfg(not(target_os = "windows"))]
impl SessionBackend for UnsupportedBackend {
    fn fetch(&mut self) -> Result<Option<RawSession>> {
        Ok(None)
    }

    fn control(&mut self, _command: PlayerCommand) -> Result<bool> {
        Ok(false)
    }
}

#[cfg(target_os = "windows")]
pub use gsmtc::GsmtcBackend;

#[cfg(target_os = "windows")]
mod gsmtc {
    use super::{PlayerCommand, RawSession, SessionBackend};
    use crate::snapshot::{PlaybackStatus, RawMetadata, Timeline};
    use anyhow::{anyhow, Result};
    use futures::executor::block_on;
    use std::future::IntoFuture;
    use tracing::warn;
    use windows::{
        core::Result as WinResult,
        Foundation::TimeSpan,
        Media::Control::{
            GlobalSystemMediaTransportControlsSession,
            GlobalSystemMediaTransportControlsSessionManager,
            GlobalSystemMediaTransportControlsSessionMediaProperties,
            GlobalSystemMediaTransportControlsSessionPlaybackStatus,
        },
        Storage::Streams::{
            DataReader, IRandomAccessStreamReference, IRandomAccessStreamWithContentType,
            InputStreamOptions,
        },
        Win32::{
            Foundation::RPC_E_CHANGED_MODE,
            System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED},
        },
    };

    const TICKS_PER_SECOND: f64 = 10_000_000.0;

    fn time_span_to_secs(span: TimeSpan) -> f64 {
        span.Duration as f64 / TICKS_PER_SECOND
    }

    fn block_on_operation<O, T>(operation: O) -> WinResult<T>
    where
        O: IntoFuture<Output = WinResult<T>>,
    {
        block_on(operation.into_future())
    }

    fn windows_err(err: windows::core::Error) -> anyhow::Error {
        anyhow!("{err:?}")
    }

    /// Keeps COM initialized for the lifetime of the worker thread.
    struct ComGuard {
        initialized: bool,
    }

    impl ComGuard {
        fn init() -> Result<Self> {
            let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
            if hr.is_ok() {
                Ok(Self { initialized: true })
            } else if hr == RPC_E_CHANGED_MODE {
                // Another component already initialized this thread; use it
                // as-is and leave teardown to the owner.
                Ok(Self { initialized: false })
            } else {
                Err(anyhow!("COM init failed: {hr:?}"))
            }
        }
    }

    impl Drop for ComGuard {
        fn drop(&mut self) {
            if self.initialized {
                unsafe { CoUninitialize() };
            }
        }
    }

    /// Windows media session source over the global transport-controls API.
    pub struct GsmtcBackend {
        _com: ComGuard,
    }

    impl GsmtcBackend {
        pub fn new() -> Result<Self> {
            Ok(Self {
                _com: ComGuard::init()?,
            })
        }
    }

    impl SessionBackend for GsmtcBackend {
        fn fetch(&mut self) -> Result<Option<RawSession>> {
            let manager = request_manager().map_err(windows_err)?;
            // GetCurrentSession reports an error when nothing is playing;
            // that is the idle case, not a fault.
            let Ok(session) = manager.GetCurrentSession() else {
                return Ok(None);
            };
            read_session(&session).map(Some).map_err(windows_err)
        }

        fn control(&mut self, command: PlayerCommand) -> Result<bool> {
            let manager = request_manager().map_err(windows_err)?;
            let Ok(session) = manager.GetCurrentSession() else {
                return Ok(false);
            };
            invoke(&session, command).map_err(windows_err)
        }
    }

    fn request_manager() -> WinResult<GlobalSystemMediaTransportControlsSessionManager> {
        block_on_operation(GlobalSystemMediaTransportControlsSessionManager::RequestAsync()?)
    }

    fn invoke(
        session: &GlobalSystemMediaTransportControlsSession,
        command: PlayerCommand,
    ) -> WinResult<bool> {
        match command {
            PlayerCommand::Play => block_on_operation(session.TryPlayAsync()?),
            PlayerCommand::Pause => block_on_operation(session.TryPauseAsync()?),
            PlayerCommand::Next => block_on_operation(session.TrySkipNextAsync()?),
            PlayerCommand::Prev => block_on_operation(session.TrySkipPreviousAsync()?),
            PlayerCommand::Toggle => block_on_operation(session.TryTogglePlayPauseAsync()?),
        }
    }

    fn read_session(session: &GlobalSystemMediaTransportControlsSession) -> WinResult<RawSession> {
        let props = block_on_operation(session.TryGetMediaPropertiesAsync()?)?;
        let playback_info = session.GetPlaybackInfo()?;
        let status = match playback_info.PlaybackStatus()? {
            GlobalSystemMediaTransportControlsSessionPlaybackStatus::Playing => {
                PlaybackStatus::Playing
            }
            GlobalSystemMediaTransportControlsSessionPlaybackStatus::Paused => {
                PlaybackStatus::Paused
            }
            GlobalSystemMediaTransportControlsSessionPlaybackStatus::Stopped => {
                PlaybackStatus::Stopped
            }
            _ => PlaybackStatus::Other,
        };

        let metadata = RawMetadata {
            title: props.Title()?.to_string_lossy(),
            artist: props.Artist()?.to_string_lossy(),
            album_artist: props.AlbumArtist()?.to_string_lossy(),
            album_title: props.AlbumTitle()?.to_string_lossy(),
        };

        let timeline = read_timeline(session)?;
        let thumbnail = load_thumbnail_bytes(&props);

        Ok(RawSession {
            metadata,
            status,
            timeline,
            thumbnail,
        })
    }

    fn read_timeline(
        session: &GlobalSystemMediaTransportControlsSession,
    ) -> WinResult<Option<Timeline>> {
        let timeline_props = session.GetTimelineProperties()?;
        let mut start_secs = time_span_to_secs(timeline_props.StartTime()?);
        let mut end_secs = time_span_to_secs(timeline_props.EndTime()?);
        let mut position_secs = time_span_to_secs(timeline_props.Position()?);

        if end_secs < start_secs {
            std::mem::swap(&mut start_secs, &mut end_secs);
        }
        if !position_secs.is_finite() {
            position_secs = start_secs;
        }
        position_secs = position_secs.clamp(start_secs, end_secs.max(start_secs));

        // A zero-length span means the player reported no timeline.
        if end_secs <= f64::EPSILON {
            return Ok(None);
        }

        Ok(Some(Timeline {
            position_secs: position_secs.max(0.0),
            duration_secs: end_secs.max(0.0),
        }))
    }

    /// Thumbnail bytes are best-effort: a missing or unreadable stream costs
    /// the snapshot its artwork, nothing else.
    fn load_thumbnail_bytes(
        props: &GlobalSystemMediaTransportControlsSessionMediaProperties,
    ) -> Option<Vec<u8>> {
        let reference: IRandomAccessStreamReference = props.Thumbnail().ok()?;
        match read_stream_bytes(&reference) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!("failed to read thumbnail stream: {err:?}");
                None
            }
        }
    }

    fn read_stream_bytes(reference: &IRandomAccessStreamReference) -> WinResult<Vec<u8>> {
        let stream: IRandomAccessStreamWithContentType =
            block_on_operation(reference.OpenReadAsync()?)?;
        let input_stream = stream.GetInputStreamAt(0)?;
        let reader = DataReader::CreateDataReader(&input_stream)?;
        reader.SetInputStreamOptions(InputStreamOptions::Partial)?;

        let mut buffer = Vec::new();
        const CHUNK: u32 = 64 * 1024;

        loop {
            let loaded = block_on_operation(reader.LoadAsync(CHUNK)?)?;
            if loaded == 0 {
                break;
            }
            let mut chunk = vec![0u8; loaded as usize];
            reader.ReadBytes(&mut chunk)?;
            buffer.extend_from_slice(&chunk);
            if loaded < CHUNK {
                break;
            }
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{PlaybackStatus, RawMetadata};
    use std::sync::{Arc, Mutex};

    struct FakeBackend {
        session: Option<RawSession>,
        commands: Arc<Mutex<Vec<PlayerCommand>>>,
    }

    impl SessionBackend for FakeBackend {
        fn fetch(&mut self) -> Result<Option<RawSession>> {
            Ok(self.session.clone())
        }

        fn control(&mut self, command: PlayerCommand) -> Result<bool> {
            self.commands.lock().expect("lock").push(command);
            Ok(self.session.is_some())
        }
    }

    fn playing_session() -> RawSession {
        RawSession {
            metadata: RawMetadata {
                title: "Track".into(),
                ..Default::default()
            },
            status: PlaybackStatus::Playing,
            timeline: None,
            thumbnail: None,
        }
    }

    #[tokio::test]
    async fn bridge_round_trips_snapshots() {
        let commands = Arc::new(Mutex::new(Vec::new()));
        let session = playing_session();
        let bridge = MediaBridge::spawn({
            let commands = commands.clone();
            move || {
                Ok(FakeBackend {
                    session: Some(session),
                    commands,
                })
            }
        });

        let raw = bridge.snapshot().await.expect("worker alive");
        assert_eq!(raw.expect("session present").metadata.title, "Track");
    }

    #[tokio::test]
    async fn bridge_passes_commands_through() {
        let commands = Arc::new(Mutex::new(Vec::new()));
        let bridge = MediaBridge::spawn({
            let commands = commands.clone();
            move || {
                Ok(FakeBackend {
                    session: Some(playing_session()),
                    commands,
                })
            }
        });

        assert!(bridge.control(PlayerCommand::Next).await.expect("alive"));
        assert!(bridge.control(PlayerCommand::Toggle).await.expect("alive"));
        assert_eq!(
            *commands.lock().expect("lock"),
            vec![PlayerCommand::Next, PlayerCommand::Toggle]
        );
    }

    #[tokio::test]
    async fn control_without_session_reports_failure() {
        let bridge = MediaBridge::spawn(|| {
            Ok(FakeBackend {
                session: None,
                commands: Arc::new(Mutex::new(Vec::new())),
            })
        });

        assert!(!bridge.control(PlayerCommand::Play).await.expect("alive"));
        assert!(bridge.snapshot().await.expect("alive").is_none());
    }

    #[tokio::test]
    async fn failed_backend_startup_surfaces_as_errors() {
        let bridge =
            MediaBridge::spawn::<FakeBackend, _>(|| Err(anyhow!("no media stack on this host")));

        let err = bridge.snapshot().await.expect_err("backend never started");
        assert!(err.to_string().contains("session backend unavailable"));
    }
}
