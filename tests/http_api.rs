use std::io::Cursor;
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use now_playing_bridge::{
    command::PlayerCommand,
    server,
    session::{MediaBridge, SessionBackend},
    snapshot::{PlaybackStatus, RawMetadata, RawSession, Timeline},
};

struct ScriptedBackend {
    session: Option<RawSession>,
    fail: bool,
    commands: Arc<Mutex<Vec<PlayerCommand>>>,
}

impl SessionBackend for ScriptedBackend {
    fn fetch(&mut self) -> anyhow::Result<Option<RawSession>> {
        if self.fail {
            anyhow::bail!("session manager unreachable");
        }
        Ok(self.session.clone())
    }

    fn control(&mut self, command: PlayerCommand) -> anyhow::Result<bool> {
        if self.fail {
            anyhow::bail!("session manager unreachable");
        }
        self.commands.lock().expect("lock").push(command);
        Ok(self.session.is_some())
    }
}

struct Harness {
    router: Router,
    commands: Arc<Mutex<Vec<PlayerCommand>>>,
}

fn harness(session: Option<RawSession>, fail: bool) -> Harness {
    let commands = Arc::new(Mutex::new(Vec::new()));
    let bridge = MediaBridge::spawn({
        let commands = commands.clone();
        move || {
            Ok(ScriptedBackend {
                session,
                fail,
                commands,
            })
        }
    });
    Harness {
        router: server::router(bridge),
        commands,
    }
}

fn red_png() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(16, 16, image::Rgb([255, 0, 0]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("png encode");
    bytes.into_inner()
}

fn playing_session() -> RawSession {
    RawSession {
        metadata: RawMetadata {
            title: "Paranoid Android".into(),
            artist: "Radiohead".into(),
            album_artist: "Radiohead".into(),
            album_title: "OK Computer".into(),
        },
        status: PlaybackStatus::Playing,
        timeline: Some(Timeline {
            position_secs: 31.0,
            duration_secs: 387.0,
        }),
        thumbnail: Some(red_png()),
    }
}

async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .oneshot(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let json = serde_json::from_slice(&bytes).expect("json body");
    (status, json)
}

async fn post_control(router: Router, body: &str) -> (StatusCode, Value) {
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/control")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_owned()))
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let json = serde_json::from_slice(&bytes).expect("json body");
    (status, json)
}

#[tokio::test]
async fn current_media_reports_idle_without_session() {
    let harness = harness(None, false);
    let (status, json) = get_json(harness.router, "/current-media").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "idle");
    assert_eq!(json["title"], "No Media Playing");
    for absent in ["color", "thumbnail", "position", "duration"] {
        assert!(json.get(absent).is_none(), "unexpected key {absent}");
    }
}

#[tokio::test]
async fn current_media_normalizes_an_active_session() {
    let harness = harness(Some(playing_session()), false);
    let (status, json) = get_json(harness.router, "/current-media").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "playing");
    assert_eq!(json["title"], "Paranoid Android");
    assert_eq!(json["album_title"], "OK Computer");
    assert_eq!(json["color"], "#ff0000");
    assert_eq!(json["position"], 31.0);
    assert_eq!(json["duration"], 387.0);
    let thumbnail = json["thumbnail"].as_str().expect("thumbnail");
    assert!(thumbnail.starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn current_media_survives_a_corrupt_thumbnail() {
    let mut session = playing_session();
    session.thumbnail = Some(vec![0xde, 0xad, 0xbe, 0xef]);
    let harness = harness(Some(session), false);
    let (status, json) = get_json(harness.router, "/current-media").await;

    assert_eq!(status, StatusCode::OK);
    assert!(json.get("color").is_none());
    assert!(json["thumbnail"].as_str().is_some());
}

#[tokio::test]
async fn current_media_maps_platform_faults_to_500() {
    let harness = harness(None, true);
    let (status, json) = get_json(harness.router, "/current-media").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"]
        .as_str()
        .expect("error message")
        .contains("unreachable"));
}

#[tokio::test]
async fn control_dispatches_known_commands() {
    let harness = harness(Some(playing_session()), false);
    let (status, json) = post_control(harness.router, r#"{"command": "play"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(
        *harness.commands.lock().expect("lock"),
        vec![PlayerCommand::Play]
    );
}

#[tokio::test]
async fn control_without_session_reports_failure() {
    let harness = harness(None, false);
    let (status, json) = post_control(harness.router, r#"{"command": "next"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn unknown_command_never_reaches_the_session() {
    let harness = harness(Some(playing_session()), false);
    let (status, json) = post_control(harness.router, r#"{"command": "rewind"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
    assert!(harness.commands.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn missing_command_is_a_client_error() {
    let harness = harness(Some(playing_session()), false);
    let (status, json) = post_control(harness.router, "{}").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No command provided");
    assert!(harness.commands.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn responses_carry_a_permissive_cors_header() {
    let harness = harness(None, false);
    let response = harness
        .router
        .oneshot(
            Request::builder()
                .uri("/current-media")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .expect("cors header"),
        "*"
    );
}
