//! The async driver wired to a real session, loader and mock media server.

use std::sync::Arc;
use std::time::Duration;

use cowatch::clock::ManualClock;
use cowatch::driver::SyncDriver;
use cowatch::engine::{EngineCommand, HeadlessEngine};
use cowatch::session::LocalSession;
use cowatch::source::SourceLoader;
use cowatch::sync::{SyncMachine, SyncPhase};
use cowatch_core::config::{SourceConfig, SyncConfig};
use cowatch_core::{InboundMessage, OutboundMessage};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TICK: Duration = Duration::from_millis(10);

fn build(
    base_url: String,
    is_admin: bool,
) -> (
    Arc<LocalSession>,
    tokio::sync::mpsc::UnboundedReceiver<OutboundMessage>,
    SyncDriver<HeadlessEngine>,
    cowatch::driver::DriverHandle,
) {
    let (session, outgoing) = LocalSession::new();
    session.connect();
    session.deliver(InboundMessage::Permissions {
        is_admin,
        user_controls_allowed: false,
        proxy_enabled: false,
    });
    let loader = Arc::new(
        SourceLoader::new(SourceConfig {
            base_url,
            ..SourceConfig::default()
        })
        .unwrap(),
    );
    let machine = SyncMachine::new(
        HeadlessEngine::new(),
        SyncConfig::default(),
        Arc::new(ManualClock::default()),
        session.clone(),
        loader.clone(),
    );
    let (driver, handle) = SyncDriver::new(machine, loader, session.as_ref(), TICK);
    (session, outgoing, driver, handle)
}

#[tokio::test]
async fn load_message_registers_discovered_subtitles() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/film.subtitles.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "label": "English", "srclang": "en", "src": "film.en.vtt" }
        ])))
        .mount(&server)
        .await;

    let (session, _outgoing, driver, handle) = build(server.uri(), false);
    let task = tokio::spawn(driver.run());

    let url = format!("{}/media/film.mp4", server.uri());
    session.deliver(InboundMessage::Load { url: url.clone() });
    tokio::time::sleep(Duration::from_millis(500)).await;

    handle.shutdown().await;
    let machine = task.await.unwrap();

    assert_eq!(machine.phase(), SyncPhase::Synced);
    assert_eq!(machine.loaded_source(), Some(url.as_str()));
    assert_eq!(machine.adapter().text_tracks().len(), 1);
    assert!(machine.engine().commands().contains(&EngineCommand::AddTextTrack {
        src: format!("{}/media/film.en.vtt", server.uri()),
        active: false,
    }));
}

#[tokio::test]
async fn local_signals_reach_the_server() {
    let (_session, mut outgoing, driver, handle) =
        build("http://localhost:8080".into(), true);
    let task = tokio::spawn(driver.run());

    handle.request_load("https://cdn.example/a.mp4");
    let first = tokio::time::timeout(Duration::from_secs(2), outgoing.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        first,
        OutboundMessage::Load {
            url: "https://cdn.example/a.mp4".into()
        }
    );

    // Let a tick observe the loaded metadata before asking for a force sync.
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.request_force_sync();
    let second = tokio::time::timeout(Duration::from_secs(2), outgoing.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.kind(), "forceSync");

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn disconnect_event_unloads() {
    let (session, _outgoing, driver, handle) = build("http://localhost:8080".into(), false);
    let task = tokio::spawn(driver.run());

    session.deliver(InboundMessage::Load {
        url: "https://cdn.example/a.mp4".into(),
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.disconnect();
    tokio::time::sleep(Duration::from_millis(100)).await;

    handle.shutdown().await;
    let machine = task.await.unwrap();
    assert_eq!(machine.phase(), SyncPhase::Idle);
    assert_eq!(machine.engine().commands().last(), Some(&EngineCommand::Unload));
}
