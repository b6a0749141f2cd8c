use std::{sync::Arc, time::Duration};

use robot_client_core::{
    Action, Axis, ClientConfig, ErrorKind, LastCommand, Mount, ProtocolFile, Response,
    ResponseStore, RobotTarget, SessionState, Slot, StaticQuery,
};
use robot_client_transport::{MemoryChannel, MemoryOpener, Notification, RemoteCall, RemoteHandle};
use serde_json::{Value, json};
use tokio_test::assert_ok;

use crate::SessionClient;

const ROBOT: &str = "ot-bench";
const ENDPOINT: &str = "ws://10.0.0.5:31950";

struct Harness {
    client: SessionClient,
    channel: Arc<MemoryChannel>,
    opener: Arc<MemoryOpener>,
    query: Arc<StaticQuery>,
    store: Arc<ResponseStore>,
}

impl Harness {
    fn new() -> Self {
        let channel = MemoryChannel::new();
        let opener = Arc::new(MemoryOpener::new());
        opener.register(ENDPOINT, Arc::clone(&channel));
        let query = Arc::new(StaticQuery::new());
        let store = Arc::new(ResponseStore::default());
        let directory = Arc::new(vec![RobotTarget::new(ROBOT, "10.0.0.5", 31950)]);

        let client = SessionClient::new(
            ClientConfig::default(),
            opener.clone(),
            directory,
            query.clone(),
            store.clone(),
        );

        Self {
            client,
            channel,
            opener,
            query,
            store,
        }
    }

    /// Connect with `snapshot` as the robot's current session, then forget
    /// the connect responses.
    async fn connected(snapshot: Value) -> Self {
        let harness = Self::new();
        harness.channel.set_session_snapshot(Some(snapshot));
        harness.client.connect(ROBOT).await;
        assert!(harness.client.is_connected().await);
        harness.store.clear();
        harness
    }

    fn responses(&self) -> Vec<Response> {
        self.store.get_history()
    }

    fn last(&self) -> Option<Response> {
        self.responses().pop()
    }

    fn ticks(&self) -> usize {
        self.responses()
            .iter()
            .filter(|r| **r == Response::TickRunTime)
            .count()
    }
}

/// Let spawned listener tasks drain what the channel pushed.
async fn flush() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn error_kind(response: &Response) -> Option<ErrorKind> {
    response.error().map(|e| e.kind)
}

fn session(state: &str) -> Value {
    json!({
        "state": state,
        "startTime": null,
        "name": "dilution.py",
        "protocol_text": "from opentrons import robot",
        "commands": [
            {"id": 0, "description": "Picking up tip", "children": [
                {"id": 1, "description": "Moving to A1", "children": []}
            ]},
            {"id": 2, "description": "Dropping tip", "children": []}
        ],
        "command_log": {},
        "instruments": [
            {"_id": 11, "mount": "right", "name": "p300_single_v1", "channels": 1}
        ],
        "containers": [
            {"_id": 21, "name": "tiprack", "type": "tiprack-200ul", "slot": "1",
             "instruments": [{"mount": "right", "channels": 1}]},
            {"_id": 22, "name": "plate", "type": "96-flat", "slot": "5"}
        ],
        "modules": [],
        "metadata": {"protocolName": "Dilution", "author": "bench"}
    })
}

const PIPETTE: RemoteHandle = RemoteHandle::new(11);
const PLATE: RemoteHandle = RemoteHandle::new(22);

fn plate() -> Slot {
    Slot::from("5")
}

#[tokio::test]
async fn test_connect_reports_health_polling() {
    let h = Harness::new();
    h.client.connect(ROBOT).await;

    assert!(h.client.is_connected().await);
    assert_eq!(h.client.connected_robot().await.as_deref(), Some(ROBOT));
    assert_eq!(
        h.responses(),
        vec![Response::Connect {
            error: None,
            poll_health: true
        }]
    );
    assert_eq!(h.opener.opened(), vec![ENDPOINT.to_string()]);

    h.store.clear();
    h.channel.set_monitoring(true);
    h.client.connect(ROBOT).await;
    assert_eq!(
        h.last(),
        Some(Response::Connect {
            error: None,
            poll_health: false
        })
    );
}

#[tokio::test]
async fn test_connect_unknown_robot_keeps_connection() {
    let h = Harness::connected(session("loaded")).await;

    h.client.connect("ot-missing").await;

    let response = h.last().unwrap();
    assert!(matches!(response, Response::Connect { .. }));
    assert_eq!(error_kind(&response), Some(ErrorKind::NotFound));
    assert_eq!(h.client.connected_robot().await.as_deref(), Some(ROBOT));
    assert_eq!(h.opener.opened().len(), 1);
    assert!(!h.channel.is_closed());
}

#[tokio::test]
async fn test_connect_unreachable_endpoint() {
    let h = Harness::new();
    let client = SessionClient::new(
        ClientConfig::default(),
        Arc::new(MemoryOpener::new()),
        Arc::new(vec![RobotTarget::new(ROBOT, "10.0.0.9", 31950)]),
        h.query.clone(),
        h.store.clone(),
    );

    client.connect(ROBOT).await;

    assert_eq!(error_kind(&h.last().unwrap()), Some(ErrorKind::Channel));
    assert!(!client.is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn test_connect_mid_run_shows_run_view() {
    let h = Harness::new();
    h.channel.set_session_snapshot(Some(session("running")));

    h.client.connect(ROBOT).await;

    let responses = h.responses();
    assert_eq!(responses.len(), 3);
    assert!(matches!(
        &responses[0],
        Response::Session {
            error: None,
            update: Some(_),
            fresh_upload: false
        }
    ));
    assert_eq!(
        responses[1],
        Response::Navigate {
            path: "/run".into()
        }
    );
    assert!(matches!(responses[2], Response::Connect { error: None, .. }));
    assert!(h.client.run_timer_active().await);

    let mirrored = h.client.session().await.unwrap();
    assert_eq!(mirrored.state, Some(SessionState::Running));
    assert_eq!(mirrored.protocol_commands, vec![0, 2]);
    assert_eq!(mirrored.metadata.protocol_name.as_deref(), Some("Dilution"));
}

#[tokio::test]
async fn test_reconnect_replaces_previous_connection() {
    let h = Harness::connected(session("loaded")).await;
    flush().await;
    assert_eq!(h.channel.subscriber_count(), 1);

    h.client.connect(ROBOT).await;
    flush().await;

    assert_eq!(h.opener.opened().len(), 2);
    assert_eq!(h.channel.subscriber_count(), 1);
    assert!(!h.responses().contains(&Response::UnexpectedDisconnect));
    assert!(h.client.is_connected().await);

    let responses = h.responses();
    assert_eq!(responses[0], Response::Disconnect);
    assert_eq!(
        responses.iter().filter(|r| **r == Response::Disconnect).count(),
        1
    );
    assert!(matches!(
        responses.last(),
        Some(Response::Connect { error: None, .. })
    ));
}

#[tokio::test]
async fn test_switching_robots_reports_disconnect() {
    let h = Harness::new();
    h.channel.set_session_snapshot(Some(session("loaded")));
    let spare = MemoryChannel::new();
    h.opener.register("ws://10.0.0.6:31950", Arc::clone(&spare));
    let client = SessionClient::new(
        ClientConfig::default(),
        h.opener.clone(),
        Arc::new(vec![
            RobotTarget::new(ROBOT, "10.0.0.5", 31950),
            RobotTarget::new("ot-spare", "10.0.0.6", 31950),
        ]),
        h.query.clone(),
        h.store.clone(),
    );
    client.connect(ROBOT).await;
    assert!(!client.session().await.unwrap().protocol_commands.is_empty());
    h.store.clear();

    client.connect("ot-spare").await;

    assert_eq!(
        h.responses(),
        vec![
            Response::Disconnect,
            Response::Connect {
                error: None,
                poll_health: true
            }
        ]
    );
    assert_eq!(client.connected_robot().await.as_deref(), Some("ot-spare"));
    assert!(client.session().await.unwrap().protocol_commands.is_empty());
    assert!(h.channel.is_closed());
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let h = Harness::connected(session("loaded")).await;

    h.client.disconnect().await;
    h.client.disconnect().await;
    flush().await;

    assert_eq!(h.responses(), vec![Response::Disconnect, Response::Disconnect]);
    assert!(!h.client.is_connected().await);
    assert!(h.client.session().await.is_none());
    assert!(h.channel.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_restarts_single_tick_stream() {
    let h = Harness::connected(session("running")).await;
    assert!(h.client.run_timer_active().await);

    h.client.disconnect().await;
    assert!(!h.client.run_timer_active().await);

    h.client.connect(ROBOT).await;
    h.store.clear();
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert_eq!(h.ticks(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_close() {
    let h = Harness::connected(session("running")).await;

    h.channel.drop_connection();
    flush().await;

    assert_eq!(h.responses(), vec![Response::UnexpectedDisconnect]);
    assert!(!h.client.is_connected().await);
    assert!(!h.client.run_timer_active().await);

    h.client.handle(Action::Pause).await;
    assert_eq!(
        error_kind(&h.last().unwrap()),
        Some(ErrorKind::NotConnected)
    );
}

#[tokio::test]
async fn test_channel_error_is_not_surfaced() {
    let h = Harness::connected(session("loaded")).await;

    h.channel.raise_error("socket hiccup");
    flush().await;

    assert!(h.responses().is_empty());
    assert!(h.client.is_connected().await);
}

#[tokio::test]
async fn test_unknown_topic_is_dropped() {
    let h = Harness::connected(session("loaded")).await;

    h.channel
        .notify(Notification::new("robot", json!({"state": "running"})));
    flush().await;

    assert!(h.responses().is_empty());
    let mirrored = h.client.session().await.unwrap();
    assert_eq!(mirrored.state, Some(SessionState::Loaded));
}

#[tokio::test(start_paused = true)]
async fn test_light_update_touches_one_command() {
    let h = Harness::connected(session("loaded")).await;

    h.channel.notify(Notification::session(json!({
        "state": "running",
        "startTime": 1_540_000_000_000_i64,
        "lastCommand": {"id": 1, "handledAt": 1_540_000_000_500_i64}
    })));
    flush().await;

    let Some(Response::SessionUpdate { update, .. }) = h.last() else {
        panic!("expected a session update");
    };
    assert_eq!(update.state, Some(SessionState::Running));

    let mirrored = h.client.session().await.unwrap();
    let by_id = &mirrored.protocol_commands_by_id;
    assert_eq!(by_id[&1].handled_at, Some(1_540_000_000_500));
    assert_eq!(by_id[&0].handled_at, None);
    assert_eq!(by_id[&2].handled_at, None);
    assert_eq!(mirrored.start_time, Some(1_540_000_000_000));
    assert!(h.client.run_timer_active().await);

    h.channel.notify(Notification::session(json!({
        "state": "finished",
        "startTime": 1_540_000_000_000_i64,
        "lastCommand": null
    })));
    flush().await;
    assert!(!h.client.run_timer_active().await);
}

#[tokio::test]
async fn test_light_update_without_handled_time_keeps_command() {
    let h = Harness::connected(session("loaded")).await;

    h.channel.notify(Notification::session(json!({
        "state": "running",
        "lastCommand": {"id": 2, "handledAt": null}
    })));
    flush().await;

    let mirrored = h.client.session().await.unwrap();
    assert_eq!(
        mirrored.last_command,
        Some(LastCommand {
            id: 2,
            handled_at: None
        })
    );
    assert_eq!(mirrored.protocol_commands_by_id[&2].handled_at, None);
    h.client.shutdown().await;
}

#[tokio::test]
async fn test_failed_full_update_keeps_mirror() {
    let h = Harness::connected(session("loaded")).await;
    let before = h.client.session().await.unwrap();

    let mut broken = session("loaded");
    broken["commands"] = json!([{"id": 5, "description": "new", "children": []}]);
    broken["instruments"] = json!([
        {"_id": 12, "mount": "left", "name": "mystery_pipette", "channels": 1}
    ]);
    h.channel.notify(Notification::session(broken));
    flush().await;

    let response = h.last().unwrap();
    assert!(matches!(response, Response::Session { update: None, .. }));
    assert_eq!(error_kind(&response), Some(ErrorKind::Reconciliation));
    assert_eq!(h.client.session().await.unwrap(), before);
}

#[tokio::test]
async fn test_pickup_and_home_sequence() {
    let h = Harness::connected(session("loaded")).await;

    h.client
        .handle(Action::PickupAndHome {
            mount: Mount::Right,
            slot: plate(),
        })
        .await;

    assert_eq!(
        h.channel.calls(),
        vec![
            RemoteCall::UpdateContainerOffset {
                labware: PLATE,
                pipette: PIPETTE
            },
            RemoteCall::PickUpTip {
                pipette: PIPETTE,
                labware: PLATE
            },
        ]
    );
    assert_eq!(h.responses(), vec![Response::PickupAndHome { error: None }]);
}

#[tokio::test]
async fn test_pickup_and_home_stops_at_first_failure() {
    let h = Harness::connected(session("loaded")).await;
    h.channel
        .fail("calibration_manager.update_container_offset", "out of bounds");

    h.client
        .handle(Action::PickupAndHome {
            mount: Mount::Right,
            slot: plate(),
        })
        .await;

    assert_eq!(
        h.channel.call_paths(),
        vec!["calibration_manager.update_container_offset"]
    );
    let response = h.last().unwrap();
    assert_eq!(error_kind(&response), Some(ErrorKind::RemoteCall));
    assert!(response.error().unwrap().message.contains("out of bounds"));
}

#[tokio::test]
async fn test_drop_tip_and_home_sequence() {
    let h = Harness::connected(session("loaded")).await;

    h.client
        .handle(Action::DropTipAndHome {
            mount: Mount::Right,
            slot: plate(),
        })
        .await;

    assert_eq!(
        h.channel.call_paths(),
        vec![
            "calibration_manager.drop_tip",
            "calibration_manager.home",
            "calibration_manager.move_to"
        ]
    );
    assert_eq!(h.responses(), vec![Response::DropTipAndHome { error: None }]);
}

#[tokio::test]
async fn test_confirm_last_tiprack_keeps_tip() {
    let h = Harness::connected(session("loaded")).await;
    h.query.set_unconfirmed_tipracks(1);

    h.client
        .handle(Action::ConfirmTiprack {
            mount: Mount::Right,
            slot: Slot::from("1"),
        })
        .await;

    assert!(h.channel.calls().is_empty());
    assert_eq!(
        h.responses(),
        vec![Response::ConfirmTiprack {
            error: None,
            tip_on: true
        }]
    );
}

#[tokio::test]
async fn test_confirm_tiprack_drops_tip() {
    let h = Harness::connected(session("loaded")).await;
    h.query.set_unconfirmed_tipracks(2);

    h.client
        .handle(Action::ConfirmTiprack {
            mount: Mount::Right,
            slot: Slot::from("1"),
        })
        .await;

    assert_eq!(
        h.channel.calls(),
        vec![RemoteCall::DropTip {
            pipette: PIPETTE,
            labware: RemoteHandle::new(21)
        }]
    );
    assert_eq!(
        h.responses(),
        vec![Response::ConfirmTiprack {
            error: None,
            tip_on: false
        }]
    );
}

#[tokio::test]
async fn test_move_to_navigates_to_confirm_view() {
    let h = Harness::connected(session("loaded")).await;

    h.client
        .handle(Action::MoveTo {
            mount: Mount::Right,
            slot: plate(),
        })
        .await;

    assert_eq!(
        h.responses(),
        vec![
            Response::MoveTo { error: None },
            Response::Navigate {
                path: "/calibrate/labware/5/confirm".into()
            },
        ]
    );
}

#[tokio::test]
async fn test_failed_move_to_does_not_navigate() {
    let h = Harness::connected(session("loaded")).await;
    h.channel.fail("calibration_manager.move_to", "collision");

    h.client
        .handle(Action::MoveTo {
            mount: Mount::Right,
            slot: plate(),
        })
        .await;

    let responses = h.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(error_kind(&responses[0]), Some(ErrorKind::RemoteCall));
}

#[tokio::test]
async fn test_jog_distance_is_step_times_direction() {
    let h = Harness::connected(session("loaded")).await;

    h.client
        .handle(Action::Jog {
            mount: Mount::Right,
            axis: Axis::Z,
            direction: -1.0,
            step: 0.1,
        })
        .await;

    assert_eq!(
        h.channel.calls(),
        vec![RemoteCall::Jog {
            pipette: PIPETTE,
            distance: -0.1,
            axis: Axis::Z
        }]
    );
    assert_eq!(h.responses(), vec![Response::Jog { error: None }]);
}

#[tokio::test]
async fn test_missing_mount_or_slot_is_a_lookup_failure() {
    let h = Harness::connected(session("loaded")).await;

    h.client
        .handle(Action::MoveToFront { mount: Mount::Left })
        .await;
    h.client
        .handle(Action::UpdateOffset {
            mount: Mount::Right,
            slot: Slot::from("9"),
        })
        .await;

    assert!(h.channel.calls().is_empty());
    let responses = h.responses();
    assert!(matches!(responses[0], Response::MoveToFront { .. }));
    assert!(matches!(responses[1], Response::UpdateOffset { .. }));
    assert!(
        responses
            .iter()
            .all(|r| error_kind(r) == Some(ErrorKind::Lookup))
    );
}

#[tokio::test]
async fn test_actions_without_connection() {
    let h = Harness::new();

    h.client.handle(Action::Run).await;
    h.client
        .handle(Action::ProbeTip {
            mount: Mount::Right,
        })
        .await;

    let responses = h.responses();
    assert!(matches!(responses[0], Response::Run { .. }));
    assert!(matches!(responses[1], Response::ProbeTip { .. }));
    assert!(
        responses
            .iter()
            .all(|r| error_kind(r) == Some(ErrorKind::NotConnected))
    );
    assert!(!h.client.run_timer_active().await);
}

#[tokio::test(start_paused = true)]
async fn test_run_timer_ticks_while_run_call_is_pending() {
    let h = Harness::connected(session("loaded")).await;
    let gate = h.channel.gate("session_manager.session.run");

    let run = h.client.dispatch(Action::Run);
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert!(h.client.run_timer_active().await);
    assert_eq!(h.ticks(), 2);

    gate.notify_one();
    assert_ok!(run.await);

    assert!(!h.client.run_timer_active().await);
    assert_eq!(h.last(), Some(Response::Run { error: None }));
}

#[tokio::test(start_paused = true)]
async fn test_run_racing_disconnect_leaves_timer_stopped() {
    let h = Harness::connected(session("loaded")).await;

    // queue the run handler and a disconnect on the client lock, in that order
    let guard = h.client.lock().await;
    let run = h.client.dispatch(Action::Run);
    flush().await;
    let client = h.client.clone();
    let disconnect = tokio::spawn(async move { client.disconnect().await });
    flush().await;
    drop(guard);

    assert_ok!(run.await);
    assert_ok!(disconnect.await);
    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert!(!h.client.is_connected().await);
    assert!(!h.client.run_timer_active().await);
    assert_eq!(h.ticks(), 0);
    assert!(h.channel.calls().is_empty());
    assert_eq!(h.responses(), vec![Response::Disconnect]);
}

#[tokio::test]
async fn test_upload_racing_disconnect_is_dropped() {
    let h = Harness::connected(session("loaded")).await;
    h.query.set_protocol_file(ProtocolFile {
        name: "dilution.py".into(),
        is_binary: false,
    });

    let guard = h.client.lock().await;
    let upload = h.client.dispatch(Action::UploadProtocol {
        contents: "from opentrons import robot".into(),
    });
    flush().await;
    let client = h.client.clone();
    let disconnect = tokio::spawn(async move { client.disconnect().await });
    flush().await;
    drop(guard);

    assert_ok!(upload.await);
    assert_ok!(disconnect.await);

    assert!(h.channel.calls().is_empty());
    assert_eq!(h.responses(), vec![Response::Disconnect]);
}

#[tokio::test]
async fn test_cancel_resumes_before_stopping() {
    let h = Harness::connected(session("paused")).await;

    h.client.handle(Action::Cancel).await;

    assert_eq!(
        h.channel.call_paths(),
        vec!["session_manager.session.resume", "session_manager.session.stop"]
    );
    assert_eq!(h.responses(), vec![Response::Cancel { error: None }]);
}

#[tokio::test]
async fn test_cancel_skips_stop_when_resume_fails() {
    let h = Harness::connected(session("paused")).await;
    h.channel.fail("session_manager.session.resume", "busy");

    h.client.handle(Action::Cancel).await;

    assert_eq!(h.channel.call_paths(), vec!["session_manager.session.resume"]);
    assert_eq!(error_kind(&h.last().unwrap()), Some(ErrorKind::RemoteCall));
}

#[tokio::test]
async fn test_pause_and_resume() {
    let h = Harness::connected(session("running")).await;

    h.client.handle(Action::Pause).await;
    h.client.handle(Action::Resume).await;

    assert_eq!(
        h.channel.call_paths(),
        vec!["session_manager.session.pause", "session_manager.session.resume"]
    );
    assert_eq!(
        h.responses(),
        vec![
            Response::Pause { error: None },
            Response::Resume { error: None }
        ]
    );
}

#[tokio::test]
async fn test_upload_tags_next_session_as_fresh() {
    let h = Harness::connected(session("loaded")).await;
    h.query.set_protocol_file(ProtocolFile {
        name: "dilution.py".into(),
        is_binary: false,
    });

    h.client
        .handle(Action::UploadProtocol {
            contents: "from opentrons import robot".into(),
        })
        .await;
    assert_eq!(
        h.channel.calls(),
        vec![RemoteCall::CreateSession {
            name: "dilution.py".into(),
            contents: "from opentrons import robot".into(),
            is_binary: false
        }]
    );
    assert!(h.responses().is_empty());

    h.channel.notify(Notification::session(session("loaded")));
    h.channel.notify(Notification::session(session("loaded")));
    flush().await;

    let fresh: Vec<bool> = h
        .responses()
        .iter()
        .filter_map(|r| match r {
            Response::Session { fresh_upload, .. } => Some(*fresh_upload),
            _ => None,
        })
        .collect();
    assert_eq!(fresh, vec![true, false]);
}

#[tokio::test]
async fn test_failed_upload() {
    let h = Harness::connected(session("loaded")).await;
    h.query.set_protocol_file(ProtocolFile {
        name: "dilution.py".into(),
        is_binary: false,
    });
    h.channel.fail("session_manager.create", "syntax error");

    h.client
        .handle(Action::UploadProtocol {
            contents: "bogus".into(),
        })
        .await;

    let response = h.last().unwrap();
    assert!(matches!(
        response,
        Response::Session {
            update: None,
            fresh_upload: true,
            ..
        }
    ));
    assert_eq!(error_kind(&response), Some(ErrorKind::RemoteCall));
}

#[tokio::test]
async fn test_upload_without_protocol_file() {
    let h = Harness::connected(session("loaded")).await;

    h.client
        .handle(Action::UploadProtocol {
            contents: "bogus".into(),
        })
        .await;

    assert!(h.channel.calls().is_empty());
    assert_eq!(error_kind(&h.last().unwrap()), Some(ErrorKind::Lookup));
}

#[tokio::test]
async fn test_refresh_responds_only_on_failure() {
    let h = Harness::connected(session("loaded")).await;

    h.client.handle(Action::RefreshSession).await;
    assert_eq!(h.channel.call_paths(), vec!["session_manager.session.refresh"]);
    assert!(h.responses().is_empty());

    h.channel.fail("session_manager.session.refresh", "no session");
    h.client.handle(Action::RefreshSession).await;

    let response = h.last().unwrap();
    assert!(matches!(
        response,
        Response::Session {
            fresh_upload: false,
            ..
        }
    ));
    assert_eq!(error_kind(&response), Some(ErrorKind::RemoteCall));
}

#[tokio::test]
async fn test_response_after_disconnect_is_dropped() {
    let h = Harness::connected(session("loaded")).await;
    let gate = h.channel.gate("calibration_manager.move_to_front");

    let pending = h.client.dispatch(Action::MoveToFront {
        mount: Mount::Right,
    });
    flush().await;

    h.client.disconnect().await;
    gate.notify_one();
    assert_ok!(pending.await);

    assert_eq!(h.responses(), vec![Response::Disconnect]);
}

#[tokio::test]
async fn test_response_after_reconnect_is_dropped() {
    let h = Harness::connected(session("loaded")).await;
    let gate = h.channel.gate("calibration_manager.tip_probe");

    let pending = h.client.dispatch(Action::ProbeTip {
        mount: Mount::Right,
    });
    flush().await;

    h.client.connect(ROBOT).await;
    h.store.clear();
    gate.notify_one();
    assert_ok!(pending.await);

    assert!(h.responses().is_empty());
}

#[tokio::test]
async fn test_restart_of_connected_robot_disconnects() {
    let h = Harness::connected(session("loaded")).await;

    h.client
        .handle(Action::ServerSuccess {
            path: "update".into(),
            robot: ROBOT.into(),
        })
        .await;
    h.client
        .handle(Action::ServerSuccess {
            path: "restart".into(),
            robot: "ot-other".into(),
        })
        .await;
    assert!(h.client.is_connected().await);
    assert!(h.responses().is_empty());

    h.client
        .handle(Action::ServerSuccess {
            path: "restart".into(),
            robot: ROBOT.into(),
        })
        .await;
    assert!(!h.client.is_connected().await);
    assert_eq!(h.responses(), vec![Response::Disconnect]);
}

#[tokio::test]
async fn test_confirm_after_tip_check_homes_silently() {
    let h = Harness::connected(session("loaded")).await;

    h.client
        .handle(Action::ConfirmProbed {
            mount: Mount::Right,
        })
        .await;

    assert_eq!(h.channel.calls(), vec![RemoteCall::Home { pipette: PIPETTE }]);
    assert!(h.responses().is_empty());
}

#[tokio::test]
async fn test_return_tip_and_update_offset() {
    let h = Harness::connected(session("loaded")).await;

    h.client
        .handle(Action::ReturnTip {
            mount: Mount::Right,
        })
        .await;
    h.client
        .handle(Action::UpdateOffset {
            mount: Mount::Right,
            slot: plate(),
        })
        .await;

    assert_eq!(
        h.channel.calls(),
        vec![
            RemoteCall::ReturnTip { pipette: PIPETTE },
            RemoteCall::UpdateContainerOffset {
                labware: PLATE,
                pipette: PIPETTE
            },
        ]
    );
    assert_eq!(
        h.responses(),
        vec![
            Response::ReturnTip { error: None },
            Response::UpdateOffset { error: None }
        ]
    );
}

#[tokio::test]
async fn test_every_action_completes_when_disconnected() {
    let h = Harness::new();
    let actions = vec![
        Action::Disconnect,
        Action::UploadProtocol {
            contents: String::new(),
        },
        Action::PickupAndHome {
            mount: Mount::Left,
            slot: plate(),
        },
        Action::DropTipAndHome {
            mount: Mount::Left,
            slot: plate(),
        },
        Action::ConfirmProbed { mount: Mount::Left },
        Action::ConfirmTiprack {
            mount: Mount::Left,
            slot: plate(),
        },
        Action::MoveToFront { mount: Mount::Left },
        Action::ProbeTip { mount: Mount::Left },
        Action::MoveTo {
            mount: Mount::Left,
            slot: plate(),
        },
        Action::Jog {
            mount: Mount::Left,
            axis: Axis::X,
            direction: 1.0,
            step: 1.0,
        },
        Action::UpdateOffset {
            mount: Mount::Left,
            slot: plate(),
        },
        Action::ReturnTip { mount: Mount::Left },
        Action::Run,
        Action::Pause,
        Action::Resume,
        Action::Cancel,
        Action::RefreshSession,
        Action::ServerSuccess {
            path: "restart".into(),
            robot: ROBOT.into(),
        },
    ];

    for action in actions {
        assert_ok!(h.client.dispatch(action).await);
    }

    let responses = h.responses();
    assert_eq!(responses[0], Response::Disconnect);
    // everything but the disconnect, homing and restart notice reports a failure
    assert_eq!(
        responses
            .iter()
            .filter(|r| error_kind(r) == Some(ErrorKind::NotConnected))
            .count(),
        15
    );
    assert!(h.channel.calls().is_empty());
}
