use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use ivt_k30::protocol::*;
use ivt_k30::{
    ClimateMode, DhwMode, Error, Event, ExtraHotWater, K30Client, K30ClientBuilder,
    MemoryCredentialStore, MessageLogMode, RetryPolicy,
};
use serde_json::{Value, json};
use wiremock::matchers::{any, body_json, body_string_contains, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEVICE: &str = "101424242";

fn resource(p: &str) -> String {
    format!("/gateways/{DEVICE}/resource{p}")
}

fn value_body(p: &str, v: Value) -> Value {
    json!({ "id": p, "type": "floatValue", "writeable": 1, "value": v })
}

fn builder(server: &MockServer) -> K30ClientBuilder {
    K30Client::builder(DEVICE)
        .api_base_url(format!("{}/gateways/", server.uri()))
        .token_url(format!("{}/token", server.uri()))
        .retry_policy(RetryPolicy::no_delay(3))
}

async fn authed_client(server: &MockServer) -> K30Client {
    let client = builder(server).build().expect("build");
    client
        .import_tokens(
            "old",
            Some("r1".into()),
            Some(Utc::now() + chrono::Duration::hours(1)),
        )
        .await
        .expect("import");
    client
}

async fn mount_get(server: &MockServer, p: &str, v: Value) {
    Mock::given(method("GET"))
        .and(path(resource(p)))
        .respond_with(ResponseTemplate::new(200).set_body_json(value_body(p, v)))
        .with_priority(1)
        .mount(server)
        .await;
}

fn token_response(access: &str, refresh: &str) -> Value {
    json!({ "access_token": access, "refresh_token": refresh, "expires_in": 3600, "token_type": "Bearer" })
}

#[tokio::test]
async fn climate_temperature_is_readable_before_next_poll() {
    let server = MockServer::start().await;
    mount_get(&server, HC_OPERATION_MODE, json!("manual")).await;
    Mock::given(method("PUT"))
        .and(path(resource(HC_TEMP_OVERRIDE)))
        .and(header("authorization", "Bearer old"))
        .and(body_json(json!({"value": 22.5})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = authed_client(&server).await;
    client.set_climate_temperature(22.5).await.expect("set");

    let cached = client.read(HC_TEMP_OVERRIDE).expect("cached");
    assert_eq!(cached.number(), Some(22.5));
    assert_eq!(client.climate_state().target_temperature, Some(22.5));
}

#[tokio::test]
async fn out_of_range_climate_temperature_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = authed_client(&server).await;
    for t in [4.5, 30.5, -10.0] {
        let err = client.set_climate_temperature(t).await.unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }), "{t}: {err}");
    }
}

#[tokio::test]
async fn concurrent_requests_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_response("new", "r2"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(resource(GW_FIRMWARE)))
        .and(header("authorization", "Bearer new"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(value_body(GW_FIRMWARE, json!("04.08.02"))),
        )
        .expect(5)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    let client = builder(&server)
        .credential_store(store.clone())
        .build()
        .unwrap();
    client
        .import_tokens("old", Some("r1".into()), Some(Utc::now() - chrono::Duration::seconds(5)))
        .await
        .unwrap();

    let (a, b, c, d, e) = tokio::join!(
        client.test_connection(),
        client.test_connection(),
        client.test_connection(),
        client.test_connection(),
        client.test_connection(),
    );
    for r in [a, b, c, d, e] {
        assert_eq!(r.unwrap(), "04.08.02");
    }

    let saved = store.snapshot().expect("refreshed credential persisted");
    assert_eq!(saved.access_token, "new");
    assert_eq!(saved.refresh_token.as_deref(), Some("r2"));
}

#[tokio::test]
async fn single_401_refreshes_and_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(resource(GW_FIRMWARE)))
        .and(header("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(resource(GW_FIRMWARE)))
        .and(header("authorization", "Bearer new"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(value_body(GW_FIRMWARE, json!("04.08.02"))),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("new", "r2")))
        .expect(1)
        .mount(&server)
        .await;

    let client = authed_client(&server).await;
    assert_eq!(client.test_connection().await.unwrap(), "04.08.02");
}

#[tokio::test]
async fn second_401_is_auth_expired() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(resource(GW_FIRMWARE)))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("new", "r2")))
        .expect(1)
        .mount(&server)
        .await;

    let client = authed_client(&server).await;
    let err = client.test_connection().await.unwrap_err();
    assert!(matches!(err, Error::AuthExpired), "{err}");
}

#[tokio::test]
async fn server_errors_retry_then_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(resource(GW_FIRMWARE)))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = authed_client(&server).await;
    let err = client.test_connection().await.unwrap_err();
    assert!(err.is_transient(), "{err}");
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(resource(GW_FIRMWARE)))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such resource"))
        .expect(1)
        .mount(&server)
        .await;

    let client = authed_client(&server).await;
    let err = client.test_connection().await.unwrap_err();
    assert!(
        matches!(err, Error::InvalidRequest { status: 404, ref message, .. } if message == "no such resource")
    );
}

#[tokio::test]
async fn extra_hot_water_start_is_visible_immediately() {
    let server = MockServer::start().await;
    for (p, v) in [
        (DHW_CHARGE_DURATION, json!(45.0)),
        (DHW_SINGLE_CHARGE_SETPOINT, json!(65.0)),
        (DHW_CHARGE, json!("start")),
    ] {
        Mock::given(method("PUT"))
            .and(path(resource(p)))
            .and(body_json(json!({ "value": v })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = authed_client(&server).await;
    let cmd = client
        .start_extra_hot_water(ExtraHotWater::new(45.0, 65.0))
        .await
        .unwrap();
    assert_eq!(cmd.writes.last().map(|(p, _)| p.as_str()), Some(DHW_CHARGE));

    assert_eq!(client.read(DHW_CHARGE).unwrap().text(), Some("start"));
    let state = client.water_heater_state();
    assert!(state.extra_hot_water_running);
    assert_eq!(state.charge_duration_min, Some(45.0));
    assert_eq!(state.charge_setpoint, Some(65.0));
}

#[tokio::test]
async fn dhw_setpoint_uses_range_of_new_mode() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(resource(DHW_OPERATION_MODE)))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;
    // the gateway reports the mode last written
    mount_get(&server, DHW_OPERATION_MODE, json!("eco")).await;
    Mock::given(method("PUT"))
        .and(path(resource(DHW_TEMP_LOW)))
        .and(body_json(json!({"value": 48.0})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = authed_client(&server).await;
    client.set_water_heater_mode(DhwMode::Comfort).await.unwrap();
    client.set_water_heater_mode(DhwMode::Eco).await.unwrap();

    // 48 is above the comfort limit of 47 but within eco
    client.set_water_heater_temperature(48.0).await.unwrap();
    assert_eq!(client.water_heater_state().target_temperature, Some(48.0));

    let err = client.set_water_heater_temperature(49.0).await.unwrap_err();
    assert!(matches!(err, Error::OutOfRange { max, .. } if max == 48.0));
}

#[tokio::test]
async fn poll_failure_on_one_path_leaves_others() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"/resource/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 1.0})))
        .mount(&server)
        .await;

    let client = authed_client(&server).await;
    let first = client.poll_once().await.unwrap();
    assert!(first.failed.is_empty());
    assert!(first.energy_polled);
    assert_eq!(client.read(HC_ROOM_TEMP).unwrap().number(), Some(1.0));

    server.reset().await;
    Mock::given(method("GET"))
        .and(path(resource(HC_ROOM_TEMP)))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"/resource/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 2.0})))
        .mount(&server)
        .await;

    let second = client.poll_once().await.unwrap();
    assert_eq!(second.failed, vec![HC_ROOM_TEMP.to_string()]);
    assert!(!second.energy_polled);

    assert_eq!(client.read(HC_ROOM_TEMP).unwrap().number(), Some(1.0));
    assert_eq!(client.read(DHW_ACTUAL_TEMP).unwrap().number(), Some(2.0));
    assert!(client.is_available(HC_ROOM_TEMP));
}

#[tokio::test]
async fn repeated_failures_mark_path_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(resource(SYS_OUTDOOR_TEMP)))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"/resource/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 3.0})))
        .mount(&server)
        .await;

    let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(vec![]));
    let sink = events.clone();
    let client = builder(&server)
        .retry_policy(RetryPolicy::no_delay(1))
        .unavailable_after(2)
        .on_event(move |e| sink.lock().unwrap().push(e.clone()))
        .build()
        .unwrap();
    client
        .import_tokens("old", None, Some(Utc::now() + chrono::Duration::hours(1)))
        .await
        .unwrap();

    client.poll_once().await.unwrap();
    assert!(!client.is_available(SYS_OUTDOOR_TEMP));
    client.poll_once().await.unwrap();

    let unavailable: Vec<Event> = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, Event::Unavailable { .. }))
        .cloned()
        .collect();
    assert_eq!(
        unavailable,
        vec![Event::Unavailable {
            path: SYS_OUTDOOR_TEMP.into()
        }]
    );
    assert!(matches!(
        client.read(SYS_OUTDOOR_TEMP),
        Err(Error::Unavailable(_))
    ));
}

#[tokio::test]
async fn energy_recordings_follow_cadence() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(resource(REC_TOTAL_OUTPUT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": REC_TOTAL_OUTPUT,
            "recording": [{"y": 1500.0, "c": 1}, {"y": 1523.5, "c": 1}]
        })))
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"/resource/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 1.0})))
        .mount(&server)
        .await;

    let client = builder(&server).energy_every(2).build().unwrap();
    client
        .import_tokens("old", None, Some(Utc::now() + chrono::Duration::hours(1)))
        .await
        .unwrap();
    for _ in 0..3 {
        client.poll_once().await.unwrap();
    }
    assert_eq!(client.energy_total(REC_TOTAL_OUTPUT), Some(1523.5));
}

#[tokio::test]
async fn same_mode_twice_equals_once() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(resource(HC_OPERATION_MODE)))
        .and(body_json(json!({"value": "auto"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let client = authed_client(&server).await;
    client.set_climate_mode(ClimateMode::Auto).await.unwrap();
    let once = client.climate_state();
    client.set_climate_mode(ClimateMode::Auto).await.unwrap();
    assert_eq!(client.climate_state(), once);
    assert_eq!(once.mode, Some(ClimateMode::Auto));
}

#[tokio::test]
async fn rejected_refresh_requires_reauthorization() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 1})))
        .expect(0)
        .mount(&server)
        .await;

    let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(vec![]));
    let sink = events.clone();
    let client = builder(&server)
        .on_event(move |e| sink.lock().unwrap().push(e.clone()))
        .build()
        .unwrap();
    client
        .import_tokens("old", Some("r1".into()), Some(Utc::now() - chrono::Duration::minutes(1)))
        .await
        .unwrap();

    let err = client.poll_once().await.unwrap_err();
    assert!(matches!(err, Error::RefreshFailed(_)), "{err}");
    assert!(err.needs_reauthorization());
    assert!(
        events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::ReauthorizationRequired { .. }))
    );
}

#[tokio::test]
async fn poll_loop_stops_on_cancel() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"/resource/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 1.0})))
        .mount(&server)
        .await;

    let client = builder(&server)
        .poll_interval(Duration::from_millis(20))
        .build()
        .unwrap();
    client
        .import_tokens("old", None, Some(Utc::now() + chrono::Duration::hours(1)))
        .await
        .unwrap();

    let cancel = tokio_util::sync::CancellationToken::new();
    let handle = client.start_polling(cancel.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop exits after cancel")
        .unwrap();
    assert!(client.read(HC_ROOM_TEMP).is_ok());
}

#[tokio::test]
async fn exchange_redirect_stores_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=ABC123"))
        .and(body_string_contains("code_verifier="))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("fresh", "rf")))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    let client = builder(&server)
        .credential_store(store.clone())
        .build()
        .unwrap();
    let cred = client
        .exchange_redirect("com.bosch.tt.dashtt.pointt://app/login?code=ABC123&state=x")
        .await
        .unwrap();
    assert_eq!(cred.access_token, "fresh");
    assert_eq!(store.snapshot(), Some(cred));

    let err = client
        .exchange_redirect("com.bosch.tt.dashtt.pointt://app/login?error=access_denied")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AuthorizationFailed(_)));
}

#[tokio::test]
async fn command_timeout_leaves_task_running() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(resource(DHW_CHARGE)))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    let client = builder(&server)
        .command_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    client
        .import_tokens("old", None, Some(Utc::now() + chrono::Duration::hours(1)))
        .await
        .unwrap();

    let err = client.stop_extra_hot_water().await.unwrap_err();
    assert!(matches!(err, Error::GatewayUnreachable { .. }), "{err}");

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(client.read(DHW_CHARGE).unwrap().text(), Some("stop"));
}

#[tokio::test]
async fn message_log_records_commands_and_responses() {
    let server = MockServer::start().await;
    mount_get(&server, GW_FIRMWARE, json!("04.08.02")).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let tmp = tempfile::NamedTempFile::new().unwrap();
    let client = builder(&server)
        .message_log(MessageLogMode::Full, tmp.path().to_str().unwrap())
        .build()
        .unwrap();
    client
        .import_tokens("old", None, Some(Utc::now() + chrono::Duration::hours(1)))
        .await
        .unwrap();

    client.test_connection().await.unwrap();
    let cmd = client.set_switch(VT_CH_OPTIMIZATION, true).await.unwrap();

    let lines: Vec<Value> = std::fs::read_to_string(tmp.path())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let dirs: Vec<&str> = lines.iter().filter_map(|l| l["dir"].as_str()).collect();
    assert_eq!(dirs, vec!["req", "resp", "cmd", "req", "resp"]);
    assert_eq!(lines[2]["id"], cmd.id.to_string());
    assert_eq!(lines[2]["writes"][0]["value"], "on");
}

#[tokio::test]
async fn device_info_tolerates_missing_fields() {
    let server = MockServer::start().await;
    mount_get(&server, GW_FIRMWARE, json!("04.08.02")).await;
    mount_get(&server, HS_TYPE, json!("heatPump")).await;
    mount_get(&server, SYS_BRAND, json!("IVT")).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = authed_client(&server).await;
    let info = client.device_info().await.unwrap();
    assert_eq!(info.firmware.as_deref(), Some("04.08.02"));
    assert_eq!(info.source_type.as_deref(), Some("heatPump"));
    assert_eq!(info.brand.as_deref(), Some("IVT"));
    assert!(info.hardware.is_none());
    assert!(info.heat_pump_type.is_none());
}

#[tokio::test]
async fn rejected_token_after_refresh_aborts_the_poll() {
    let server = MockServer::start().await;
    // one 401 before the refresh, one after it, then the cycle stops
    Mock::given(method("GET"))
        .and(path_regex(r"/resource/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("new", "r2")))
        .expect(1)
        .mount(&server)
        .await;

    let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(vec![]));
    let sink = events.clone();
    let client = builder(&server)
        .on_event(move |e| sink.lock().unwrap().push(e.clone()))
        .build()
        .unwrap();
    client
        .import_tokens("old", Some("r1".into()), Some(Utc::now() + chrono::Duration::hours(1)))
        .await
        .unwrap();

    let err = client.poll_once().await.unwrap_err();
    assert!(matches!(err, Error::AuthExpired), "{err}");
    assert!(
        events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::ReauthorizationRequired { .. }))
    );
}

#[tokio::test]
async fn later_completion_wins_between_poll_and_command() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(resource(DHW_CHARGE)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(value_body(DHW_CHARGE, json!("stop")))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(resource(DHW_CHARGE)))
        .and(body_json(json!({"value": "start"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(authed_client(&server).await);
    let poll = {
        let client = client.clone();
        tokio::spawn(async move {
            client.get_many(&[DHW_CHARGE]).await.unwrap();
            client.read(DHW_CHARGE).unwrap()
        })
    };
    // the poll's GET is on the wire; the write queues behind it
    tokio::time::sleep(Duration::from_millis(50)).await;
    client
        .start_extra_hot_water(ExtraHotWater::default())
        .await
        .unwrap();
    let polled = poll.await.unwrap();

    let last = client.read(DHW_CHARGE).unwrap();
    assert_eq!(last.text(), Some("start"));
    assert!(last.observed_at >= polled.observed_at);
    assert!(client.water_heater_state().extra_hot_water_running);
}

#[tokio::test]
async fn poll_fills_notifications_energy_and_starts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(resource(NOTIFICATIONS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": NOTIFICATIONS,
            "type": "errorList",
            "values": [{"dcd": "A11", "ccd": 3061, "cat": "W", "t": "2026-10-01T08:00:00"}]
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(resource(HS_HS1_STARTS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": HS_HS1_STARTS,
            "type": "arrayData",
            "values": [{"ch": 4052}, {"dhw": 519}]
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(resource(REC_CH_COMPRESSOR)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": REC_CH_COMPRESSOR,
            "recording": [{"y": 812.0, "c": 1}, {"y": 815.25, "c": 1}]
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"/resource/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 1.0})))
        .mount(&server)
        .await;

    let client = authed_client(&server).await;
    assert!(client.notifications().is_empty());
    client.poll_once().await.unwrap();

    let notifications = client.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["dcd"], "A11");
    assert_eq!(client.compressor_starts("ch"), Some(4052.0));
    assert_eq!(client.compressor_starts("dhw"), Some(519.0));
    assert_eq!(client.compressor_starts("pool"), None);
    assert_eq!(client.energy_total(REC_CH_COMPRESSOR), Some(815.25));
}
