//! Device, automation, timeline and settings operations

mod common;

use abode_client::client::{urls, AlarmMode};
use abode_client::{AbodeApi, AbodeError, ApiRequest, ClientConfig};
use common::*;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use serial_test::serial;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_devices_skip_unknown_types_and_filter() {
    let mock = MockAbodeServer::start().await;
    mock.mock_get_json(urls::DEVICES, devices_doc()).await;
    mock.mock_get_json(urls::PANEL, json!({"mode": {"area_1": "home"}})).await;

    let client = mock.client();
    let devices = client.get_devices(false, None).await.unwrap();
    let ids: Vec<&str> = devices.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["RF:00000001", "ZW:00000002"]);

    let locks = client.get_devices(false, Some("lock")).await.unwrap();
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0].name, "Back Door Lock");

    // cached: no second listing call
    assert_eq!(mock.count(urls::DEVICES).await, 1);
    assert!(client.get_device("RF:00000001", false).await.unwrap().is_some());
    assert!(client.get_device("XX:00000003", false).await.unwrap().is_none());
}

#[tokio::test]
async fn test_alarm_synthesized_from_merged_panel() {
    let mock = MockAbodeServer::start().await;
    mock.mock_get_json(urls::DEVICES, json!([])).await;
    mock.mock_get_json(urls::PANEL, json!({"mode": {"area_1": "away", "area_2": "home"}}))
        .await;

    let client = mock.client();
    let alarm = client.get_alarm("1").await.unwrap();
    assert_eq!(alarm.id, "area_1");
    assert_eq!(alarm.mode, AlarmMode::Away);
    // fields only present in the login panel survive the merge
    assert_eq!(alarm.name, "Test Home");
    assert_eq!(alarm.mac.as_deref(), Some("AA:BB:CC:DD:EE:FF"));

    assert_eq!(client.get_alarm("2").await.unwrap().mode, AlarmMode::Home);
}

#[tokio::test]
async fn test_automations_missing_endpoint_means_none() {
    let mock = MockAbodeServer::start().await;
    mock.mock_get_status(urls::AUTOMATION, 404).await;

    let client = mock.client();
    assert!(client.get_automations(false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_automations_listed() {
    let mock = MockAbodeServer::start().await;
    mock.mock_get_json(
        urls::AUTOMATION,
        json!([{"id": 1, "name": "Night", "enabled": true}, {"id": "2", "name": "Away", "enabled": false}]),
    )
    .await;

    let automations = mock.client().get_automations(true).await.unwrap();
    let names: Vec<&str> = automations.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Night", "Away"]);
}

#[tokio::test]
async fn test_set_setting_puts_validated_body() {
    let mock = MockAbodeServer::start().await;
    Mock::given(method("PUT"))
        .and(path(urls::AREAS))
        .and(body_json(json!({"area": "1", "away_exit_delay": "60"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"away_exit_delay": "60"})))
        .expect(1)
        .mount(&mock.server)
        .await;

    let client = mock.client();
    let response = client.set_setting("away_exit_delay", "60", "1").await.unwrap();
    assert_eq!(response["away_exit_delay"], "60");

    let error = client.set_setting("away_exit_delay", "5", "1").await.unwrap_err();
    assert!(matches!(error, AbodeError::InvalidInput(_)));
}

#[tokio::test]
async fn test_raise_on_error_false_returns_response() {
    let mock = MockAbodeServer::start().await;
    Mock::given(method("GET"))
        .and(path(urls::PANEL))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream failure"))
        .expect(2)
        .mount(&mock.server)
        .await;

    let client = mock.client();
    let response = client
        .send(ApiRequest::get(urls::PANEL).raise_on_error(false))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 500);
    assert_eq!(response.as_text(), "upstream failure");

    let error = client.send(ApiRequest::get(urls::PANEL)).await.unwrap_err();
    assert!(matches!(error, AbodeError::Api { status: Some(500), .. }));
}

#[tokio::test]
async fn test_timeline_events_listed() {
    let mock = MockAbodeServer::start().await;
    mock.mock_get_json(
        urls::TIMELINE,
        json!([{"id": "101", "event_name": "Alarm"}, {"id": "102", "event_name": "Disarmed"}]),
    )
    .await;

    let client = mock.client();
    let events = client.get_timeline_events(2).await.unwrap();
    assert_eq!(events.len(), 2);

    let requests = mock.requests_to(urls::TIMELINE).await;
    assert_eq!(requests[0].url.query(), Some("size=2"));
}

#[rstest]
#[case::acknowledge(true)]
#[case::dismiss(false)]
#[tokio::test]
async fn test_timeline_event_processing(#[case] acknowledge: bool) {
    let mock = MockAbodeServer::start().await;
    let endpoint = if acknowledge {
        urls::timeline_verify_alarm("555")
    } else {
        urls::timeline_ignore_alarm("555")
    };
    Mock::given(method("POST"))
        .and(path(endpoint.as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"code": 200, "message": "OK", "tid": 555})),
        )
        .expect(1)
        .mount(&mock.server)
        .await;

    let client = mock.client();
    let processed = if acknowledge {
        client.acknowledge_timeline_event("555").await
    } else {
        client.dismiss_timeline_event("555").await
    };
    assert!(processed.unwrap());
}

#[tokio::test]
async fn test_timeline_tid_mismatch_is_rejected() {
    let mock = MockAbodeServer::start().await;
    Mock::given(method("POST"))
        .and(path(urls::timeline_verify_alarm("555").as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"code": 200, "message": "OK", "tid": "999"})),
        )
        .mount(&mock.server)
        .await;

    let error = mock.client().acknowledge_timeline_event("555").await.unwrap_err();
    assert!(matches!(error, AbodeError::Api { .. }));
}

#[tokio::test]
async fn test_timeline_already_processed_counts_as_success() {
    let mock = MockAbodeServer::start().await;
    Mock::given(method("POST"))
        .and(path(urls::timeline_ignore_alarm("777").as_str()))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errorCode": 1234,
            "message": "This event has already been dismissed"
        })))
        .mount(&mock.server)
        .await;
    Mock::given(method("POST"))
        .and(path(urls::timeline_ignore_alarm("778").as_str()))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errorCode": 4,
            "message": "Event not found"
        })))
        .mount(&mock.server)
        .await;

    let client = mock.client();
    assert!(client.dismiss_timeline_event("777").await.unwrap());
    assert!(matches!(
        client.dismiss_timeline_event("778").await,
        Err(AbodeError::Api { status: Some(400), .. })
    ));
}

#[tokio::test]
#[serial]
async fn test_client_built_from_environment_configuration() {
    let mock = MockAbodeServer::start().await;
    mock.mock_get_json(urls::PANEL, json!({"mode": {"area_1": "standby"}})).await;

    let config = temp_env::with_vars(
        [
            ("ABODE_BASE_URL", Some(mock.base_url.as_str())),
            ("ABODE_SESSION__MONITOR_ENABLED", Some("false")),
            ("ABODE_RETRY__MAX_ATTEMPTS", Some("2")),
        ],
        || ClientConfig::load(None),
    )
    .unwrap();
    assert_eq!(config.retry.max_attempts, 2);

    let client = mock.client_with(config);
    let response = client.send(ApiRequest::get(urls::PANEL)).await.unwrap();
    assert!(response.is_success());
}
