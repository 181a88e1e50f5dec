use std::time::Duration;

use arrwatch::backends::{ArrHttp, HttpSettings, QueueBackend, RadarrBackend, SonarrBackend};
use arrwatch::instance::{InstanceConfig, InstanceKind};
use arrwatch::queue::{FailureKind, ItemStatus};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http() -> ArrHttp {
    ArrHttp::new(&HttpSettings {
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_millis(500),
    })
    .unwrap()
}

fn instance(server: &MockServer, kind: InstanceKind) -> InstanceConfig {
    InstanceConfig::new(kind.kind_id(), kind, &server.uri(), "secret", "").unwrap()
}

#[tokio::test]
async fn sonarr_queue_is_normalised() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/queue/details"))
        .and(query_param("includeSeries", "true"))
        .and(query_param("includeEpisode", "true"))
        .and(header("X-Api-Key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "title": "Show.S01E02.1080p",
            "status": "downloading",
            "trackedDownloadStatus": "ok",
            "trackedDownloadState": "downloading",
            "size": 1000.0,
            "sizeleft": 250.0,
            "timeleft": "00:12:34",
            "estimatedCompletionTime": "2024-05-01T18:30:00Z",
            "series": {
                "title": "Show",
                "images": [
                    { "coverType": "banner", "remoteUrl": "http://img/banner.jpg" },
                    { "coverType": "poster", "remoteUrl": "http://img/poster.jpg" }
                ]
            },
            "episode": { "title": "Pilot", "seasonNumber": 1, "episodeNumber": 2 }
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let items = SonarrBackend::new(http())
        .fetch_queue(&instance(&server, InstanceKind::Sonarr))
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.instance_id, "sonarr");
    assert_eq!(item.title, "Show.S01E02.1080p");
    assert_eq!(item.progress, Some(0.75));
    assert_eq!(item.status, ItemStatus::Downloading);
    assert_eq!(item.time_left.as_deref(), Some("00:12:34"));
    assert_eq!(item.estimated_completion.as_deref(), Some("01.05.2024 18:30:00"));
    assert_eq!(item.detail.as_deref(), Some("S01E02 · Pilot"));
    assert_eq!(item.poster_url.as_deref(), Some("http://img/poster.jpg"));
}

#[tokio::test]
async fn radarr_accepts_paged_records() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/queue/details"))
        .and(query_param("includeMovie", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "page": 1,
            "records": [{
                "title": "Film.2020.2160p",
                "status": "paused",
                "size": 0,
                "errorMessage": "disk full",
                "movie": { "title": "Film", "year": 2020, "images": [] }
            }]
        })))
        .mount(&server)
        .await;

    let items = RadarrBackend::new(http())
        .fetch_queue(&instance(&server, InstanceKind::Radarr))
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].progress, None);
    assert_eq!(items[0].status, ItemStatus::Paused);
    assert_eq!(items[0].detail.as_deref(), Some("Film (2020)"));
    assert_eq!(items[0].error_message.as_deref(), Some("disk full"));
    assert_eq!(items[0].poster_url, None);
}

#[tokio::test]
async fn empty_queue_is_ok() {
    let server = MockServer::start().await;
    Mock::given(path("/api/v3/queue/details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let items = SonarrBackend::new(http())
        .fetch_queue(&instance(&server, InstanceKind::Sonarr))
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn rejected_key_is_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(path("/api/v3/queue/details"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = SonarrBackend::new(http())
        .fetch_queue(&instance(&server, InstanceKind::Sonarr))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Auth);
}

#[tokio::test]
async fn missing_endpoint_is_unreachable_feature() {
    let server = MockServer::start().await;
    Mock::given(path("/api/v3/queue/details"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = RadarrBackend::new(http())
        .fetch_queue(&instance(&server, InstanceKind::Radarr))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::UnreachableFeature);
}

#[tokio::test]
async fn server_error_is_network_failure() {
    let server = MockServer::start().await;
    Mock::given(path("/api/v3/queue/details"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = RadarrBackend::new(http())
        .fetch_queue(&instance(&server, InstanceKind::Radarr))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Network);
    assert!(err.message.contains("503"));
}

#[tokio::test]
async fn unexpected_body_is_malformed_response() {
    let server = MockServer::start().await;
    Mock::given(path("/api/v3/queue/details"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let err = SonarrBackend::new(http())
        .fetch_queue(&instance(&server, InstanceKind::Sonarr))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::MalformedResponse);
}

#[tokio::test]
async fn slow_instance_times_out() {
    let server = MockServer::start().await;
    Mock::given(path("/api/v3/queue/details"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = SonarrBackend::new(http())
        .fetch_queue(&instance(&server, InstanceKind::Sonarr))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn base_url_path_prefix_is_kept() {
    let server = MockServer::start().await;
    Mock::given(path("/sonarr/api/v3/queue/details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let instance = InstanceConfig::new(
        "tv",
        InstanceKind::Sonarr,
        &format!("{}/sonarr", server.uri()),
        "secret",
        "TV",
    )
    .unwrap();
    SonarrBackend::new(http()).fetch_queue(&instance).await.unwrap();
}
