//! HTTP calls to the analysis service

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use reqwest::StatusCode;
use serde::Serialize;
use url::Url;
use zone_watch::ZoneDescriptor;

pub const PROCESS_STREAM_ROUTE: &str = "process_stream";
pub const CREATE_ZONE_ROUTE: &str = "create_zone";
pub const GENERATE_HEATMAP_ROUTE: &str = "generate_heatmap";

/// Video source used when none is given.
pub const DEFAULT_VIDEO_STREAM_URL: &str = "./data/output_1.mp4";

#[derive(Debug, Serialize)]
struct ProcessRequest<'a> {
    video_stream_url: &'a str,
    zones: Vec<ZoneDescriptor>,
}

#[derive(Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    process_url: Url,
    create_zone_url: Url,
    heatmap_url: Url,
}

impl ServiceClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            process_url: config.endpoint(PROCESS_STREAM_ROUTE)?,
            create_zone_url: config.endpoint(CREATE_ZONE_ROUTE)?,
            heatmap_url: config.endpoint(GENERATE_HEATMAP_ROUTE)?,
        })
    }

    /// Asks the service to start analysing `video_stream_url` with no zones yet.
    pub async fn start_processing(&self, video_stream_url: &str) -> Result<String> {
        let body = ProcessRequest { video_stream_url, zones: Vec::new() };
        let response = self
            .http
            .post(self.process_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        expect_ok(response).await
    }

    /// Requests a heatmap render and returns the service's reply body.
    pub async fn generate_heatmap(&self) -> Result<String> {
        let response = self.http.get(self.heatmap_url.clone()).send().await.map_err(transport)?;
        expect_ok(response).await
    }

    /// Posts one zone. Used through [`crate::submitter::ZoneSubmitter`].
    pub(crate) async fn create_zone(&self, zone: &ZoneDescriptor) -> Result<String> {
        let response = self
            .http
            .post(self.create_zone_url.clone())
            .json(zone)
            .send()
            .await
            .map_err(transport)?;
        expect_ok(response).await
    }
}

fn transport(e: reqwest::Error) -> ClientError {
    ClientError::TransportFailure(e.to_string())
}

/// Only 200 counts as success; anything else is reported with its body.
async fn expect_ok(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await.map_err(transport)?;
    if status == StatusCode::OK {
        Ok(body)
    } else {
        Err(ClientError::Status { status: status.as_u16(), body })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    /// Records every JSON body posted to it and answers with `status`.
    #[derive(Clone)]
    pub(crate) struct FakeService {
        pub(crate) bodies: Arc<Mutex<Vec<(String, Value)>>>,
        pub(crate) status: Arc<Mutex<u16>>,
    }

    async fn record(
        State(svc): State<FakeService>,
        uri: axum::http::Uri,
        Json(body): Json<Value>,
    ) -> (AxumStatus, String) {
        svc.bodies.lock().unwrap().push((uri.path().to_string(), body));
        let status = *svc.status.lock().unwrap();
        (AxumStatus::from_u16(status).unwrap(), "Made region".to_string())
    }

    async fn heatmap(State(svc): State<FakeService>) -> (AxumStatus, String) {
        let status = *svc.status.lock().unwrap();
        (AxumStatus::from_u16(status).unwrap(), "heatmap.png".to_string())
    }

    pub(crate) async fn spawn_fake_service(status: u16) -> (ClientConfig, FakeService) {
        let svc = FakeService {
            bodies: Arc::new(Mutex::new(Vec::new())),
            status: Arc::new(Mutex::new(status)),
        };
        let app = Router::new()
            .route("/process_stream", post(record))
            .route("/create_zone", post(record))
            .route("/generate_heatmap", get(heatmap))
            .with_state(svc.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let service_url = format!("http://{addr}");
        let config = ClientConfig::from_lookup(move |key| match key {
            "ZW_SERVICE_URL" => Some(service_url.clone()),
            _ => None,
        })
        .unwrap();
        (config, svc)
    }

    #[tokio::test]
    async fn start_processing_posts_empty_zone_list() {
        let (config, svc) = spawn_fake_service(200).await;
        let client = ServiceClient::new(&config).unwrap();

        client.start_processing(DEFAULT_VIDEO_STREAM_URL).await.unwrap();

        let bodies = svc.bodies.lock().unwrap();
        assert_eq!(bodies[0].0, "/process_stream");
        assert_eq!(
            bodies[0].1,
            serde_json::json!({ "video_stream_url": "./data/output_1.mp4", "zones": [] })
        );
    }

    #[tokio::test]
    async fn non_200_is_reported_with_body() {
        let (config, _svc) = spawn_fake_service(201).await;
        let client = ServiceClient::new(&config).unwrap();

        let err = client.generate_heatmap().await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 201, ref body } if body == "heatmap.png"));
    }

    #[tokio::test]
    async fn heatmap_body_is_returned() {
        let (config, _svc) = spawn_fake_service(200).await;
        let client = ServiceClient::new(&config).unwrap();
        assert_eq!(client.generate_heatmap().await.unwrap(), "heatmap.png");
    }
}
