//! Fire-and-forget zone submission
//!
//! A committed zone is posted once. The outcome is logged and handed back for
//! observers, but nothing is retried and nothing is rolled back: the session's
//! zone counter has already moved on by the time the request is sent.

use crate::error::ClientError;
use crate::service::ServiceClient;
use tokio::task::JoinHandle;
use zone_watch::ZoneDescriptor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The service answered 200.
    Accepted,
    /// The service answered with another status.
    Rejected { status: u16, body: String },
    /// The request never completed.
    Failed(String),
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

#[derive(Clone)]
pub struct ZoneSubmitter {
    service: ServiceClient,
}

impl ZoneSubmitter {
    pub fn new(service: ServiceClient) -> Self {
        Self { service }
    }

    pub async fn submit(&self, zone: &ZoneDescriptor) -> SubmitOutcome {
        let outcome = match self.service.create_zone(zone).await {
            Ok(_) => SubmitOutcome::Accepted,
            Err(ClientError::Status { status, body }) => SubmitOutcome::Rejected { status, body },
            Err(e) => SubmitOutcome::Failed(e.to_string()),
        };

        match &outcome {
            SubmitOutcome::Accepted => tracing::info!(zone_id = %zone.zone_id, "Made region"),
            SubmitOutcome::Rejected { status, body } => {
                tracing::warn!(zone_id = %zone.zone_id, status, "Zone rejected: {body}")
            }
            SubmitOutcome::Failed(reason) => {
                tracing::warn!(zone_id = %zone.zone_id, "Zone submission failed: {reason}")
            }
        }
        outcome
    }

    /// Submits on a background task; the caller may ignore the handle.
    pub fn spawn(&self, zone: ZoneDescriptor) -> JoinHandle<SubmitOutcome> {
        let submitter = self.clone();
        tokio::spawn(async move { submitter.submit(&zone).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::service::tests::spawn_fake_service;
    use tokio::net::TcpListener;
    use zone_watch::ZoneCoordinates;

    fn zone(id: &str) -> ZoneDescriptor {
        ZoneDescriptor {
            zone_id: id.to_string(),
            coordinates: ZoneCoordinates { x_min: 200, y_min: 200, x_max: 400, y_max: 300 },
        }
    }

    #[tokio::test]
    async fn accepted_on_200() {
        let (config, svc) = spawn_fake_service(200).await;
        let submitter = ZoneSubmitter::new(ServiceClient::new(&config).unwrap());

        let outcome = submitter.spawn(zone("zone-1")).await.unwrap();
        assert!(outcome.is_accepted());

        let bodies = svc.bodies.lock().unwrap();
        assert_eq!(bodies[0].0, "/create_zone");
        assert_eq!(bodies[0].1, serde_json::to_value(zone("zone-1")).unwrap());
    }

    #[tokio::test]
    async fn rejected_on_other_status() {
        let (config, _svc) = spawn_fake_service(500).await;
        let submitter = ZoneSubmitter::new(ServiceClient::new(&config).unwrap());

        let outcome = submitter.submit(&zone("zone-2")).await;
        assert_eq!(outcome, SubmitOutcome::Rejected { status: 500, body: "Made region".into() });
    }

    #[tokio::test]
    async fn failed_when_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ClientConfig::from_lookup(|key| match key {
            "ZW_SERVICE_URL" => Some(format!("http://{addr}")),
            _ => None,
        })
        .unwrap();
        let submitter = ZoneSubmitter::new(ServiceClient::new(&config).unwrap());

        assert!(matches!(submitter.submit(&zone("zone-3")).await, SubmitOutcome::Failed(_)));
    }
}
