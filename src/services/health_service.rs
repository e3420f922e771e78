use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::proto::health::{
    health_check_response::ServingStatus, health_server::Health, HealthCheckRequest,
    HealthCheckResponse,
};
use crate::proto::items::items_service_server::SERVICE_NAME as ITEMS_SERVICE;

/// gRPC health endpoint. Answers for the whole server (empty name) and for
/// the items service; any other name is `NotFound`.
#[derive(Debug, Default)]
pub struct HealthServiceImpl;

impl HealthServiceImpl {
    pub fn new() -> Self {
        Self
    }

    fn status_for(service: &str) -> Result<HealthCheckResponse, Status> {
        if service.is_empty() || service == ITEMS_SERVICE {
            Ok(HealthCheckResponse {
                status: ServingStatus::Serving.into(),
            })
        } else {
            Err(Status::not_found(format!("Unknown service: {}", service)))
        }
    }
}

#[tonic::async_trait]
impl Health for HealthServiceImpl {
    async fn check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let response = Self::status_for(&request.get_ref().service)?;
        Ok(Response::new(response))
    }

    type WatchStream = ReceiverStream<Result<HealthCheckResponse, Status>>;

    async fn watch(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let response = Self::status_for(&request.get_ref().service)?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);

        tokio::spawn(async move {
            let _ = tx.send(Ok(response)).await;
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
