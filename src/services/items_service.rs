use std::sync::Arc;

use chrono::Utc;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::middleware::AuthenticatedUser;
use crate::models::{Item as ItemModel, ItemFilter, ItemStatus, ItemType};
use crate::proto::common::Empty;
use crate::proto::items::items_service_server::ItemsService;
use crate::proto::items::{
    DeleteItemReq, EscalateItemReq, GetItemReq, GetItemRes, Item, ItemRes,
    ListEscalationCandidatesReq, ListItemsReq, ListItemsRes, PoliceVerifyReq, PurgeExpiredRes,
    SubmitClaimReq, SubmitClaimRes, SubmitReportReq, SubmitReportRes, ToggleRecoveredReq,
    VerifyClaimReq, VerifyClaimRes,
};
use crate::services::lost_found::{ImageUpload, LostFoundService, ReportInput};

pub struct ItemsServiceImpl {
    service: Arc<LostFoundService>,
}

impl ItemsServiceImpl {
    pub fn new(service: Arc<LostFoundService>) -> Self {
        Self { service }
    }

    fn get_authenticated_user<T>(request: &Request<T>) -> Result<AuthenticatedUser, Status> {
        request
            .extensions()
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| Status::unauthenticated("Authentication required"))
    }

    fn parse_id(id: &str, field: &str) -> Result<Uuid, Status> {
        if id.is_empty() {
            return Err(Status::invalid_argument(format!("{} is required", field)));
        }
        Uuid::parse_str(id)
            .map_err(|_| Status::invalid_argument(format!("{} must be a UUID", field)))
    }

    fn non_empty(value: &str) -> Option<&str> {
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// Public projection; the identifier hash and token stay server-side.
    fn model_to_proto(model: &ItemModel) -> Item {
        Item {
            id: model.id.to_string(),
            name: model.name.clone(),
            description: model.description.clone(),
            location: model.location.clone(),
            college: model.college.clone(),
            contact: model.contact.clone(),
            item_type: model.item_type.to_string(),
            reporter_email: model.reporter_email.clone(),
            image_url: model.image_url.clone().unwrap_or_default(),
            ai_category: model.ai_category.clone(),
            has_identifier: model.identifier_hash.is_some(),
            status: model.status.to_string(),
            feedback: model.feedback.clone().unwrap_or_default(),
            police_case_id: model
                .police_case
                .as_ref()
                .map(|c| c.case_id.clone())
                .unwrap_or_default(),
            verified_at: model
                .police_case
                .as_ref()
                .map(|c| c.verified_at.to_rfc3339())
                .unwrap_or_default(),
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

#[tonic::async_trait]
impl ItemsService for ItemsServiceImpl {
    async fn submit_report(
        &self,
        request: Request<SubmitReportReq>,
    ) -> Result<Response<SubmitReportRes>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let req = request.into_inner();

        let image = if req.image.is_empty() {
            None
        } else {
            Some(ImageUpload {
                data: req.image,
                content_type: Self::non_empty(&req.image_content_type)
                    .unwrap_or("image/jpeg")
                    .to_string(),
            })
        };

        let outcome = self
            .service
            .submit_report(
                &auth_user,
                ReportInput {
                    item_type: req.item_type,
                    name: req.name,
                    description: req.description,
                    location: req.location,
                    college: req.college,
                    contact: req.contact,
                    identifier: req.identifier,
                    image,
                },
            )
            .await?;

        Ok(Response::new(SubmitReportRes {
            item: Some(Self::model_to_proto(&outcome.item)),
            ai_category: outcome.ai_category.clone(),
            match_detected: outcome.match_detected(),
            matched_item_id: outcome
                .matched
                .as_ref()
                .map(|m| m.id.to_string())
                .unwrap_or_default(),
        }))
    }

    async fn get_item(
        &self,
        request: Request<GetItemReq>,
    ) -> Result<Response<GetItemRes>, Status> {
        Self::get_authenticated_user(&request)?;
        let req = request.into_inner();
        let id = Self::parse_id(&req.id, "id")?;

        let item = self.service.get_item(id).await?;
        Ok(Response::new(GetItemRes {
            item: Some(Self::model_to_proto(&item)),
        }))
    }

    async fn list_items(
        &self,
        request: Request<ListItemsReq>,
    ) -> Result<Response<ListItemsRes>, Status> {
        Self::get_authenticated_user(&request)?;
        let req = request.into_inner();

        let filter = ItemFilter {
            item_type: Self::non_empty(&req.item_type)
                .map(str::parse::<ItemType>)
                .transpose()?,
            status: Self::non_empty(&req.status)
                .map(str::parse::<ItemStatus>)
                .transpose()?,
            college: Self::non_empty(&req.college).map(str::to_string),
            limit: i64::from(req.limit),
        };

        let items = self.service.list_items(&filter).await?;
        Ok(Response::new(ListItemsRes {
            items: items.iter().map(Self::model_to_proto).collect(),
        }))
    }

    async fn list_escalation_candidates(
        &self,
        request: Request<ListEscalationCandidatesReq>,
    ) -> Result<Response<ListItemsRes>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let req = request.into_inner();

        let items = self
            .service
            .list_escalation_candidates(&auth_user, Utc::now(), Self::non_empty(&req.college))
            .await?;
        Ok(Response::new(ListItemsRes {
            items: items.iter().map(Self::model_to_proto).collect(),
        }))
    }

    async fn verify_claim(
        &self,
        request: Request<VerifyClaimReq>,
    ) -> Result<Response<VerifyClaimRes>, Status> {
        Self::get_authenticated_user(&request)?;
        let req = request.into_inner();
        let id = Self::parse_id(&req.item_id, "item_id")?;

        let verification = self.service.verify_claim(id, &req.identifier).await?;
        Ok(Response::new(VerifyClaimRes {
            matched: verification.matched,
            stored_hash_preview: verification.stored_hash_preview,
        }))
    }

    async fn submit_claim(
        &self,
        request: Request<SubmitClaimReq>,
    ) -> Result<Response<SubmitClaimRes>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let req = request.into_inner();
        let id = Self::parse_id(&req.item_id, "item_id")?;

        let outcome = self
            .service
            .submit_claim(&auth_user, id, &req.identifier, &req.evidence)
            .await?;
        Ok(Response::new(SubmitClaimRes {
            matched: outcome.matched,
            reporter_notified: outcome.reporter_notified,
        }))
    }

    async fn toggle_recovered(
        &self,
        request: Request<ToggleRecoveredReq>,
    ) -> Result<Response<ItemRes>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let req = request.into_inner();
        let id = Self::parse_id(&req.id, "id")?;

        let item = self
            .service
            .toggle_recovered(&auth_user, id, &req.feedback)
            .await?;
        Ok(Response::new(ItemRes {
            item: Some(Self::model_to_proto(&item)),
        }))
    }

    async fn escalate_item(
        &self,
        request: Request<EscalateItemReq>,
    ) -> Result<Response<ItemRes>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let req = request.into_inner();
        let id = Self::parse_id(&req.id, "id")?;

        let item = self.service.escalate(&auth_user, id).await?;
        Ok(Response::new(ItemRes {
            item: Some(Self::model_to_proto(&item)),
        }))
    }

    async fn police_verify(
        &self,
        request: Request<PoliceVerifyReq>,
    ) -> Result<Response<ItemRes>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let req = request.into_inner();
        let id = Self::parse_id(&req.id, "id")?;

        let item = self.service.police_verify(&auth_user, id).await?;
        Ok(Response::new(ItemRes {
            item: Some(Self::model_to_proto(&item)),
        }))
    }

    async fn delete_item(
        &self,
        request: Request<DeleteItemReq>,
    ) -> Result<Response<Empty>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let req = request.into_inner();
        let id = Self::parse_id(&req.id, "id")?;

        self.service.delete_item(&auth_user, id).await?;
        Ok(Response::new(Empty {}))
    }

    async fn purge_expired(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<PurgeExpiredRes>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        auth_user.require_admin()?;

        let removed = self.service.purge_expired(Utc::now()).await?;
        Ok(Response::new(PurgeExpiredRes { removed }))
    }
}
