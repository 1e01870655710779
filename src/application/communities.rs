//! Community listing and detail, read straight from the durable store.

use std::sync::Arc;

use tracing::instrument;

use crate::application::error::AppError;
use crate::application::repos::CommunitiesRepo;
use crate::domain::entities::CommunityRecord;
use crate::domain::types::CommunityId;

#[derive(Clone)]
pub struct CommunityService {
    communities: Arc<dyn CommunitiesRepo>,
}

impl CommunityService {
    pub fn new(communities: Arc<dyn CommunitiesRepo>) -> Self {
        Self { communities }
    }

    pub async fn list_communities(&self) -> Result<Vec<CommunityRecord>, AppError> {
        Ok(self.communities.list_communities().await?)
    }

    #[instrument(skip(self))]
    pub async fn community_detail(&self, id: CommunityId) -> Result<CommunityRecord, AppError> {
        self.communities
            .find_community(id)
            .await?
            .ok_or(AppError::not_found("community"))
    }
}
