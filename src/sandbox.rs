//! The five remote operations of an Optable Sandbox.
use std::{collections::HashMap, sync::Arc};

use serde::Serialize;

use crate::{
    advertising_id::{AdvertisingIdState, AdvertisingInfo},
    edge::{EdgeResponse, EdgeService},
    identifiers::Identifier,
    local_storage::LocalStorage,
    Result,
};

/// User traits sent with [`OptableSdk::profile`](crate::OptableSdk::profile).
pub type ProfileTraits = HashMap<String, serde_json::Value>;

/// Event properties sent with [`OptableSdk::witness`](crate::OptableSdk::witness).
pub type WitnessProperties = HashMap<String, serde_json::Value>;

/// Key-values targeting data, e.g. audience segments the visitor belongs to.
pub type TargetingResponse = HashMap<String, Vec<String>>;

/// Success payload of `init`. The sandbox answers `{}`.
pub type InitResponse = HashMap<String, serde_json::Value>;
/// Success payload of `identify`. The sandbox answers `{}`.
pub type IdentifyResponse = HashMap<String, serde_json::Value>;
/// Success payload of `profile`. The sandbox answers `{}`.
pub type ProfileResponse = HashMap<String, serde_json::Value>;
/// Success payload of `witness`. The sandbox answers `{}`.
pub type WitnessResponse = HashMap<String, serde_json::Value>;

#[derive(Serialize)]
struct WitnessBody<'a> {
    event: &'a str,
    properties: &'a WitnessProperties,
}

pub(crate) struct SandboxClient {
    edge: EdgeService,
    storage: Arc<LocalStorage>,
    advertising_id: Arc<AdvertisingIdState>,
}

impl SandboxClient {
    pub fn new(
        edge: EdgeService,
        storage: Arc<LocalStorage>,
        advertising_id: Arc<AdvertisingIdState>,
    ) -> Self {
        SandboxClient {
            edge,
            storage,
            advertising_id,
        }
    }

    pub async fn init(&self) -> EdgeResponse<InitResponse> {
        self.edge.post("init", None::<&()>).await
    }

    pub async fn identify(&self, ids: &[Identifier]) -> EdgeResponse<IdentifyResponse> {
        self.edge.post("identify", Some(ids)).await
    }

    pub async fn profile(&self, traits: &ProfileTraits) -> EdgeResponse<ProfileResponse> {
        self.edge.post("profile", Some(traits)).await
    }

    /// Fetch targeting data. On success, the response replaces the cached one before it is
    /// returned. Failures leave the cache untouched.
    pub async fn targeting(&self) -> EdgeResponse<TargetingResponse> {
        let response = self.edge.get("targeting").await;

        if let EdgeResponse::Success(targeting) = &response {
            if let Err(err) = self.storage.set_targeting(targeting) {
                log::warn!(target: "optable", "failed to cache targeting response: {:?}", err);
            }
        }

        response
    }

    pub async fn witness(
        &self,
        event: &str,
        properties: &WitnessProperties,
    ) -> EdgeResponse<WitnessResponse> {
        let body = WitnessBody { event, properties };
        self.edge.post("witness", Some(&body)).await
    }

    pub fn targeting_from_cache(&self) -> Result<Option<TargetingResponse>> {
        self.storage.get_targeting()
    }

    pub fn targeting_clear_cache(&self) -> Result<()> {
        self.storage.clear_targeting()
    }

    /// Advertising ID info, if detection has completed.
    pub fn advertising_info(&self) -> Option<AdvertisingInfo> {
        self.advertising_id.get()
    }

    /// Whether a usable advertising ID is known.
    pub fn has_advertising_id(&self) -> bool {
        self.advertising_info()
            .map_or(false, |info| info.usable_id().is_some())
    }
}
