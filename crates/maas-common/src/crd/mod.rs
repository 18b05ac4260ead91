//! Data model for tiers and the external resources they are attached to

mod inference_service;
mod tier;

pub use inference_service::{
    GroupMembers, InferenceService, LlmInferenceServiceResource, OpenShiftGroupResource,
};
pub use tier::{Tier, TierConfig, TierUpdate, UserTier, LEVEL_UNCHANGED};
