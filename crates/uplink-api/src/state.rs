//! Shared application state.

use uplink_core::UploadLimits;
use uplink_pipeline::UploadPipeline;

pub struct AppState {
    pub pipeline: UploadPipeline,
    pub limits: UploadLimits,
}
