use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, instrument};

use crate::api::{ProcessError, ProcessRequest, ProcessResult};
use crate::postprocess::{postprocess, RandomSource};
use crate::preprocess::preprocess;
use crate::store::ProfileStore;

/// Runs preprocess, profile lookup and postprocess for one request, in that order.
///
/// Invocations share nothing but the store, so a single `Pipeline` can serve any number of
/// concurrent requests. The CPU stages run on the calling task without yielding.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn ProfileStore + Send + Sync>,
    random: Arc<dyn RandomSource>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ProfileStore + Send + Sync>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self { store, random }
    }

    /// Validation and the lookup are the only stages that can fail. Nothing runs for an
    /// invalid request, and a failed lookup discards the preprocessed digest.
    #[instrument(skip_all, fields(user_id = request.user_id))]
    pub async fn process(&self, request: ProcessRequest) -> Result<ProcessResult, ProcessError> {
        let request = request.validate()?;
        let start = Instant::now();

        let preprocessed = preprocess(&request.data);
        debug!(preprocessed = %preprocessed, "preprocessed request data");

        let profile = self.store.lookup(request.user_id).await?;

        let processed_data = postprocess(&preprocessed, &profile, &mut self.random.generator());

        let processing_time = start.elapsed();
        metrics::histogram!("workload_pipeline_seconds").record(processing_time.as_secs_f64());

        Ok(ProcessResult {
            processed_data,
            user_profile: profile,
            timestamp: Utc::now(),
            processing_time,
        })
    }
}
