//! The Job record that travels `Q_enc` -> `Q_ret` -> `Q_llm`.
//!
//! A Job is append-only: each stage may only fill fields it owns, never
//! overwrite a field a previous stage already populated. `set_*` methods
//! enforce this at runtime rather than by convention, so a bug that causes a
//! stage to run twice on the same job fails loudly instead of silently
//! clobbering data (invariant 4 in SPEC_FULL.md §8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::errors::AppError;

/// Per-stage wall-clock timings, in milliseconds, filled in as the job
/// progresses. `None` means that stage hasn't run yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StageTimings {
    pub encode_ms: Option<u64>,
    pub retrieve_ms: Option<u64>,
    pub generate_ms: Option<u64>,
}

/// The progressively augmented record of a single user query as it traverses
/// the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub job_id: Uuid,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub selected_replica: usize,

    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub contexts: Option<Vec<String>>,
    #[serde(default)]
    pub augmented_prompt: Option<String>,
    #[serde(default)]
    pub timings: StageTimings,
}

impl Job {
    /// Construct a new Job as the ingress does: no stage has touched it yet.
    pub fn new(job_id: Uuid, text: String, selected_replica: usize) -> Self {
        Self {
            job_id,
            text,
            timestamp: Utc::now(),
            selected_replica,
            embedding: None,
            contexts: None,
            augmented_prompt: None,
            timings: StageTimings::default(),
        }
    }

    /// Encoder stage: fill `embedding` exactly once.
    pub fn set_embedding(&mut self, embedding: Vec<f32>, encode_ms: u64) -> Result<(), AppError> {
        if self.embedding.is_some() {
            return Err(AppError::BadInput(format!(
                "job {} already has an embedding",
                self.job_id
            )));
        }
        self.embedding = Some(embedding);
        self.timings.encode_ms = Some(encode_ms);
        Ok(())
    }

    /// Retriever stage: fill `contexts` and `augmented_prompt` exactly once.
    pub fn set_retrieval(
        &mut self,
        contexts: Vec<String>,
        augmented_prompt: String,
        retrieve_ms: u64,
    ) -> Result<(), AppError> {
        if self.contexts.is_some() || self.augmented_prompt.is_some() {
            return Err(AppError::BadInput(format!(
                "job {} already has retrieval results",
                self.job_id
            )));
        }
        self.contexts = Some(contexts);
        self.augmented_prompt = Some(augmented_prompt);
        self.timings.retrieve_ms = Some(retrieve_ms);
        Ok(())
    }

    /// Record the generator's own timing (the completion record itself lives
    /// in the KV store, not on the Job — but a worker may want to stamp its
    /// own copy before discarding it).
    pub fn set_generate_timing(&mut self, generate_ms: u64) -> Result<(), AppError> {
        if self.timings.generate_ms.is_some() {
            return Err(AppError::BadInput(format!(
                "job {} already has a generation timing",
                self.job_id
            )));
        }
        self.timings.generate_ms = Some(generate_ms);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job::new(Uuid::now_v7(), "what is rust?".to_string(), 0)
    }

    #[test]
    fn new_job_has_no_downstream_fields() {
        let job = sample_job();
        assert!(job.embedding.is_none());
        assert!(job.contexts.is_none());
        assert!(job.augmented_prompt.is_none());
    }

    #[test]
    fn set_embedding_twice_is_rejected() {
        let mut job = sample_job();
        job.set_embedding(vec![1.0, 0.0], 5).unwrap();
        let err = job.set_embedding(vec![0.0, 1.0], 5).unwrap_err();
        assert!(matches!(err, AppError::BadInput(_)));
    }

    #[test]
    fn set_retrieval_before_embedding_is_allowed_by_the_type_but_not_by_the_pipeline() {
        // The Job type itself doesn't enforce encode-before-retrieve ordering;
        // that invariant is enforced by which queue a worker reads from
        // (a retriever only ever sees jobs popped off Q_ret, which the
        // encoder only pushes to after calling set_embedding).
        let mut job = sample_job();
        job.set_retrieval(vec![], "what is rust?".to_string(), 1)
            .unwrap();
        assert_eq!(job.augmented_prompt.as_deref(), Some("what is rust?"));
    }

    #[test]
    fn job_round_trips_through_json_unchanged() {
        let mut job = sample_job();
        job.set_embedding(vec![0.6, 0.8], 12).unwrap();
        job.set_retrieval(
            vec!["Paris is the capital of France.".to_string()],
            "Context...".to_string(),
            7,
        )
        .unwrap();

        let serialized = serde_json::to_string(&job).unwrap();
        let deserialized: Job = serde_json::from_str(&serialized).unwrap();
        assert_eq!(job, deserialized);
    }
}
