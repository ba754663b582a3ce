//! Retriever worker loop: `Q_ret` -> top-K similarity search -> prompt
//! composition -> `Q_llm`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rag_llm_backend::BaseVectorIndex;

use crate::kernel::{QueueBroker, Q_LLM, Q_RET};

const PROMPT_PREAMBLE: &str =
    "Answer the question using only the numbered context passages below. \
     If the passages do not contain the answer, say so.";

/// Compose the augmented prompt deterministically: preamble, numbered
/// contexts in rank order, then the question.
pub fn compose_prompt(query: &str, contexts: &[String]) -> String {
    if contexts.is_empty() {
        return query.to_string();
    }

    let mut prompt = String::from(PROMPT_PREAMBLE);
    prompt.push('\n');
    for (i, context) in contexts.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", i + 1, context));
    }
    prompt.push_str(&format!("Question: {query}\nAnswer:"));
    prompt
}

pub async fn run(
    queue: Arc<dyn QueueBroker>,
    index: Arc<dyn BaseVectorIndex>,
    collection: String,
    top_k: usize,
    recv_timeout: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            tracing::info!("retriever worker shutting down");
            return;
        }

        let job = tokio::select! {
            result = queue.dequeue(Q_RET, recv_timeout) => result,
            _ = shutdown.changed() => continue,
        };

        let mut job = match job {
            Ok(Some(job)) => job,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "failed to dequeue from Q_ret");
                continue;
            }
        };

        let Some(embedding) = job.embedding.clone() else {
            tracing::warn!(job_id = %job.job_id, "dropping job missing an embedding");
            continue;
        };

        let start = Instant::now();
        let contexts = match index.search(&collection, &embedding, top_k).await {
            Ok(hits) => hits.into_iter().map(|hit| hit.payload.text).collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "vector search failed, proceeding with no context");
                Vec::new()
            }
        };
        let retrieve_ms = start.elapsed().as_millis() as u64;

        let augmented_prompt = compose_prompt(&job.text, &contexts);

        if let Err(e) = job.set_retrieval(contexts, augmented_prompt, retrieve_ms) {
            tracing::warn!(job_id = %job.job_id, error = %e, "dropping job that already had retrieval results");
            continue;
        }

        if let Err(e) = queue.enqueue(Q_LLM, &job).await {
            tracing::warn!(job_id = %job.job_id, error = %e, "failed to enqueue onto Q_llm, job will eventually time out at the ingress");
        }
    }
}
