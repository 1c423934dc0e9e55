use std::collections::HashMap;

use raptor_job_queue::id;
use serde_json::{json, Value};

use crate::error::ApiError;

/// True when the caller asked for one job per event-tree sequence
/// (`?distributedSequences=yes`).
pub fn distributed_sequences(params: &HashMap<String, String>) -> bool {
    params
        .get("distributedSequences")
        .is_some_and(|v| v == "yes")
}

/// Response body for a queued batch. Clients recover the batch id from the
/// first sequence id, so it is derived the same way here.
pub fn batch_payload(sequence_job_ids: &[String]) -> Result<Value, ApiError> {
    let parent_job_id = sequence_job_ids
        .first()
        .and_then(|first| id::parent_of(first))
        .ok_or_else(|| ApiError::unexpected("batch returned no derivable sequence ids"))?;

    Ok(json!({
        "parentJobId": parent_job_id,
        "sequenceJobIds": sequence_job_ids,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_yes_enables_distribution() {
        let mut params = HashMap::new();
        assert!(!distributed_sequences(&params));
        params.insert("distributedSequences".to_string(), "true".to_string());
        assert!(!distributed_sequences(&params));
        params.insert("distributedSequences".to_string(), "yes".to_string());
        assert!(distributed_sequences(&params));
    }

    #[test]
    fn batch_payload_derives_parent_from_first_id() {
        let ids = vec!["abc-0".to_string(), "abc-1".to_string()];
        let body = batch_payload(&ids).unwrap();
        assert_eq!(body["parentJobId"], "abc");
        assert_eq!(body["sequenceJobIds"], json!(["abc-0", "abc-1"]));
    }

    #[test]
    fn batch_payload_rejects_empty_list() {
        assert!(batch_payload(&[]).is_err());
    }
}
