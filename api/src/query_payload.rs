use doc_rag::QueryRequest;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct QueryPayload {
    #[serde(default)]
    pub docs: Vec<String>,
    pub query: String,
    // Older clients do not send history.
    #[serde(default)]
    pub message_history: String,
}

impl From<QueryPayload> for QueryRequest {
    fn from(payload: QueryPayload) -> Self {
        QueryRequest {
            query: payload.query,
            docs: payload.docs,
            message_history: payload.message_history,
        }
    }
}
