use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct DeleteDocsPayload {
    pub docs: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct DeleteDocsResponse {
    pub deleted_ids: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct ListDocsResponse {
    pub docs: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
}
