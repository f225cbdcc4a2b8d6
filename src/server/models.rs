use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct HashtagRequest {
    pub(crate) image_data: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct HashtagResponse {
    pub(crate) status: &'static str,
    pub(crate) hashtags: Vec<String>,
}

impl HashtagResponse {
    pub(crate) fn success(hashtags: Vec<String>) -> Self {
        Self {
            status: "success",
            hashtags,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
