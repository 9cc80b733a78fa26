use serde::{Deserialize, Serialize};

/// Body of `POST /emails`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub reply_to: String,
}

#[derive(Deserialize, Debug)]
pub struct SendEmailResponse {
    pub id: String,
}
