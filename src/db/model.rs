//! Insert models used by repository writers.
//!
//! Identifiers and timestamps are assigned by the repository, so these carry
//! only caller-supplied fields.

#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub subject: String,
    pub body: String,
    pub variables: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub user_id: String,
    pub template_id: String,
    pub industry: String,
    pub weekday: u8,
    pub hour: u8,
    pub max_sends: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCompany {
    pub name: String,
    pub website: Option<String>,
    pub industry: Option<String>,
}
