//! HTTP API response DTOs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthServiceDto {
    pub id: String,
    pub name: String,
}

/// `GET /info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoDto {
    pub canvas_code: String,
    pub width: u32,
    pub height: u32,
    pub palette: Vec<String>,
    pub max_stacked: u32,
    pub auth_services: BTreeMap<String, AuthServiceDto>,
    pub registration_enabled: bool,
}

/// `GET /whoami`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoAmIDto {
    pub username: String,
    pub id: i64,
}
