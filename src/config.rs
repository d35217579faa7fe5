use serde::Serialize;

/// School identity printed on every exported document. Sourced from the
/// environment (a local `.env` is loaded at startup); values are treated as
/// opaque strings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolInfo {
    pub name: String,
    /// Rol Base de Datos, the ministry's school identifier.
    pub rbd: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub website: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl SchoolInfo {
    pub fn from_env() -> SchoolInfo {
        SchoolInfo {
            name: env_or("LIBROCLASES_SCHOOL_NAME", "Establecimiento sin configurar"),
            rbd: env_or("LIBROCLASES_SCHOOL_RBD", ""),
            phone: env_or("LIBROCLASES_SCHOOL_PHONE", ""),
            email: env_or("LIBROCLASES_SCHOOL_EMAIL", ""),
            address: env_or("LIBROCLASES_SCHOOL_ADDRESS", ""),
            website: env_or("LIBROCLASES_SCHOOL_WEBSITE", ""),
        }
    }
}
