use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::DbUlid;

/// The code currently occupying a machine's single activation slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbMachineBinding {
    /// Stored as the document key, which makes it unique per machine
    #[serde(rename = "_id")]
    pub machine_id: String,

    pub code_id: DbUlid,

    /// When the binding was created
    pub bound_at: bson::DateTime,
}

impl DbMachineBinding {
    pub fn new(machine_id: String, code_id: DbUlid, bound_at: DateTime<Utc>) -> Self {
        Self {
            machine_id,
            code_id,
            bound_at: bson::DateTime::from_chrono(bound_at),
        }
    }
}
