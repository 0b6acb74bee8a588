//! Database models

use serde::{Deserialize, Serialize};

/// One entry of a selection list, ready for a dropdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: String,
    pub label: String,
}

/// Record count for one group within a date window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCount {
    pub key: String,
    pub count: i64,
}
