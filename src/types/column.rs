use serde::{Deserialize, Serialize};

use crate::types::LogicalType;

/// Metadata for a single result column, as declared by the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub logical_type: LogicalType,
    /// Fractional decimal digits (FIXED) or sub-second digits (TIME, TIMESTAMP_*).
    pub scale: i32,
    pub precision: Option<i32>,
    pub length: Option<i64>,
    pub nullable: bool,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, logical_type: LogicalType, scale: i32) -> Self {
        Self {
            name: name.into(),
            logical_type,
            scale,
            precision: None,
            length: None,
            nullable: true,
        }
    }
}
