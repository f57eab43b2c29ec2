//! Column metadata as reported by the source catalog.

use serde::{Deserialize, Serialize};

use crate::typemap::DataTypeTag;

/// One column of a source table, in catalog order.
///
/// Numeric attributes the catalog reports as null are stored as 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name as stored in the dictionary.
    pub name: String,
    /// Catalog type string, e.g. `NUMBER` or `TIMESTAMP(6)`.
    pub data_type: String,
    /// Declared length in bytes.
    pub length: i32,
    /// Declared precision for numeric columns.
    pub precision: i32,
    /// Declared scale for numeric columns.
    pub scale: i32,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            length: 0,
            precision: 0,
            scale: 0,
        }
    }

    #[must_use]
    pub fn with_length(mut self, length: i32) -> Self {
        self.length = length;
        self
    }

    #[must_use]
    pub fn with_precision(mut self, precision: i32, scale: i32) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    /// Type tag derived from [`ColumnInfo::data_type`].
    pub fn tag(&self) -> DataTypeTag {
        DataTypeTag::from_catalog(&self.data_type)
    }
}
