//! Stored procedure parameter schemas.
//!
//! The parameter list of a procedure is read from the catalog the first time
//! it is called and kept for the lifetime of the cache. A pool shares one
//! cache between all of its sessions.

use std::collections::HashMap;
use std::sync::Arc;

use mssql_types::{FromSql, SqlValue, WireType};
use parking_lot::RwLock;

use crate::config::Compatibility;
use crate::error::Result;
use crate::result::ResultSet;

/// One parameter of a stored procedure, as the catalog describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    /// Name including the leading `@`.
    pub name: String,
    /// Position in the parameter list.
    pub ordinal: i32,
    /// Wire type the parameter is bound as.
    pub wire_type: WireType,
    /// Whether the parameter is an output parameter.
    pub is_output: bool,
    /// Declared length, `-1` for `(max)`.
    pub max_length: i16,
    /// Numeric precision.
    pub precision: u8,
    /// Numeric scale.
    pub scale: u8,
}

impl ParameterDescriptor {
    /// Size requested for the returned value of an output parameter.
    #[must_use]
    pub fn output_len(&self) -> i32 {
        if self.max_length == -1 {
            8000
        } else {
            i32::from(self.max_length)
        }
    }

    fn from_row(row: &[SqlValue]) -> Result<Self> {
        let value = |index: usize| row.get(index).unwrap_or(&SqlValue::Null);
        let code: i32 = FromSql::from_sql(value(2))?;
        Ok(Self {
            name: FromSql::from_sql(value(0))?,
            ordinal: FromSql::from_sql(value(1))?,
            wire_type: WireType::from_code(code).catalog_normalized(),
            is_output: FromSql::from_sql(value(3))?,
            max_length: FromSql::from_sql(value(4))?,
            precision: FromSql::from_sql(value(5))?,
            scale: FromSql::from_sql(value(6))?,
        })
    }
}

/// Catalog query listing the parameters of procedure `name`.
#[must_use]
pub fn catalog_query(name: &str, compatibility: &Compatibility) -> String {
    let name = name.replace('\'', "''");
    if compatibility.is_sybase() {
        format!(
            "select name = c.name, parameter_id = c.id, user_type_id = c.type, \
             is_output = case when c.status2 = 2 or c.status2 = 4 then 1 else 0 end, \
             max_length = c.length, precision = isnull(c.prec,0), scale = isnull(c.scale,0) \
             from sysobjects o join syscolumns c on c.id = o.id \
             where o.name = '{name}' order by c.id, c.colid"
        )
    } else {
        format!(
            "select name, parameter_id, user_type_id, is_output, max_length, precision, scale \
             from sys.all_parameters \
             where object_id = (select object_id from sys.all_objects where object_id = object_id('{name}')) \
             order by parameter_id"
        )
    }
}

/// Parse the result of [`catalog_query`].
pub fn parse_catalog(results: &[ResultSet]) -> Result<Vec<ParameterDescriptor>> {
    let Some(rs) = results.first() else {
        return Ok(Vec::new());
    };
    rs.rows()
        .iter()
        .map(|row| ParameterDescriptor::from_row(row))
        .collect()
}

/// Procedure name to parameter list.
#[derive(Debug, Default)]
pub struct ParamCache {
    entries: RwLock<HashMap<String, Arc<[ParameterDescriptor]>>>,
}

impl ParamCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached parameters of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<[ParameterDescriptor]>> {
        self.entries.read().get(name).cloned()
    }

    /// Store the parameters of `name`. The first stored list wins.
    pub fn insert(
        &self,
        name: &str,
        params: Vec<ParameterDescriptor>,
    ) -> Arc<[ParameterDescriptor]> {
        let mut entries = self.entries.write();
        Arc::clone(
            entries
                .entry(name.to_string())
                .or_insert_with(|| params.into()),
        )
    }

    /// Number of cached procedures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
