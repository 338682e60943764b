//! Results of a stored procedure call.

use mssql_types::SqlValue;

use crate::error::{Error, Result};
use crate::result::ResultSet;
use crate::scan::ScanTarget;

/// A decoded output parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputParam {
    /// Parameter name as the server reported it.
    pub name: String,
    /// Returned value.
    pub value: SqlValue,
}

/// Result sets, return status and output parameters of one procedure call.
///
/// No result set is selected until [`next_result`](Self::next_result) or
/// any of the row helpers is called; those select the first one lazily.
#[derive(Debug, Clone, PartialEq)]
pub struct SpResult {
    results: Vec<ResultSet>,
    status: i32,
    output_params: Vec<OutputParam>,
    current: Option<usize>,
}

impl Default for SpResult {
    fn default() -> Self {
        Self::new(Vec::new(), -1, Vec::new())
    }
}

impl SpResult {
    /// Assemble a procedure result.
    #[must_use]
    pub fn new(results: Vec<ResultSet>, status: i32, output_params: Vec<OutputParam>) -> Self {
        Self {
            results,
            status,
            output_params,
            current: None,
        }
    }

    /// Procedure return status, `-1` when none was returned.
    #[must_use]
    pub fn status(&self) -> i32 {
        self.status
    }

    /// Whether the call produced any result set.
    #[must_use]
    pub fn has_results(&self) -> bool {
        !self.results.is_empty()
    }

    /// Number of result sets.
    #[must_use]
    pub fn results_count(&self) -> usize {
        self.results.len()
    }

    /// All result sets.
    #[must_use]
    pub fn results(&self) -> &[ResultSet] {
        &self.results
    }

    /// Whether any output parameter was returned.
    #[must_use]
    pub fn has_output_params(&self) -> bool {
        !self.output_params.is_empty()
    }

    /// Output parameters in the order the server returned them.
    #[must_use]
    pub fn output_params(&self) -> &[OutputParam] {
        &self.output_params
    }

    /// Value of the output parameter called `name`, with or without the
    /// leading `@`.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&SqlValue> {
        let name = name.trim_start_matches('@');
        self.output_params
            .iter()
            .find(|p| p.name.trim_start_matches('@') == name)
            .map(|p| &p.value)
    }

    /// Select the next result set. Returns `false` when there is none.
    pub fn next_result(&mut self) -> bool {
        let next = self.current.map_or(0, |c| c + 1);
        if next >= self.results.len() {
            return false;
        }
        self.current = Some(next);
        true
    }

    /// The selected result set, selecting the first one if none is.
    pub fn result(&mut self) -> Option<&mut ResultSet> {
        if self.current.is_none() {
            self.next_result();
        }
        self.current.and_then(|c| self.results.get_mut(c))
    }

    /// Move the cursor of the selected result set.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        self.result().is_some_and(ResultSet::next)
    }

    /// Whether the selected result set has another row.
    pub fn has_next(&mut self) -> bool {
        self.result().is_some_and(|rs| rs.has_next())
    }

    /// Scan the current row of the selected result set, moving to its first
    /// row if the cursor has not moved yet.
    pub fn scan(&mut self, dest: &mut [&mut dyn ScanTarget]) -> Result<()> {
        self.positioned()?.scan(dest)
    }

    /// [`scan`](Self::scan) with a check on the number of assigned values.
    pub fn must_scan(&mut self, expected: usize, dest: &mut [&mut dyn ScanTarget]) -> Result<()> {
        self.positioned()?.must_scan(expected, dest)
    }

    /// Copy output parameter values into `dest` in order.
    pub fn param_scan(&self, dest: &mut [&mut dyn ScanTarget]) -> Result<()> {
        if dest.len() > self.output_params.len() {
            return Err(Error::TooManyDestinations {
                destinations: dest.len(),
                columns: self.output_params.len(),
            });
        }
        for (target, param) in dest.iter_mut().zip(&self.output_params) {
            target.assign(&param.value)?;
        }
        Ok(())
    }

    fn positioned(&mut self) -> Result<&mut ResultSet> {
        let rs = self.result().ok_or(Error::NoResult)?;
        if rs.current_row().is_none() {
            rs.next();
        }
        Ok(rs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mssql_types::WireType;

    use super::*;
    use crate::result::Column;

    fn single(value: i32) -> ResultSet {
        let mut rs = ResultSet::new(vec![Column::new("n", 4, WireType::Int)]);
        rs.push_row(vec![SqlValue::Int(value)]);
        rs
    }

    #[test]
    fn test_default_has_no_status() {
        let mut sp = SpResult::default();
        assert_eq!(sp.status(), -1);
        assert!(!sp.has_results());
        assert!(sp.result().is_none());
        let mut n = 0i32;
        assert!(matches!(sp.scan(&mut [&mut n]), Err(Error::NoResult)));
    }

    #[test]
    fn test_scan_selects_first_result_and_row() {
        let mut sp = SpResult::new(vec![single(1), single(2)], 0, Vec::new());
        let mut n = 0i32;
        sp.scan(&mut [&mut n]).unwrap();
        assert_eq!(n, 1);
        assert!(!sp.next());

        assert!(sp.next_result());
        sp.must_scan(1, &mut [&mut n]).unwrap();
        assert_eq!(n, 2);
        assert!(!sp.next_result());
        assert_eq!(sp.results_count(), 2);
    }

    #[test]
    fn test_param_scan() {
        let sp = SpResult::new(
            Vec::new(),
            0,
            vec![
                OutputParam {
                    name: "@total".into(),
                    value: SqlValue::BigInt(12),
                },
                OutputParam {
                    name: "@label".into(),
                    value: SqlValue::Null,
                },
            ],
        );
        let mut total = 0i64;
        let mut label = Some(String::new());
        sp.param_scan(&mut [&mut total, &mut label]).unwrap();
        assert_eq!(total, 12);
        assert_eq!(label, None);
        assert_eq!(sp.output("total"), Some(&SqlValue::BigInt(12)));

        let (mut a, mut b, mut c) = (0i64, 0i64, 0i64);
        assert!(matches!(
            sp.param_scan(&mut [&mut a, &mut b, &mut c]),
            Err(Error::TooManyDestinations { .. })
        ));
    }
}
