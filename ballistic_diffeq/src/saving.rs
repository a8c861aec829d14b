use std::path::Path;

use csv::Writer;

use crate::{SolverError, state::OdeState};

/// Specifies which samples the solver keeps in memory.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum SaveMethod {
    /// Every accepted step.
    #[default]
    EveryStep,
    /// A uniform grid with the given spacing, interpolated between steps.
    /// The final sample is always kept.
    Interval(f64),
}

/// In-memory `(time, state)` samples of a solve, in increasing time.
#[derive(Clone, Debug)]
pub struct MemoryResult<State> {
    /// Recorded times.
    pub t: Vec<f64>,
    /// Recorded states.
    pub y: Vec<State>,
}

impl<State: OdeState> MemoryResult<State> {
    /// Constructs a new memory result buffer with an initial capacity `n`.
    pub fn new(n: usize) -> Self {
        Self {
            t: Vec::with_capacity(n),
            y: Vec::with_capacity(n),
        }
    }

    pub(crate) fn insert(&mut self, t: f64, x: &State) {
        self.t.push(t);
        self.y.push(x.clone());
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn last(&self) -> Option<(f64, &State)> {
        Some((*self.t.last()?, self.y.last()?))
    }

    /// Writes one row per sample, time first, to a CSV file at `path`.
    ///
    /// `headers` names the state components. It must match the state length.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P, headers: &[&str]) -> Result<(), SolverError> {
        let mut writer = Writer::from_path(path)?;
        let mut record = Vec::with_capacity(headers.len() + 1);
        record.push("t".to_string());
        record.extend(headers.iter().map(|h| h.to_string()));
        writer.write_record(&record)?;

        for (t, y) in self.t.iter().zip(&self.y) {
            let values = y.as_slice();
            if values.len() != headers.len() {
                return Err(SolverError::HeaderMismatch {
                    headers: headers.len(),
                    values: values.len(),
                });
            }
            record.clear();
            record.push(t.to_string());
            record.extend(values.iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}
