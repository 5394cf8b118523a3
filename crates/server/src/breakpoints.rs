//! Breakpoints the controller asked for
use std::collections::BTreeMap;

use transport::types::{BreakpointEntry, BreakpointId};

use crate::interpreter::{Interpreter, LocationId};

/// A breakpoint as the controller sees it
///
/// One record may own several instrumented locations, all enabled and
/// disabled together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointRecord {
    pub id: BreakpointId,
    pub script_path: String,
    pub line: i64,
    pub function_name: String,
    pub locations: Vec<LocationId>,
}

#[derive(Debug)]
pub struct BreakpointRegistry {
    records: BTreeMap<BreakpointId, BreakpointRecord>,
    next_id: BreakpointId,
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable every location compiled from `path` at `line`
    ///
    /// Returns `None`, and changes nothing, when no location matches.
    #[tracing::instrument(skip(self, interpreter))]
    pub fn add(
        &mut self,
        interpreter: &mut dyn Interpreter,
        path: &str,
        line: i64,
    ) -> Option<BreakpointId> {
        let locations = interpreter.locations_at(path, line);
        let Some(first) = locations.first() else {
            tracing::debug!("no breakpoint location matches");
            return None;
        };
        let function_name = interpreter
            .location(*first)
            .map(|location| location.function_name.clone())
            .unwrap_or_default();

        for location in &locations {
            interpreter.set_location_enabled(*location, true);
        }

        let id = self.next_id;
        self.next_id += 1;
        tracing::debug!(id, count = locations.len(), "breakpoint added");
        self.records.insert(
            id,
            BreakpointRecord {
                id,
                script_path: path.to_string(),
                line,
                function_name,
                locations,
            },
        );
        Some(id)
    }

    /// Remove a breakpoint by id, disabling its locations
    #[tracing::instrument(skip(self, interpreter))]
    pub fn remove(
        &mut self,
        interpreter: &mut dyn Interpreter,
        id: BreakpointId,
    ) -> Option<BreakpointRecord> {
        let Some(record) = self.records.remove(&id) else {
            tracing::debug!("no such breakpoint");
            return None;
        };
        self.disable_unshared(interpreter, &record);
        tracing::debug!("breakpoint removed");
        Some(record)
    }

    /// Remove the first breakpoint set at `path` and `line`
    pub fn remove_at(
        &mut self,
        interpreter: &mut dyn Interpreter,
        path: &str,
        line: i64,
    ) -> Option<BreakpointRecord> {
        let id = self
            .records
            .values()
            .find(|record| record.script_path == path && record.line == line)
            .map(|record| record.id);
        match id {
            Some(id) => self.remove(interpreter, id),
            None => {
                tracing::debug!(%path, line, "no breakpoint at location");
                None
            }
        }
    }

    // a location stays enabled while another breakpoint still owns it
    fn disable_unshared(&self, interpreter: &mut dyn Interpreter, removed: &BreakpointRecord) {
        for location in &removed.locations {
            let shared = self
                .records
                .values()
                .any(|record| record.locations.contains(location));
            if !shared {
                interpreter.set_location_enabled(*location, false);
            }
        }
    }

    /// Entries for a `breakpoints` notification, ordered by id
    pub fn entries(&self, interpreter: &dyn Interpreter) -> Vec<BreakpointEntry> {
        self.records
            .values()
            .map(|record| {
                let first = record
                    .locations
                    .first()
                    .and_then(|id| interpreter.location(*id));
                BreakpointEntry {
                    id: record.id,
                    line: first.map_or(record.line, |location| location.line),
                    function_name: first.map_or_else(
                        || record.function_name.clone(),
                        |location| location.function_name.clone(),
                    ),
                    path: record.script_path.clone(),
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
