//! Record of every transport call made against a virtual player

use nomad_protocol::{Command, ControlRequest};

/// One transport call as seen by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// Vendor request; `payload` holds the data stage for writes
    Control {
        request: ControlRequest,
        payload: Vec<u8>,
    },
    /// Bulk-out write
    BulkWrite { data: Vec<u8> },
    /// Bulk-in read
    BulkRead { requested: usize, returned: usize },
}

impl JournalEntry {
    /// Vendor command of a control entry
    pub fn command(&self) -> Option<Command> {
        match self {
            JournalEntry::Control { request, .. } => Some(request.command),
            _ => None,
        }
    }
}

/// Ordered list of transport calls
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn push(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Vendor commands in the order they were issued
    pub fn commands(&self) -> Vec<Command> {
        self.entries.iter().filter_map(JournalEntry::command).collect()
    }

    /// Control requests in the order they were issued
    pub fn requests(&self) -> Vec<ControlRequest> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                JournalEntry::Control { request, .. } => Some(*request),
                _ => None,
            })
            .collect()
    }

    /// Payloads of every bulk-out write
    pub fn bulk_writes(&self) -> Vec<&[u8]> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                JournalEntry::BulkWrite { data } => Some(data.as_slice()),
                _ => None,
            })
            .collect()
    }

    /// Number of times a given command was issued
    pub fn count(&self, command: Command) -> usize {
        self.commands().into_iter().filter(|&c| c == command).count()
    }
}
