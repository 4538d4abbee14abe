// Client registry: per-connection records and the live connection directory

mod directory;
mod records;

pub use directory::{
    BroadcastReport, ConnectionDirectory, ConnectionHandle, ConnectionInfo, DirectoryError,
};
pub use records::{ClientRecord, ClientRecordStore, StoreError, UpdateOutcome};

#[cfg(test)]
mod tests;
