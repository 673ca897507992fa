mod client;

pub use client::{
    AccountInfo, ApiErrorClass, CloudClient, CloudError, DeleteOutcome, Record, RecordDraft,
    RecordItem, RecordPage,
};
