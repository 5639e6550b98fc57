pub mod devices;
pub mod ingest;
