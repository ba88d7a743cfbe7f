mod common;
mod ingest;
mod orders;
mod store;
