pub mod calc;
pub mod db;
pub mod ingest;
pub mod ipc;
pub mod pdf;
pub mod token;
pub mod verify;
