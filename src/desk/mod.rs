pub mod bridge;
pub mod device;
pub mod facade;
pub mod identity;
pub mod ingest;
pub mod packet;
pub mod position;
pub mod session;
