pub mod eventsource;
pub mod http;
pub mod mqtt;
