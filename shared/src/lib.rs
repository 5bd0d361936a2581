pub mod constants;
pub mod message;
pub mod request;
pub mod types;
