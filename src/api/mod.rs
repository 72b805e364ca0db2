pub mod api_types;
pub mod client;
#[cfg(test)]
pub mod mock;
pub mod retry;
pub mod types;
