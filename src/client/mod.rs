pub mod client_config;
pub mod rpc_error;
pub mod session;
