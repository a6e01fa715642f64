pub mod server_config;
pub mod call_table;
pub mod store;
pub mod executor;
pub mod dispatcher;
pub mod rpc_server;
