pub mod command_logger;
pub mod database_connection;
pub mod memory_store;
