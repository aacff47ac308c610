pub mod connection;
pub mod discovered_column;
pub mod discovered_relation;
pub mod discovered_table;
