pub mod in_memory_store;
pub mod json_file_store;
