pub mod chunk;
pub mod chunk_cache;
pub mod op_code;
pub mod token;
