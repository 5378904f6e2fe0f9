//! Tree & Document Engine (component E): arena-backed tree nodes, CSV
//! backing, forest search, and cross-format serialization.

pub mod arena;
pub mod csv_format;
pub mod csv_node;
pub mod search;
pub mod serializer;
