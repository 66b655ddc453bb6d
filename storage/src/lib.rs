pub mod consts;
pub mod file_helper;
pub mod row_store;
