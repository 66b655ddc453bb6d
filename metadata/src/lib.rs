pub mod catalog;
pub mod consts;
