pub mod consumption;
pub mod offline;
pub mod weather;
