pub mod indicator;
pub mod records;
pub mod regions;
