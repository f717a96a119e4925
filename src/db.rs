pub mod ine;
pub mod prod_db;
