pub mod ine;
