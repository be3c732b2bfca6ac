pub mod customer;
pub mod run;
pub mod tier;
