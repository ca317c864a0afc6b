pub mod assays;
