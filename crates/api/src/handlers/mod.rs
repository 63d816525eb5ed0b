pub mod converts;
