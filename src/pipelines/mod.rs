pub mod qc;
pub mod stages;
