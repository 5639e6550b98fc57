pub mod device;
pub mod prediction;
pub mod reading;
