pub mod multiples;
pub mod peers;
