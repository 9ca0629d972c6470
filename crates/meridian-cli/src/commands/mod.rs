pub mod assumptions;
pub mod optimize;
