pub mod board;
pub mod predict;
pub mod status;
