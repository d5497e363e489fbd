pub mod history;
pub mod load;
pub mod predict;
