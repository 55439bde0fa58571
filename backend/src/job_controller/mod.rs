pub mod state;
pub mod workspace;
