pub mod delete;
pub mod get;
pub mod save;
pub mod send;
pub mod stream;
