pub mod app;
pub mod offline;
pub mod render;

pub use app::TerminalApp;
pub use offline::demo_backend;
