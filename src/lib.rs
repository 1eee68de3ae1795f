pub mod accounts;
pub mod cli;
pub mod config;
pub mod extract;
pub mod resolve;
pub mod sync;
pub mod util;
pub mod watch;
