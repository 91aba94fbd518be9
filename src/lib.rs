pub mod config;
pub mod dag;
pub mod errors;
pub mod evidence;
pub mod gates;
pub mod hooks;
pub mod init;
pub mod logging;
pub mod phase;
pub mod review;
pub mod state;
pub mod tracker;
pub mod transcript;
pub mod transition;
pub mod updater;
