#![forbid(unsafe_code)]
#![allow(clippy::needless_return)]
#![warn(clippy::await_holding_lock, clippy::inefficient_to_string)]

rust_i18n::i18n!("locales", fallback = "en");

pub mod admin;
pub mod app_state;
pub mod config;
pub mod constants;
pub mod logging;
pub mod pages;
pub mod scheduler;
pub mod util;

mod data_dir;
mod server;

#[cfg(test)]
mod test;

pub use app_state::AppState;
pub use data_dir::DataDir;
pub use server::{build_router, init_app_state, serve, InitError};
