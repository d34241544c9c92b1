#[macro_use]
extern crate rocket;

pub mod auth;
pub mod github_api;
pub mod provider;
pub mod scaffold;
