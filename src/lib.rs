// Library exports for get-after-it
// The binary and the integration tests both build on these modules

pub mod auth;
pub mod challenge;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod goals;
pub mod groups;
pub mod live;
pub mod preferences;
pub mod profiles;
pub mod progress;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;
