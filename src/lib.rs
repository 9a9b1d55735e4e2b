//! LinkUp server: organizer event management, a small storefront and a
//! shopping cart, served as a JSON HTTP API over SQLite.

pub mod attachments;
pub mod cart;
pub mod config;
pub mod coupons;
pub mod db;
pub mod error;
pub mod events;
pub mod guests;
pub mod http;
pub mod logging;
pub mod migrate;
pub mod products;
pub mod security;
pub mod state;
pub mod ticket_types;
pub mod time;
pub mod users;
pub mod validation;

pub use error::{AppError, AppResult};
pub use state::AppState;
