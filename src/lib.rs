mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod memory;
    pub mod postgres;
    pub mod schema;
    pub mod seed;
    pub mod shopping_list;
    pub mod store;
    pub mod validation;
}
mod authentication {
    pub mod cryptography;
}
mod config;
mod constants;

mod cache {
    pub mod cache;
}

pub use authentication::*;
pub use cache::cache::*;
pub use config::Config;
pub use constants::*;
pub use database::*;
