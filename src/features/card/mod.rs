pub mod handler;
pub mod models;
pub mod storage;
pub mod sweeper;
pub mod token;

pub use handler::create_card_router;
pub use storage::CardStorage;
pub use sweeper::spawn_expiry_sweeper;
