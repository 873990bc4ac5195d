// Models module - Database entity representations

pub mod card;

pub use card::{Card, CardStatus};
