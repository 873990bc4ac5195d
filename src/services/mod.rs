// Services module - Business logic

pub mod broker;
pub mod card_generator;
pub mod card_service;
pub mod encryption;
pub mod mailer;
pub mod token;
pub mod validation;
