pub mod app;
pub mod auth;
pub mod client;
pub mod config;
pub mod content;
pub mod error;
pub mod mailer;
pub mod pages;
pub mod public;
pub mod state;
pub mod storage;
pub mod uploads;
pub mod validation;
