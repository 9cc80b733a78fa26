pub mod config;
pub mod db;
pub mod dispatch;
pub mod mailer;
pub mod model;
pub mod outcome;
pub mod schedule;
pub mod server;
pub mod template;
