//! chat-enroll: guided registration forms over chat, backed by an
//! authenticated admin API.

pub mod api;
pub mod channels;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod forms;
pub mod markup;
pub mod ratelimit;
