//! Educatia - a small blogging and learning community
//!
//! Accounts with e-mail activation and password reset, roles, posts with
//! tags, profiles with pictures, a follow graph and an admin back office,
//! served as a JSON API.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
