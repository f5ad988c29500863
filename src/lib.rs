pub mod api;
pub mod components;
pub mod config;
pub mod error;
pub mod filter;
pub mod guard;
pub mod models;
pub mod repository;
pub mod session;
pub mod state;
pub mod supabase;
