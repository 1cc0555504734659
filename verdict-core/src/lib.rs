pub mod config;
pub mod db;
pub mod endpoints;
pub mod error;
pub mod gateway_util;
pub mod http;
pub mod judge;
pub mod observability;
pub mod providers;
