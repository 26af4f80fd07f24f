pub mod config;
pub mod dbgp;
pub mod mapper;
pub mod pathmapping;
pub mod proxy;
