pub mod app;
pub mod audio;
pub mod catalog;
pub mod config;
pub mod export;
pub mod logging;
pub mod model;
pub mod navigation;
pub mod player;
pub mod playlists;
pub mod session;
pub mod storage;
pub mod view;
