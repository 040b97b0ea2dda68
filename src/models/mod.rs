// src/models/mod.rs

pub mod catalog;
pub mod comment;
pub mod pagination;
pub mod review;
pub mod title;
pub mod user;
