// src/utils/mod.rs

pub mod confirmation;
pub mod html;
pub mod jwt;
pub mod mailer;
