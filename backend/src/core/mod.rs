//! Core building blocks shared by every component: clocks and audit stamping

pub mod audit;
pub mod time;
