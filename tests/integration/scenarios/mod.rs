//! Group creation, joining and consensus scenarios

pub mod membership_test;
