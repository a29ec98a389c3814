pub mod action;
pub mod agent;
pub mod config;
pub mod evidence;
pub mod policy;
pub mod review;
pub mod run;
pub mod wait;
