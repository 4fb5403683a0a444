pub mod dispatcher;
pub mod fusion;
pub mod ip_risk;
pub mod patterns;
pub mod scanner;
