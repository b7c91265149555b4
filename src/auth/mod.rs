pub mod codec;
pub mod flow;
pub mod lifecycle;
pub mod password;
pub mod rate_limit;
pub mod session;
pub mod token;
