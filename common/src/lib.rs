mod db;
mod erc20;
mod helpers;
mod retry_queue;
mod schema;
mod units;

pub use db::*;
pub use erc20::*;
pub use helpers::*;
pub use retry_queue::*;
pub use schema::*;
pub use units::*;
