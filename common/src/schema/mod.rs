mod post;
mod price;
mod token;
mod transaction;
mod user;

pub use post::*;
pub use price::*;
pub use token::*;
pub use transaction::*;
pub use user::*;
