pub mod auth;
pub mod captcha;
pub mod config;
pub mod directory;
pub mod error;
pub mod logging;
pub mod mailer;
pub mod store;
pub mod testing;

pub use auth::codec::{DecodedHandle, TokenCodec};
pub use auth::flow::AccountAuthFlow;
pub use auth::lifecycle::TokenLifecycle;
pub use auth::password::{Argon2Hasher, PasswordHasher};
pub use auth::session::SessionManager;
pub use auth::token::TokenKind;
pub use config::{AccountConfig, Messages};
pub use directory::{AccountFlag, UserDirectory, UserRecord};
pub use error::{AccountError, ErrorKind};
pub use store::StoreService;
