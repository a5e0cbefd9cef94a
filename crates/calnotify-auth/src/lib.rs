pub mod google;
pub mod login;
pub mod storage;
pub mod token;

pub use google::{GoogleOAuth2Provider, GoogleTokenResponse, GOOGLE_SERVICE};
pub use login::login;
pub use storage::{TokenSet, TokenStore};
pub use token::GoogleTokenManager;
