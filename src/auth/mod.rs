//! OAuth token lifecycle.
//!
//! [`TokenManager`] is the single owner of the access token. It talks to the
//! authorization server through a [`TokenEndpoint`] and, for the interactive
//! authorization-code grant, obtains the user's consent through an
//! [`AuthorizationPrompt`].

mod authorize;
mod endpoint;
mod manager;
mod token;

pub use authorize::{
    authorize_url, AuthorizationCallback, AuthorizationPrompt, LoopbackPrompt, Pkce,
};
pub use endpoint::{Grant, HttpTokenEndpoint, TokenEndpoint, TokenRequest};
pub use manager::TokenManager;
pub use token::{Token, TokenResponse, DEFAULT_EXPIRES_IN};
