//! # Fitcoach Session
//!
//! Client-side authentication session lifecycle for Fitcoach.
//!
//! This crate provides:
//! - [`SessionManager`] - Sign-in, sign-up, confirmation, sign-out and
//!   profile updates, with state published on a `watch` channel
//! - A background refresh loop that keeps identity-provider tokens fresh
//!   while a user is signed in
//! - Traits for the identity provider, the profile API and key-value
//!   storage, with HTTP, in-memory and file-backed implementations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fitcoach_session::{SessionManager, SessionError};
//!
//! async fn login(manager: &SessionManager) -> Result<(), SessionError> {
//!     manager.check_auth_state().await;
//!     if !manager.is_authenticated() {
//!         manager.sign_in("a@b.com", "hunter22").await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod manager;
pub mod model;
pub mod profile;
mod refresh;
pub mod state;
pub mod store;
pub mod token;

// Re-export commonly used types at crate root
pub use model::{
    Profile,
    ProfileLookup,
    ProfileUpdate,
    Session,
    UserId,
    UserIdentity,
};

pub use store::{
    FileStore,
    KeyValueStore,
    MemoryStore,
    StoreError,
};

pub use token::{
    Secret,
    TokenSet,
    TokenVault,
};

pub use identity::{
    AuthError,
    AuthErrorKind,
    CognitoClient,
    IdentityProvider,
    SignInTokens,
    SignUpAttributes,
};

pub use profile::{
    HttpProfileApi,
    ProfileApi,
    ProfileError,
};

pub use state::{
    AuthPhase,
    SessionEvent,
    SessionState,
};

pub use config::{IdentityConfig, SessionConfig};

pub use error::{FitcoachError, SessionError, SignInFailure};

pub use manager::SessionManager;
