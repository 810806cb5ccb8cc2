//! Identity, group resolution and session collaborators for the auth flows.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod request_context;
pub mod groups;

pub use principal::{Identity, DISPLAY_NAME_ATTR};
pub use session::{Session, SessionStore, MemorySessionStore, AUTH_COOKIE};
pub use provider::{IdentityProvider, CasConfig, CasProvider};
pub use request_context::{RequestContext, RETURN_PARAM};
pub use groups::{
    GroupCallback, GroupAggregator, GroupSet, CallbackRegistry, VerifyUser, AdminAllowList,
    AUTHENTICATED, ADMINISTRATOR,
};
