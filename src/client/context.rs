//! Client-side auth state shared by every view.
//!
//! The identity is fetched once; until that first fetch completes the
//! route guard answers [`Navigation::Wait`] so a slow `/me` never bounces
//! a signed-in admin to the login page.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::identity::{ClientError, IdentityApi};
use crate::auth::{
    dto::PublicUser,
    gate::{is_admin_path, is_public, login_redirect_target, LOGIN_PATH, UNAUTHORIZED_PATH},
};

const REGISTER_PATH: &str = "/register";
const ADMIN_HOME: &str = "/admin";
const HOME: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Loading,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub lifecycle: Lifecycle,
    pub user: Option<PublicUser>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Identity not known yet; render nothing.
    Wait,
    Stay,
    Redirect(String),
}

pub struct AuthContext {
    api: Arc<dyn IdentityApi>,
    state: watch::Sender<AuthSnapshot>,
}

fn landing_for(user: &PublicUser) -> &'static str {
    if user.role.is_admin() {
        ADMIN_HOME
    } else {
        HOME
    }
}

impl AuthContext {
    pub fn new(api: Arc<dyn IdentityApi>) -> Self {
        let (state, _) = watch::channel(AuthSnapshot {
            lifecycle: Lifecycle::Uninitialized,
            user: None,
        });
        Self { api, state }
    }

    /// Fetches the current identity. Only the first call does any work.
    pub async fn init(&self) {
        let claimed = self.state.send_if_modified(|s| {
            if s.lifecycle != Lifecycle::Uninitialized {
                return false;
            }
            s.lifecycle = Lifecycle::Loading;
            true
        });
        if !claimed {
            return;
        }

        let user = match self.api.me().await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "identity fetch failed; treating as signed out");
                None
            }
        };
        debug!(signed_in = user.is_some(), "auth context ready");
        self.set_ready(user);
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    /// `None` until the first identity fetch has finished.
    pub fn is_authenticated(&self) -> Option<bool> {
        let s = self.state.borrow();
        (s.lifecycle == Lifecycle::Ready).then(|| s.user.is_some())
    }

    /// Same rules as the server-side session gate, plus sending signed-in
    /// users away from the login and register pages.
    pub fn guard(&self, path_and_query: &str) -> Navigation {
        let s = self.state.borrow();
        if s.lifecycle != Lifecycle::Ready {
            return Navigation::Wait;
        }
        let path = path_and_query.split('?').next().unwrap_or(path_and_query);

        match (&s.user, path) {
            (Some(user), LOGIN_PATH | REGISTER_PATH) => Navigation::Redirect(landing_for(user).to_string()),
            (Some(user), p) if is_admin_path(p) && !user.role.is_admin() => {
                Navigation::Redirect(UNAUTHORIZED_PATH.to_string())
            }
            (Some(_), _) => Navigation::Stay,
            (None, p) if is_public(p) => Navigation::Stay,
            (None, _) => Navigation::Redirect(login_redirect_target(path_and_query)),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<String, ClientError> {
        let user = self.api.login(email, password).await?;
        let target = landing_for(&user).to_string();
        self.set_ready(Some(user));
        Ok(target)
    }

    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<String, ClientError> {
        let user = self.api.register(email, password, name).await?;
        let target = landing_for(&user).to_string();
        self.set_ready(Some(user));
        Ok(target)
    }

    /// The cached identity is dropped even if the server call fails.
    pub async fn logout(&self) -> Result<String, ClientError> {
        let result = self.api.logout().await;
        self.set_ready(None);
        result.map(|_| LOGIN_PATH.to_string())
    }

    fn set_ready(&self, user: Option<PublicUser>) {
        self.state.send_replace(AuthSnapshot {
            lifecycle: Lifecycle::Ready,
            user,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn user(role: Role) -> PublicUser {
        PublicUser {
            id: uuid::Uuid::new_v4(),
            email: "ada@example.com".into(),
            name: "Ada".into(),
            role,
            title: None,
            bio: None,
            location: None,
            avatar_url: None,
            github_url: None,
            linkedin_url: None,
            twitter_url: None,
            website_url: None,
        }
    }

    /// `me` blocks until released, counting calls.
    struct SlowApi {
        user: Option<PublicUser>,
        release: Notify,
        me_calls: AtomicUsize,
    }

    impl SlowApi {
        fn new(user: Option<PublicUser>) -> Arc<Self> {
            Arc::new(Self {
                user,
                release: Notify::new(),
                me_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl IdentityApi for SlowApi {
        async fn me(&self) -> Result<Option<PublicUser>, ClientError> {
            self.me_calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(self.user.clone())
        }

        async fn login(&self, _email: &str, _password: &str) -> Result<PublicUser, ClientError> {
            self.user.clone().ok_or(ClientError::Rejected {
                status: 401,
                message: "Invalid credentials".into(),
            })
        }

        async fn register(&self, _email: &str, _password: &str, _name: &str) -> Result<PublicUser, ClientError> {
            Ok(user(Role::User))
        }

        async fn logout(&self) -> Result<(), ClientError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn no_redirect_while_identity_is_loading() {
        let api = SlowApi::new(Some(user(Role::Admin)));
        let ctx = Arc::new(AuthContext::new(api.clone()));
        let mut rx = ctx.subscribe();

        assert_eq!(ctx.guard("/admin"), Navigation::Wait);

        let task = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.init().await }
        });
        rx.wait_for(|s| s.lifecycle == Lifecycle::Loading).await.unwrap();

        assert_eq!(ctx.guard("/admin/projects"), Navigation::Wait);
        assert_eq!(ctx.is_authenticated(), None);

        // A second init while loading must not refetch.
        ctx.init().await;

        api.release.notify_one();
        task.await.unwrap();

        assert_eq!(ctx.is_authenticated(), Some(true));
        assert_eq!(ctx.guard("/admin/projects"), Navigation::Stay);
        assert_eq!(ctx.guard("/login"), Navigation::Redirect("/admin".into()));
        assert_eq!(api.me_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn signed_out_and_non_admin_routing() {
        let api = SlowApi::new(None);
        let ctx = AuthContext::new(api.clone());
        api.release.notify_one();
        ctx.init().await;

        assert_eq!(ctx.is_authenticated(), Some(false));
        assert_eq!(ctx.guard("/"), Navigation::Stay);
        assert_eq!(
            ctx.guard("/admin/skills?tab=2"),
            Navigation::Redirect("/login?callbackUrl=%2Fadmin%2Fskills%3Ftab%3D2".into())
        );

        let target = ctx.register("bob@example.com", "password1", "Bob").await.unwrap();
        assert_eq!(target, "/");
        assert_eq!(ctx.guard("/admin"), Navigation::Redirect("/unauthorized".into()));

        assert_eq!(ctx.logout().await.unwrap(), "/login");
        assert_eq!(ctx.snapshot().user, None);
        assert_eq!(ctx.is_authenticated(), Some(false));
    }

    #[tokio::test]
    async fn failed_login_keeps_previous_state() {
        let api = SlowApi::new(None);
        let ctx = AuthContext::new(api.clone());
        api.release.notify_one();
        ctx.init().await;

        let err = ctx.login("ada@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected { status: 401, .. }));
        assert_eq!(ctx.is_authenticated(), Some(false));
    }
}
