use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::session::SessionEvent;

/// Views of the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", content = "id", rename_all = "snake_case")]
pub enum Route {
    Home,
    Login,
    Register,
    Chat,
    Cards,
    CardDetail(i64),
    Compare,
    Profile,
}

impl Route {
    pub fn parse(path: &str) -> Option<Self> {
        let trimmed = path.trim().trim_end_matches('/');
        let segments: Vec<&str> = trimmed
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        match segments.as_slice() {
            [] => Some(Self::Home),
            ["login"] => Some(Self::Login),
            ["register"] => Some(Self::Register),
            ["chat"] => Some(Self::Chat),
            ["cards"] => Some(Self::Cards),
            ["cards", id] => id.parse().ok().map(Self::CardDetail),
            ["compare"] => Some(Self::Compare),
            ["profile"] => Some(Self::Profile),
            _ => None,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".to_string(),
            Self::Login => "/login".to_string(),
            Self::Register => "/register".to_string(),
            Self::Chat => "/chat".to_string(),
            Self::Cards => "/cards".to_string(),
            Self::CardDetail(id) => format!("/cards/{id}"),
            Self::Compare => "/compare".to_string(),
            Self::Profile => "/profile".to_string(),
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Self::Chat | Self::Cards | Self::CardDetail(_) | Self::Compare | Self::Profile
        )
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Redirect(Route),
}

/// Decides whether `target` may be entered given the current auth state.
pub fn guard(target: &Route, authenticated: bool) -> GuardDecision {
    if target.requires_auth() && !authenticated {
        GuardDecision::Redirect(Route::Login)
    } else {
        GuardDecision::Proceed
    }
}

/// Holds the current view and applies [`guard`] on every transition.
#[derive(Clone)]
pub struct Navigator {
    current: Arc<RwLock<Route>>,
    events: UnboundedSender<SessionEvent>,
}

impl Navigator {
    pub fn new(events: UnboundedSender<SessionEvent>) -> Self {
        Self {
            current: Arc::new(RwLock::new(Route::Home)),
            events,
        }
    }

    pub fn current(&self) -> Route {
        self.current.read().clone()
    }

    /// Moves to `target`, or to the login view when the guard refuses it.
    /// Returns the route actually entered.
    pub fn navigate(&self, target: Route, authenticated: bool) -> Route {
        let entered = match guard(&target, authenticated) {
            GuardDecision::Proceed => target,
            GuardDecision::Redirect(to) => {
                debug!(requested = %target, redirect = %to, "navigation guarded");
                to
            }
        };
        self.enter(entered.clone());
        entered
    }

    /// Unconditional move to the login view.
    pub fn force_login(&self) {
        info!("redirecting to login");
        self.enter(Route::Login);
    }

    fn enter(&self, route: Route) {
        *self.current.write() = route.clone();
        self.events.send(SessionEvent::Navigated { route }).ok();
    }
}
