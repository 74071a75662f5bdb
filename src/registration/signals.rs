//! `user_registered` notifications.

use std::sync::Arc;
use tracing::info;

use super::session::{RequestContext, Site};
use super::store::UserRecord;

/// Published once per successful first-step registration.
#[derive(Debug)]
pub struct UserRegistered<'a> {
    pub sender: &'static str,
    pub user: &'a UserRecord,
    pub site: &'a Site,
    pub request: &'a RequestContext,
}

/// Subscriber to registration events. Listener failures are the listener's
/// concern; nothing is returned to the backend.
pub trait RegistrationListener: Send + Sync {
    fn user_registered(&self, event: &UserRegistered<'_>);
}

impl<F> RegistrationListener for F
where
    F: Fn(&UserRegistered<'_>) + Send + Sync,
{
    fn user_registered(&self, event: &UserRegistered<'_>) {
        self(event);
    }
}

/// Logs every registration at info level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogRegistrationListener;

impl RegistrationListener for LogRegistrationListener {
    fn user_registered(&self, event: &UserRegistered<'_>) {
        info!(
            sender = event.sender,
            user_id = %event.user.id,
            username = %event.user.username,
            site = %event.site.domain,
            "user registered"
        );
    }
}

/// Observer list the backend publishes to.
#[derive(Clone, Default)]
pub struct RegistrationEvents {
    listeners: Vec<Arc<dyn RegistrationListener>>,
}

impl RegistrationEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn RegistrationListener>) {
        self.listeners.push(listener);
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn RegistrationListener>) -> Self {
        self.subscribe(listener);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn publish(&self, event: &UserRegistered<'_>) {
        for listener in &self.listeners {
            listener.user_registered(event);
        }
    }
}

impl std::fmt::Debug for RegistrationEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationEvents")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
