//! Email-first registration: sign up with an email, pick a username and
//! password later through the emailed activation key.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::activation::ActivationKeys;
use super::config::RegistrationSettings;
use super::email::{ActivationMailer, BuiltinTemplates, EmailSender, TemplateRenderer};
use super::error::{ConfigError, Error, StoreError};
use super::session::{MemorySessionStore, RequestContext, Session, SessionStore};
use super::signals::{RegistrationEvents, UserRegistered};
use super::store::{MemoryUserStore, NewUser, Password, UserRecord, UserStore};
use super::token::HmacTokenGenerator;
use super::uid::UidCodec;
use super::username::{CreatorRegistry, get_username_creator};

/// Attempts at inserting a freshly named user before giving up.
pub const MAX_CREATE_ATTEMPTS: usize = 3;

const SENDER: &str = "EmailOnlyBackend";

/// External services the backend talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub email: Arc<dyn EmailSender>,
    pub templates: Arc<dyn TemplateRenderer>,
    pub events: RegistrationEvents,
    pub creators: CreatorRegistry,
}

impl Collaborators {
    /// Built-in templates, no listeners and the built-in creators.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            users,
            sessions,
            email,
            templates: Arc::new(BuiltinTemplates),
            events: RegistrationEvents::new(),
            creators: CreatorRegistry::with_builtins(),
        }
    }

    /// In-memory user and session stores around the given sender.
    #[must_use]
    pub fn in_memory(email: Arc<dyn EmailSender>) -> Self {
        Self::new(
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemorySessionStore::new()),
            email,
        )
    }

    #[must_use]
    pub fn with_templates(mut self, templates: Arc<dyn TemplateRenderer>) -> Self {
        self.templates = templates;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: RegistrationEvents) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_creators(mut self, creators: CreatorRegistry) -> Self {
        self.creators = creators;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("events", &self.events)
            .field("creators", &self.creators)
            .finish_non_exhaustive()
    }
}

pub struct EmailOnlyBackend {
    settings: RegistrationSettings,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    events: RegistrationEvents,
    creators: CreatorRegistry,
    keys: ActivationKeys,
    mailer: ActivationMailer,
}

impl EmailOnlyBackend {
    /// Build the backend once at startup.
    ///
    /// # Errors
    /// A short secret, an unusable username creator setting or an invalid
    /// frontend URL.
    pub fn new(
        settings: RegistrationSettings,
        collaborators: Collaborators,
    ) -> Result<Self, ConfigError> {
        let secret = settings.secret_key()?;
        settings.validate_frontend_base_url()?;
        get_username_creator(settings.username_creator(), &collaborators.creators)?;

        let codec = Arc::new(UidCodec::new(&secret));
        let tokens = Arc::new(HmacTokenGenerator::new(
            &secret,
            settings.activation_timeout_days(),
        )?);
        let keys = ActivationKeys::new(codec, tokens, collaborators.users.clone());
        let mailer = ActivationMailer::new(
            collaborators.email,
            collaborators.templates,
            settings.default_from_email().to_string(),
            settings.frontend_base_url().to_string(),
        );

        Ok(Self {
            settings,
            users: collaborators.users,
            sessions: collaborators.sessions,
            events: collaborators.events,
            creators: collaborators.creators,
            keys,
            mailer,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &RegistrationSettings {
        &self.settings
    }

    #[must_use]
    pub fn activation_keys(&self) -> &ActivationKeys {
        &self.keys
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    #[must_use]
    pub fn registration_allowed(&self) -> bool {
        self.settings.registration_open()
    }

    /// First step. Creates the user with a placeholder username and a
    /// throwaway password, logs them in, makes the password unusable and
    /// mails the activation key.
    ///
    /// The email is expected to be validated (format, uniqueness) already.
    ///
    /// A delivery failure is reported after the user has been stored and
    /// logged in; that account keeps its email, so a retry with the same
    /// address is refused by [`RegistrationForm`](super::forms::RegistrationForm)
    /// until an operator removes or re-mails it.
    ///
    /// # Errors
    /// `Error::InvalidArgument` without an email, `Error::RegistrationClosed`
    /// when registration is disabled, plus store, configuration and email
    /// failures.
    #[instrument(skip_all)]
    pub fn register(
        &self,
        ctx: &mut RequestContext,
        email: Option<&str>,
    ) -> Result<UserRecord, Error> {
        if !self.registration_allowed() {
            return Err(Error::RegistrationClosed);
        }
        let Some(email) = email else {
            return Err(Error::InvalidArgument("email is required"));
        };

        let password = Uuid::new_v4().simple().to_string();
        let created = self.create_user(ctx, email, &password)?;

        let Some(user) = self.authenticate(&created.username, &password)? else {
            return Err(Error::Authentication(created.username));
        };
        let mut user = self.login(ctx, user)?;

        // the real password is chosen at activation
        user.set_unusable_password();
        self.users.save(&user)?;

        let activation_key = self.keys.emit(&user);
        self.mailer
            .send_activation_email(&user, self.settings.site(), &activation_key)
            .map_err(|err| Error::Email(err.to_string()))?;

        self.events.publish(&UserRegistered {
            sender: SENDER,
            user: &user,
            site: self.settings.site(),
            request: ctx,
        });

        info!(user_id = %user.id, "registered user");
        Ok(user)
    }

    fn create_user(
        &self,
        ctx: &RequestContext,
        email: &str,
        password: &str,
    ) -> Result<UserRecord, Error> {
        let hashed = Password::hash(password)?;
        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let creator = get_username_creator(self.settings.username_creator(), &self.creators)?;
            let username = creator.create_username(ctx, email, self.users.as_ref())?;
            match self.users.create(NewUser {
                username,
                email: email.to_string(),
                password: hashed.clone(),
            }) {
                Ok(user) => return Ok(user),
                Err(StoreError::UsernameTaken(username)) => {
                    warn!(attempt, %username, "generated username was taken, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(Error::UsernameExhausted(MAX_CREATE_ATTEMPTS))
    }

    /// Second step. Returns `Ok(None)` when the key does not resolve.
    ///
    /// # Errors
    /// Store failures, password hashing failures, or a username taken
    /// between validation and save.
    #[instrument(skip_all)]
    pub fn activate(
        &self,
        ctx: &mut RequestContext,
        activation_key: &str,
        username: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, Error> {
        let Some(mut user) = self.keys.resolve(activation_key)? else {
            debug!("activation key did not resolve");
            return Ok(None);
        };

        user.username = username.to_string();
        user.set_password(password)?;
        self.users.save(&user)?;

        let Some(user) = self.authenticate(username, password)? else {
            return Err(Error::Authentication(username.to_string()));
        };
        let user = self.login(ctx, user)?;

        info!(user_id = %user.id, "activated user");
        Ok(Some(user))
    }

    /// Username and password check against the user store.
    ///
    /// # Errors
    /// Store failures only.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .users
            .get_by_username(username)?
            .filter(|user| user.check_password(password)))
    }

    /// Replaces any session the request already carries.
    fn login(&self, ctx: &mut RequestContext, mut user: UserRecord) -> Result<UserRecord, Error> {
        user.last_login = Some(Utc::now());
        self.users.save(&user)?;
        if let Some(previous) = ctx.session() {
            self.sessions.logout(&previous.token)?;
        }
        let token = self.sessions.login(user.id)?;
        ctx.set_session(Session {
            token,
            user_id: user.id,
        });
        Ok(user)
    }
}

impl std::fmt::Debug for EmailOnlyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailOnlyBackend")
            .field("settings", &self.settings)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::email::MemoryOutbox;
    use crate::registration::session::Site;
    use crate::registration::signals::RegistrationListener;
    use crate::registration::username::{UsernameCreator, UsernameCreatorSetting};
    use anyhow::{Result, anyhow};
    use secrecy::SecretString;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        calls: AtomicUsize,
    }

    impl RegistrationListener for Counter {
        fn user_registered(&self, event: &UserRegistered<'_>) {
            assert_eq!(event.sender, "EmailOnlyBackend");
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        backend: EmailOnlyBackend,
        outbox: Arc<MemoryOutbox>,
        listener: Arc<Counter>,
        users: Arc<MemoryUserStore>,
        sessions: Arc<MemorySessionStore>,
    }

    fn settings() -> RegistrationSettings {
        RegistrationSettings::new(SecretString::from("shhh secret"))
    }

    fn harness_with(settings: RegistrationSettings) -> Result<Harness> {
        let outbox = Arc::new(MemoryOutbox::new());
        let listener = Arc::new(Counter::default());
        let users = Arc::new(MemoryUserStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let collaborators = Collaborators::new(users.clone(), sessions.clone(), outbox.clone())
        .with_events(RegistrationEvents::new().with_listener(listener.clone()));
        let backend = EmailOnlyBackend::new(settings, collaborators)?;
        Ok(Harness {
            backend,
            outbox,
            listener,
            users,
            sessions,
        })
    }

    fn harness() -> Result<Harness> {
        harness_with(settings())
    }

    fn key_from(body: &str) -> Result<String> {
        body.lines()
            .find_map(|line| line.strip_prefix("Activation key: "))
            .map(str::to_string)
            .ok_or_else(|| anyhow!("no activation key in email"))
    }

    #[test]
    fn register_requires_email() -> Result<()> {
        let h = harness()?;
        let mut ctx = RequestContext::default();
        let result = h.backend.register(&mut ctx, None);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(h.outbox.is_empty());
        assert!(h.users.is_empty());
        Ok(())
    }

    #[test]
    fn register_creates_unusable_user_and_notifies_once() -> Result<()> {
        let h = harness()?;
        let mut ctx = RequestContext::default();
        let user = h.backend.register(&mut ctx, Some("a@b.com"))?;

        assert!(!user.has_usable_password());
        assert_eq!(user.email, "a@b.com");
        assert_eq!(h.outbox.len(), 1);
        assert_eq!(h.listener.calls.load(Ordering::SeqCst), 1);

        let stored = h.users.get(user.id)?.ok_or_else(|| anyhow!("missing user"))?;
        assert!(!stored.has_usable_password());
        assert!(stored.last_login.is_some());

        let session = ctx.session().ok_or_else(|| anyhow!("no session"))?;
        assert_eq!(session.user_id, user.id);
        Ok(())
    }

    #[test]
    fn register_mails_a_resolvable_key() -> Result<()> {
        let h = harness()?;
        let mut ctx = RequestContext::default();
        let user = h.backend.register(&mut ctx, Some("em@il.com"))?;

        let messages = h.outbox.messages();
        let key = key_from(&messages[0].body)?;
        assert_eq!(messages[0].to_email, "em@il.com");
        assert!(messages[0].body.contains(&format!("/activate/{key}")));
        assert_eq!(h.backend.activation_keys().resolve(&key)?, Some(user));
        Ok(())
    }

    #[test]
    fn register_renders_the_configured_site() -> Result<()> {
        let h = harness_with(
            settings().with_site(Site::new("example.com".to_string(), "Example".to_string())),
        )?;
        let mut ctx = RequestContext::default();
        h.backend.register(&mut ctx, Some("em@il.com"))?;

        let messages = h.outbox.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].subject.contains("Example"));
        assert!(messages[0].body.contains("example.com"));
        Ok(())
    }

    #[test]
    fn register_refuses_when_closed() -> Result<()> {
        let h = harness_with(settings().with_registration_open(false))?;
        let mut ctx = RequestContext::default();
        let result = h.backend.register(&mut ctx, Some("a@b.com"));
        assert!(matches!(result, Err(Error::RegistrationClosed)));
        assert!(h.outbox.is_empty());
        assert_eq!(h.listener.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn activate_sets_username_and_password() -> Result<()> {
        let h = harness()?;
        let mut ctx = RequestContext::default();
        h.backend.register(&mut ctx, Some("em@il.com"))?;
        let key = key_from(&h.outbox.messages()[0].body)?;

        let mut ctx = RequestContext::default();
        let user = h
            .backend
            .activate(&mut ctx, &key, "username", "pass")?
            .ok_or_else(|| anyhow!("activation failed"))?;

        assert_eq!(user.username, "username");
        assert!(user.check_password("pass"));
        assert_eq!(ctx.session().map(|s| s.user_id), Some(user.id));
        assert!(h.backend.authenticate("username", "pass")?.is_some());
        Ok(())
    }

    #[test]
    fn activation_replaces_the_registration_session() -> Result<()> {
        let h = harness()?;
        let mut ctx = RequestContext::default();
        let user = h.backend.register(&mut ctx, Some("em@il.com"))?;
        let first = ctx
            .session()
            .map(|session| session.token.clone())
            .ok_or_else(|| anyhow!("no session after register"))?;
        assert_eq!(h.sessions.user_for(&first)?, Some(user.id));

        let key = key_from(&h.outbox.messages()[0].body)?;
        h.backend
            .activate(&mut ctx, &key, "username", "pass")?
            .ok_or_else(|| anyhow!("activation failed"))?;
        let second = ctx
            .session()
            .map(|session| session.token.clone())
            .ok_or_else(|| anyhow!("no session after activate"))?;

        assert_ne!(first, second);
        assert_eq!(h.sessions.user_for(&first)?, None);
        assert_eq!(h.sessions.user_for(&second)?, Some(user.id));
        assert_eq!(h.sessions.len(), 1);
        Ok(())
    }

    #[test]
    fn activation_key_is_single_use() -> Result<()> {
        let h = harness()?;
        let mut ctx = RequestContext::default();
        h.backend.register(&mut ctx, Some("em@il.com"))?;
        let key = key_from(&h.outbox.messages()[0].body)?;

        assert!(h
            .backend
            .activate(&mut ctx, &key, "username", "pass")?
            .is_some());
        assert!(h
            .backend
            .activate(&mut ctx, &key, "other", "pass2")?
            .is_none());
        assert!(h.backend.authenticate("username", "pass")?.is_some());
        Ok(())
    }

    #[test]
    fn activate_rejects_garbage_keys() -> Result<()> {
        let h = harness()?;
        let mut ctx = RequestContext::default();
        assert!(h.backend.activate(&mut ctx, "nope", "u", "p")?.is_none());
        assert!(ctx.session().is_none());
        Ok(())
    }

    #[test]
    fn register_retries_taken_usernames() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let creator = move |_: &RequestContext,
                            _: &str,
                            _: &dyn UserStore|
              -> Result<String, StoreError> {
            // ignores the store on purpose so the insert collides
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(if n == 0 { "dup".to_string() } else { format!("dup{n}") })
        };
        let h = harness_with(
            settings().with_username_creator(UsernameCreatorSetting::Creator(Arc::new(creator))),
        )?;
        h.users.create(NewUser {
            username: "dup".to_string(),
            email: "first@example.com".to_string(),
            password: Password::Unusable,
        })?;

        let mut ctx = RequestContext::default();
        let user = h.backend.register(&mut ctx, Some("a@b.com"))?;
        assert_eq!(user.username, "dup1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn register_gives_up_after_repeated_collisions() -> Result<()> {
        let always_taken = |_: &RequestContext,
                            _: &str,
                            _: &dyn UserStore|
         -> Result<String, StoreError> { Ok("dup".to_string()) };
        let creator: Arc<dyn UsernameCreator> = Arc::new(always_taken);
        let h = harness_with(
            settings().with_username_creator(UsernameCreatorSetting::Creator(creator)),
        )?;
        h.users.create(NewUser {
            username: "dup".to_string(),
            email: "first@example.com".to_string(),
            password: Password::Unusable,
        })?;

        let mut ctx = RequestContext::default();
        let result = h.backend.register(&mut ctx, Some("a@b.com"));
        assert!(matches!(
            result,
            Err(Error::UsernameExhausted(MAX_CREATE_ATTEMPTS))
        ));
        assert!(h.outbox.is_empty());
        Ok(())
    }

    struct BrokenSender;

    impl EmailSender for BrokenSender {
        fn send(&self, _message: &crate::registration::email::EmailMessage) -> anyhow::Result<()> {
            Err(anyhow!("smtp down"))
        }
    }

    #[test]
    fn delivery_failure_keeps_the_created_user() -> Result<()> {
        let users = Arc::new(MemoryUserStore::new());
        let collaborators = Collaborators::new(
            users.clone(),
            Arc::new(MemorySessionStore::new()),
            Arc::new(BrokenSender),
        );
        let backend = EmailOnlyBackend::new(settings(), collaborators)?;
        let mut ctx = RequestContext::default();

        let result = backend.register(&mut ctx, Some("em@il.com"));
        assert!(matches!(result, Err(Error::Email(_))));
        assert_eq!(users.len(), 1);
        assert!(ctx.session().is_some());

        let retry = crate::registration::RegistrationForm {
            email: "em@il.com".to_string(),
        }
        .clean(backend.users());
        assert!(matches!(
            retry,
            Err(crate::registration::ValidationError::EmailInUse)
        ));
        Ok(())
    }

    #[test]
    fn new_rejects_bad_configuration() {
        let short = RegistrationSettings::new(SecretString::from("short"));
        assert!(matches!(
            harness_with(short).map(|_| ()).map_err(|err| err.downcast::<ConfigError>()),
            Err(Ok(ConfigError::SecretTooShort { .. }))
        ));

        let unknown = settings()
            .with_username_creator(UsernameCreatorSetting::Path("no::such".to_string()));
        assert!(matches!(
            harness_with(unknown).map(|_| ()).map_err(|err| err.downcast::<ConfigError>()),
            Err(Ok(ConfigError::UnresolvableUsernameCreator(_)))
        ));

        let invalid = settings().with_username_creator(json!(true).into());
        assert!(matches!(
            harness_with(invalid).map(|_| ()).map_err(|err| err.downcast::<ConfigError>()),
            Err(Ok(ConfigError::InvalidUsernameCreator(_)))
        ));
    }
}
