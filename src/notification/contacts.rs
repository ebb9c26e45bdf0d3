use crate::notification::model::{NotificationError, RecipientContact};
use crate::notification::store::ContactDirectory;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Contact lookups memoised for the lifetime of one processor run.
///
/// A fresh resolver is built per invocation, so nothing cached here outlives
/// the batch that populated it. Failed lookups are not cached.
pub struct ContactResolver<'a> {
    directory: &'a dyn ContactDirectory,
    contacts: HashMap<Uuid, RecipientContact>,
    names: HashMap<Uuid, Option<String>>,
}

impl<'a> ContactResolver<'a> {
    pub fn new(directory: &'a dyn ContactDirectory) -> Self {
        Self {
            directory,
            contacts: HashMap::new(),
            names: HashMap::new(),
        }
    }

    /// Email and display name of a recipient. The display name prefers the
    /// profile row and falls back to the identity provider's `full_name`.
    pub async fn resolve_contact(
        &mut self,
        profile_id: Uuid,
    ) -> Result<RecipientContact, NotificationError> {
        if let Some(contact) = self.contacts.get(&profile_id) {
            return Ok(contact.clone());
        }

        let profile_name = self.directory.profile_display_name(profile_id).await?;
        let identity = self.directory.identity(profile_id).await?.unwrap_or_default();

        // Phone-only identities carry an empty email.
        let contact = RecipientContact {
            email: identity.email.filter(|email| !email.trim().is_empty()),
            display_name: profile_name.or(identity.full_name),
        };
        debug!(
            "Resolved contact for {} (email on file: {})",
            profile_id,
            contact.email.is_some()
        );

        self.contacts.insert(profile_id, contact.clone());
        Ok(contact)
    }

    /// Profile display name of an actor; system events have no actor.
    pub async fn resolve_display_name(
        &mut self,
        profile_id: Option<Uuid>,
    ) -> Result<Option<String>, NotificationError> {
        let Some(profile_id) = profile_id else {
            return Ok(None);
        };

        if let Some(name) = self.names.get(&profile_id) {
            return Ok(name.clone());
        }

        let name = self.directory.profile_display_name(profile_id).await?;
        self.names.insert(profile_id, name.clone());
        Ok(name)
    }
}
