//! Credential verification against the directory.
//!
//! A successful bind proves the secret; the bound session is then either
//! released straight away or handed to a caller-supplied continuation and
//! released when it finishes. The shared search session is never used.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use roster_core::{AuthError, EntityKind, RosterResult};
use roster_directory::{entity_dn, BoundSession};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::{Person, Roster};

/// Characters that would change the meaning of the bind DN.
const DN_SPECIAL: &[char] = &[',', '=', '+', '<', '>', '#', ';', '\\', '"', '\0'];

impl Roster {
    /// Verify `secret` for `uid` and return the person.
    pub async fn authenticate(&self, uid: &str, secret: &SecretString) -> RosterResult<Arc<Person>> {
        let session = self.bind_person(uid, secret).await?;
        session.release().await;
        Ok(self.person(uid))
    }

    /// Verify `secret` for `uid`, then run `continuation` under the bound
    /// session. The session is released whether or not the continuation
    /// succeeds.
    pub async fn authenticate_with<R, F>(
        &self,
        uid: &str,
        secret: &SecretString,
        continuation: F,
    ) -> RosterResult<(Arc<Person>, R)>
    where
        F: for<'s> FnOnce(&'s mut BoundSession, Arc<Person>) -> BoxFuture<'s, RosterResult<R>>,
    {
        let mut session = self.bind_person(uid, secret).await?;
        let person = self.person(uid);
        let outcome = continuation(&mut session, Arc::clone(&person)).await;
        session.release().await;
        outcome.map(|value| (person, value))
    }

    async fn bind_person(&self, uid: &str, secret: &SecretString) -> RosterResult<BoundSession> {
        validate_identifier(uid)?;
        if secret.expose_secret().is_empty() {
            return Err(AuthError::EmptySecret {
                identifier: uid.to_string(),
            }
            .into());
        }

        let dn = entity_dn(EntityKind::Person, uid, self.suffix());
        match self.directory().bind_as(&dn, secret.expose_secret()).await {
            Ok(session) => {
                info!(uid, host = %session.host(), "authenticated");
                Ok(session)
            }
            Err(e) => {
                warn!(uid, error = %e, "authentication failed");
                Err(e)
            }
        }
    }
}

fn validate_identifier(uid: &str) -> Result<(), AuthError> {
    let valid = !uid.is_empty()
        && uid == uid.trim()
        && !uid.contains(DN_SPECIAL)
        && !uid.chars().any(char::is_control);
    if valid {
        Ok(())
    } else {
        Err(AuthError::InvalidIdentifier {
            identifier: uid.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("alice").is_ok());
        assert!(validate_identifier("o.brien-2").is_ok());
        for bad in ["", " alice", "alice,ou=x", "a=b", "a\\2c", "a\nb", "a#"] {
            assert!(
                matches!(validate_identifier(bad), Err(AuthError::InvalidIdentifier { .. })),
                "{bad:?} should be rejected"
            );
        }
    }
}
