use crate::domain::{Sender, UserId};

// ============== Allow-list ==============

/// Ordered, immutable list of usernames permitted to talk to the bot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllowList {
    ids: Vec<UserId>,
}

impl AllowList {
    pub fn new(ids: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|u| u.as_str() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserId> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// ============== Authorization ==============

/// Why an update was refused before reaching the session store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthRejection {
    /// Sender has no username (or no sender at all), so it cannot be matched.
    MissingUsername { first_name: Option<String> },
    /// Username present but not on the allow-list.
    NotAllowed { username: String },
}

/// Resolve the sender to an allow-listed identity.
///
/// Every rejection is logged here; callers only decide what to do with it.
pub fn authorize(
    sender: Option<&Sender>,
    allowed: &AllowList,
) -> std::result::Result<UserId, AuthRejection> {
    let Some(sender) = sender else {
        tracing::warn!("not allowed (no sender)");
        return Err(AuthRejection::MissingUsername { first_name: None });
    };

    let Some(username) = sender.username.as_deref() else {
        tracing::warn!(first_name = %sender.first_name, "not allowed (no user name)");
        return Err(AuthRejection::MissingUsername {
            first_name: Some(sender.first_name.clone()),
        });
    };

    if !allowed.contains(username) {
        tracing::warn!(username, "id not allowed");
        return Err(AuthRejection::NotAllowed {
            username: username.to_string(),
        });
    }

    Ok(UserId(username.to_string()))
}

pub fn is_authorized(sender: Option<&Sender>, allowed: &AllowList) -> bool {
    authorize(sender, allowed).is_ok()
}
