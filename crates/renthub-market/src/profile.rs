//! User profiles.

use renthub_db::Entity;
use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::{MarketError, Marketplace};

/// Meeting point shown for users who have not saved a profile.
pub const DEFAULT_MEET_POINT: &str = "Montreal, Qc";

/// Contact details of a user, keyed by user id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserInfo {
    pub id: UserId,
    pub nickname: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub meet_point: Option<String>,
}

impl Entity for UserInfo {
    const KIND: &'static str = "UserInfo";

    fn id(&self) -> &str {
        self.id.as_str()
    }
}

/// Profile form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileParams {
    pub nickname: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub meet_point: Option<String>,
}

/// Whether a save created or replaced the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated,
}

impl SaveOutcome {
    /// Notification shown to the user.
    pub fn message(&self) -> &'static str {
        match self {
            SaveOutcome::Created => "Created successfully",
            SaveOutcome::Updated => "Updated successfully",
        }
    }
}

impl Marketplace {
    /// Create or overwrite a user's profile.
    pub fn save_profile(
        &self,
        user_id: &UserId,
        params: ProfileParams,
    ) -> Result<SaveOutcome, MarketError> {
        let nickname = params.nickname.trim().to_string();
        if nickname.is_empty() {
            return Err(MarketError::Validation("nickname is required".to_string()));
        }
        let email = params.email.trim().to_string();
        if !email.is_empty() && !email.contains('@') {
            return Err(MarketError::Validation(format!("invalid email: {}", email)));
        }

        let outcome = match self.db().get::<UserInfo>(user_id.as_str())? {
            Some(_) => SaveOutcome::Updated,
            None => SaveOutcome::Created,
        };
        self.db().put(&UserInfo {
            id: user_id.clone(),
            nickname,
            email,
            phone_number: params.phone_number.filter(|p| !p.trim().is_empty()),
            meet_point: params.meet_point.filter(|p| !p.trim().is_empty()),
        })?;

        tracing::info!(user = %user_id, outcome = outcome.message(), "profile saved");
        Ok(outcome)
    }

    /// A user's profile, or one filled from the given account details.
    pub fn profile_or_default(
        &self,
        user_id: &UserId,
        nickname: &str,
        email: &str,
    ) -> Result<UserInfo, MarketError> {
        Ok(self
            .db()
            .get::<UserInfo>(user_id.as_str())?
            .unwrap_or_else(|| UserInfo {
                id: user_id.clone(),
                nickname: nickname.to_string(),
                email: email.to_string(),
                phone_number: None,
                meet_point: Some(DEFAULT_MEET_POINT.to_string()),
            }))
    }
}
