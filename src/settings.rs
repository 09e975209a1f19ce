//! Typed site settings.
//!
//! The key set is closed: [`SettingKey`] lists every setting and
//! [`SettingsPatch`] rejects anything else at deserialisation time.

use std::fmt;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::error::{LibError, Result};

pub const MAX_POSTS_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    SiteName,
    SiteDescription,
    FooterText,
    PostsPerPage,
    ContactEmail,
    EnableComments,
}

pub const ALL_SETTING_KEYS: &[SettingKey] = &[
    SettingKey::SiteName,
    SettingKey::SiteDescription,
    SettingKey::FooterText,
    SettingKey::PostsPerPage,
    SettingKey::ContactEmail,
    SettingKey::EnableComments,
];

impl SettingKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            SettingKey::SiteName => "site_name",
            SettingKey::SiteDescription => "site_description",
            SettingKey::FooterText => "footer_text",
            SettingKey::PostsPerPage => "posts_per_page",
            SettingKey::ContactEmail => "contact_email",
            SettingKey::EnableComments => "enable_comments",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        ALL_SETTING_KEYS
            .iter()
            .copied()
            .find(|key| key.as_str() == value)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSettings {
    pub site_name: String,
    pub site_description: String,
    pub footer_text: String,
    pub posts_per_page: u32,
    pub contact_email: String,
    pub enable_comments: bool,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_name: "Subseq Blog".to_string(),
            site_description: "A content-managed blog".to_string(),
            footer_text: "All rights reserved.".to_string(),
            posts_per_page: 10,
            contact_email: "admin@example.com".to_string(),
            enable_comments: true,
        }
    }
}

impl SiteSettings {
    pub fn value_of(&self, key: SettingKey) -> String {
        match key {
            SettingKey::SiteName => self.site_name.clone(),
            SettingKey::SiteDescription => self.site_description.clone(),
            SettingKey::FooterText => self.footer_text.clone(),
            SettingKey::PostsPerPage => self.posts_per_page.to_string(),
            SettingKey::ContactEmail => self.contact_email.clone(),
            SettingKey::EnableComments => self.enable_comments.to_string(),
        }
    }

    /// Builds settings from stored key/value rows. Unknown keys and
    /// unparsable values keep the default and are logged.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut settings = Self::default();
        for (raw_key, raw_value) in rows {
            let Some(key) = SettingKey::from_db_value(&raw_key) else {
                tracing::warn!(key = %raw_key, "ignoring unknown stored setting");
                continue;
            };
            if let Err(err) = settings.set_raw(key, &raw_value) {
                tracing::warn!(key = %key, error = %err.source, "ignoring invalid stored setting");
            }
        }
        settings
    }

    fn set_raw(&mut self, key: SettingKey, raw: &str) -> Result<()> {
        match key {
            SettingKey::SiteName => self.site_name = raw.to_string(),
            SettingKey::SiteDescription => self.site_description = raw.to_string(),
            SettingKey::FooterText => self.footer_text = raw.to_string(),
            SettingKey::PostsPerPage => {
                self.posts_per_page = raw.trim().parse().map_err(|err| {
                    LibError::invalid("Posts per page must be a number", anyhow!("{}", err))
                })?
            }
            SettingKey::ContactEmail => self.contact_email = raw.to_string(),
            SettingKey::EnableComments => {
                self.enable_comments = match raw.trim() {
                    "true" | "1" => true,
                    "false" | "0" => false,
                    other => {
                        return Err(LibError::invalid(
                            "Enable comments must be true or false",
                            anyhow!("unrecognised boolean '{}'", other),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsPatch {
    pub site_name: Option<String>,
    pub site_description: Option<String>,
    pub footer_text: Option<String>,
    pub posts_per_page: Option<u32>,
    pub contact_email: Option<String>,
    pub enable_comments: Option<bool>,
}

impl SettingsPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.site_name {
            if name.trim().is_empty() {
                return Err(LibError::invalid(
                    "Site name is required",
                    anyhow!("empty site name"),
                ));
            }
        }
        if let Some(per_page) = self.posts_per_page {
            if per_page == 0 || per_page > MAX_POSTS_PER_PAGE {
                return Err(LibError::invalid(
                    "Posts per page must be between 1 and 100",
                    anyhow!("posts_per_page {} out of range", per_page),
                ));
            }
        }
        if let Some(email) = &self.contact_email {
            if !email.contains('@') {
                return Err(LibError::invalid(
                    "Contact email is invalid",
                    anyhow!("contact email '{}' has no '@'", email),
                ));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.changed_keys().is_empty()
    }

    pub fn changed_keys(&self) -> Vec<SettingKey> {
        let mut keys = Vec::new();
        if self.site_name.is_some() {
            keys.push(SettingKey::SiteName);
        }
        if self.site_description.is_some() {
            keys.push(SettingKey::SiteDescription);
        }
        if self.footer_text.is_some() {
            keys.push(SettingKey::FooterText);
        }
        if self.posts_per_page.is_some() {
            keys.push(SettingKey::PostsPerPage);
        }
        if self.contact_email.is_some() {
            keys.push(SettingKey::ContactEmail);
        }
        if self.enable_comments.is_some() {
            keys.push(SettingKey::EnableComments);
        }
        keys
    }

    pub fn apply_to(&self, settings: &mut SiteSettings) {
        if let Some(value) = &self.site_name {
            settings.site_name = value.trim().to_string();
        }
        if let Some(value) = &self.site_description {
            settings.site_description = value.clone();
        }
        if let Some(value) = &self.footer_text {
            settings.footer_text = value.clone();
        }
        if let Some(value) = self.posts_per_page {
            settings.posts_per_page = value;
        }
        if let Some(value) = &self.contact_email {
            settings.contact_email = value.trim().to_string();
        }
        if let Some(value) = self.enable_comments {
            settings.enable_comments = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn patch_rejects_unknown_keys() {
        let err = serde_json::from_value::<SettingsPatch>(json!({"theme": "dark"}))
            .expect_err("unknown key should fail");
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn patch_validates_ranges() {
        let patch = SettingsPatch {
            posts_per_page: Some(0),
            ..SettingsPatch::default()
        };
        let err = patch.validate().expect_err("zero per page should fail");
        assert_eq!(err.public, "Posts per page must be between 1 and 100");

        let patch = SettingsPatch {
            contact_email: Some("nobody".to_string()),
            ..SettingsPatch::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let patch: SettingsPatch =
            serde_json::from_value(json!({"siteName": " New Name ", "enableComments": false}))
                .expect("patch should deserialize");
        patch.validate().expect("patch should validate");
        assert_eq!(
            patch.changed_keys(),
            vec![SettingKey::SiteName, SettingKey::EnableComments]
        );

        let mut settings = SiteSettings::default();
        patch.apply_to(&mut settings);
        assert_eq!(settings.site_name, "New Name");
        assert!(!settings.enable_comments);
        assert_eq!(settings.posts_per_page, SiteSettings::default().posts_per_page);
    }

    #[test]
    fn rows_round_trip_and_skip_garbage() {
        let mut settings = SiteSettings::default();
        settings.posts_per_page = 25;
        let mut rows = ALL_SETTING_KEYS
            .iter()
            .map(|key| (key.as_str().to_string(), settings.value_of(*key)))
            .collect::<Vec<_>>();
        rows.push(("unknown_key".to_string(), "x".to_string()));
        rows.push(("enable_comments".to_string(), "maybe".to_string()));

        let loaded = SiteSettings::from_rows(rows);
        assert_eq!(loaded.posts_per_page, 25);
        assert!(loaded.enable_comments);
    }
}
