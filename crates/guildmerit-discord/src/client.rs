use crate::error::{DiscordError, DiscordResult};
use async_trait::async_trait;
use guildmerit_core::ports::{ChatRoleReader, ChatRoleWriter};
use guildmerit_core::{AdapterResult, MemberRoles};
use reqwest::{Client, Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const DEFAULT_API_URL: &str = "https://discord.com/api/v10";

/// Members fetched per page
pub const MEMBER_PAGE_LIMIT: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
struct GuildRole {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GuildMember {
    user: MemberUser,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MemberUser {
    id: String,
}

/// Discord REST client scoped to one guild
pub struct DiscordClient {
    client: Client,
    token: SecretString,
    guild_id: String,
    base_url: String,
    /// Role name -> role id, filled by the first lookup
    role_ids: RwLock<Option<BTreeMap<String, String>>>,
}

impl DiscordClient {
    /// Create a client for the given guild and bot token
    pub fn new(token: &SecretString, guild_id: &str) -> DiscordResult<Self> {
        Self::with_base_url(token, guild_id, DEFAULT_API_URL)
    }

    /// Create a client with custom base URL (for testing)
    pub fn with_base_url(
        token: &SecretString,
        guild_id: &str,
        base_url: &str,
    ) -> DiscordResult<Self> {
        if guild_id.trim().is_empty() {
            return Err(DiscordError::ConfigError(
                "discord.guild_id must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client: Client::new(),
            token: SecretString::from(token.expose_secret().to_string()),
            guild_id: guild_id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            role_ids: RwLock::new(None),
        })
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    /// `path` may carry a query string; Discord ids and limits need no escaping
    async fn send(&self, method: Method, path: &str) -> DiscordResult<Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .request(method, &url)
            .header("Authorization", format!("Bot {}", self.token.expose_secret()))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Err(DiscordError::PermissionDenied(format!("HTTP {} on {}", status.as_u16(), path)))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(DiscordError::ApiError {
                    status: status.as_u16(),
                    body: body.chars().take(500).collect(),
                })
            }
        }
    }

    async fn fetch_roles(&self) -> DiscordResult<Vec<GuildRole>> {
        let path = format!("/guilds/{}/roles", self.guild_id);
        let roles: Vec<GuildRole> = self.send(Method::GET, &path).await?.json().await?;

        let lookup = roles
            .iter()
            .map(|role| (role.name.clone(), role.id.clone()))
            .collect();
        *self.role_ids.write().await = Some(lookup);

        info!("Loaded {} Discord roles for guild {}", roles.len(), self.guild_id);
        Ok(roles)
    }

    async fn fetch_members(&self) -> DiscordResult<Vec<GuildMember>> {
        let path = format!("/guilds/{}/members", self.guild_id);
        let mut members = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let page_path = match &after {
                Some(after) => format!("{}?limit={}&after={}", path, MEMBER_PAGE_LIMIT, after),
                None => format!("{}?limit={}", path, MEMBER_PAGE_LIMIT),
            };

            let page: Vec<GuildMember> = self.send(Method::GET, &page_path).await?.json().await?;
            let full_page = page.len() >= MEMBER_PAGE_LIMIT;
            after = page.last().map(|member| member.user.id.clone());
            members.extend(page);

            if !full_page || after.is_none() {
                break;
            }
        }

        info!("Loaded {} Discord members for guild {}", members.len(), self.guild_id);
        Ok(members)
    }

    /// Role names held by every guild member, keyed by user id
    pub async fn member_roles(&self) -> DiscordResult<MemberRoles> {
        let roles = self.fetch_roles().await?;
        let names: BTreeMap<&str, &str> = roles
            .iter()
            .map(|role| (role.id.as_str(), role.name.as_str()))
            .collect();

        let mut member_roles = MemberRoles::new();
        let mut unknown_ids = BTreeSet::new();
        for member in self.fetch_members().await? {
            let held = member
                .roles
                .iter()
                .filter_map(|id| match names.get(id.as_str()) {
                    Some(name) => Some(name.to_string()),
                    None => {
                        unknown_ids.insert(id.clone());
                        None
                    }
                })
                .collect();
            member_roles.insert(member.user.id, held);
        }

        if !unknown_ids.is_empty() {
            debug!("Member roles reference unknown role ids: {:?}", unknown_ids);
        }

        Ok(member_roles)
    }

    async fn resolve_role_id(&self, role: &str) -> DiscordResult<String> {
        if let Some(lookup) = self.role_ids.read().await.as_ref() {
            if let Some(id) = lookup.get(role) {
                return Ok(id.clone());
            }
        }

        // Unknown to the cache: the role may have been created since the last fetch
        self.fetch_roles().await?;
        self.role_ids
            .read()
            .await
            .as_ref()
            .and_then(|lookup| lookup.get(role).cloned())
            .ok_or_else(|| DiscordError::RoleNotFound(role.to_string()))
    }

    fn member_role_path(&self, user_id: &str, role_id: &str) -> String {
        format!("/guilds/{}/members/{}/roles/{}", self.guild_id, user_id, role_id)
    }

    /// Grant a role (by name) to a guild member
    pub async fn add_member_role(&self, user_id: &str, role: &str) -> DiscordResult<()> {
        let role_id = self.resolve_role_id(role).await.inspect_err(|_| {
            warn!("Cannot add role {} to {}: role not found in guild", role, user_id);
        })?;

        self.send(Method::PUT, &self.member_role_path(user_id, &role_id))
            .await?;
        info!("Added Discord role {} to {}", role, user_id);
        Ok(())
    }

    /// Revoke a role (by name) from a guild member
    pub async fn remove_member_role(&self, user_id: &str, role: &str) -> DiscordResult<()> {
        let role_id = self.resolve_role_id(role).await.inspect_err(|_| {
            warn!("Cannot remove role {} from {}: role not found in guild", role, user_id);
        })?;

        self.send(Method::DELETE, &self.member_role_path(user_id, &role_id))
            .await?;
        info!("Removed Discord role {} from {}", role, user_id);
        Ok(())
    }
}

#[async_trait]
impl ChatRoleReader for DiscordClient {
    async fn list_member_roles(&self) -> AdapterResult<MemberRoles> {
        Ok(self.member_roles().await?)
    }
}

#[async_trait]
impl ChatRoleWriter for DiscordClient {
    async fn add_role(&self, chat_user_id: &str, role: &str) -> AdapterResult<()> {
        Ok(self.add_member_role(chat_user_id, role).await?)
    }

    async fn remove_role(&self, chat_user_id: &str, role: &str) -> AdapterResult<()> {
        Ok(self.remove_member_role(chat_user_id, role).await?)
    }
}
