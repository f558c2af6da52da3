//! 凭据提供方：为 (调用者, 作用域) 返回 Bearer 令牌
//!
//! OAuth 换取令牌的细节不在此处；StaticCredentials 从配置读取每个集成的静态令牌。

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::{ActorIdentity, IntegrationId};

/// Bearer 令牌（Debug 输出时脱敏）
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("no credentials for {actor} with scope {scope}")]
    Missing { actor: String, scope: String },

    #[error("credentials expired for {0}")]
    Expired(String),
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_bearer_token(
        &self,
        actor: &ActorIdentity,
        scope: &str,
    ) -> Result<Token, AuthError>;
}

/// 静态令牌：按作用域查找，所有调用者共享（适合服务账号部署）
#[derive(Default, Clone)]
pub struct StaticCredentials {
    by_scope: HashMap<String, Token>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, integration: IntegrationId, token: impl Into<String>) -> Self {
        self.by_scope
            .insert(integration.scope().to_string(), Token::new(token));
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn get_bearer_token(
        &self,
        actor: &ActorIdentity,
        scope: &str,
    ) -> Result<Token, AuthError> {
        self.by_scope
            .get(scope)
            .cloned()
            .ok_or_else(|| AuthError::Missing {
                actor: actor.to_string(),
                scope: scope.to_string(),
            })
    }
}
